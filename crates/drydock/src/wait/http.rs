//! HTTP wait strategy.

use std::time::Duration;

use crate::error::{Error, Result};

use super::{WaitContext, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

/// Probe readiness with an HTTP GET against the mapped host port.
#[derive(Debug, Clone)]
pub struct HttpWait {
    /// Container port whose host mapping is probed.
    pub container_port: u16,

    /// Request path, normalized to start with `/`.
    pub path: String,

    /// Status the response must carry.
    pub expected_status: u16,

    /// Overall wall-clock budget.
    pub timeout: Duration,

    /// Sleep between requests; also the per-request timeout.
    pub interval: Duration,
}

impl HttpWait {
    /// Create an HTTP probe expecting status 200.
    ///
    /// # Panics
    ///
    /// Panics if `container_port` is zero.
    #[must_use]
    pub fn new(container_port: u16, path: impl Into<String>) -> Self {
        assert!(container_port != 0, "container port must be non-zero");
        let path = path.into();
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Self {
            container_port,
            path,
            expected_status: 200,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }

    /// Replace the expected response status.
    #[must_use]
    pub fn with_expected_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Replace the wall-clock timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the inter-probe interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub(super) async fn wait_until_ready(&self, ctx: &WaitContext<'_>) -> Result<()> {
        let host_port = ctx.mapped_port(self.container_port).ok_or(Error::WaitFailed {
            strategy: "http",
            detail: format!("container port {} is not mapped", self.container_port),
        })?;

        let client = reqwest::Client::builder()
            .timeout(self.interval)
            .build()
            .map_err(|e| Error::WaitFailed {
                strategy: "http",
                detail: format!("failed to build HTTP client: {e}"),
            })?;
        let url = format!("http://127.0.0.1:{host_port}{}", self.path);

        let attempts = async {
            loop {
                match client.get(&url).send().await {
                    Ok(response) if response.status().as_u16() == self.expected_status => {
                        return Ok(());
                    }
                    // Wrong status or connection refused: retry.
                    Ok(_) | Err(_) => tokio::time::sleep(self.interval).await,
                }
            }
        };

        tokio::time::timeout(self.timeout, attempts)
            .await
            .unwrap_or(Err(Error::WaitTimeout { strategy: "http" }))
    }
}
