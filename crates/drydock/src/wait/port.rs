//! TCP port wait strategy.

use std::time::Duration;

use tokio::net::TcpStream;

use crate::error::{Error, Result};

use super::{WaitContext, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

/// Probe readiness by connecting to the mapped host port.
#[derive(Debug, Clone)]
pub struct PortWait {
    /// Container port whose host mapping is probed.
    pub container_port: u16,

    /// Overall wall-clock budget.
    pub timeout: Duration,

    /// Sleep between connection attempts.
    pub interval: Duration,
}

impl PortWait {
    /// Create a port probe with default timeout and interval.
    ///
    /// # Panics
    ///
    /// Panics if `container_port` is zero.
    #[must_use]
    pub fn new(container_port: u16) -> Self {
        assert!(container_port != 0, "container port must be non-zero");
        Self {
            container_port,
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
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
            strategy: "port",
            detail: format!("container port {} is not mapped", self.container_port),
        })?;

        let attempts = async {
            loop {
                if TcpStream::connect(("127.0.0.1", host_port)).await.is_ok() {
                    return Ok(());
                }
                tokio::time::sleep(self.interval).await;
            }
        };

        tokio::time::timeout(self.timeout, attempts)
            .await
            .unwrap_or(Err(Error::WaitTimeout { strategy: "port" }))
    }
}
