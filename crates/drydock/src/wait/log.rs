//! Log-regex wait strategy.

use std::time::Duration;

use regex::Regex;

use crate::error::{Error, Result};

use super::{WaitContext, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

/// Probe readiness by matching a regex against the container's combined
/// stdout and stderr.
#[derive(Debug, Clone)]
pub struct LogWait {
    /// Pattern looked for in the log stream.
    pub pattern: Regex,

    /// Overall wall-clock budget.
    pub timeout: Duration,

    /// Sleep between log fetches.
    pub interval: Duration,
}

impl LogWait {
    /// Create a log probe with default timeout and interval.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex.
    #[must_use]
    pub fn new(pattern: &str) -> Self {
        let pattern = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("invalid log wait pattern {pattern:?}: {e}"));
        Self {
            pattern,
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
        let attempts = async {
            loop {
                let logs = ctx.api.stdout_logs(ctx.container_id).await?;
                if self.pattern.is_match(&String::from_utf8_lossy(&logs)) {
                    return Ok(());
                }
                tokio::time::sleep(self.interval).await;
            }
        };

        tokio::time::timeout(self.timeout, attempts)
            .await
            .unwrap_or(Err(Error::WaitTimeout { strategy: "log" }))
    }
}
