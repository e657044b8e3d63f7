//! Command-probe wait strategy.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};

use super::{WaitContext, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

/// How often a running exec instance is re-inspected.
const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Probe readiness by executing a command inside the container until it
/// exits 0.
#[derive(Debug, Clone)]
pub struct CommandWait {
    /// Command and arguments.
    pub cmd: Vec<String>,

    /// Overall wall-clock budget.
    pub timeout: Duration,

    /// Sleep between probe attempts; also the budget for a single exec to
    /// finish before it is abandoned and retried.
    pub interval: Duration,
}

impl CommandWait {
    /// Create a command probe with default timeout and interval.
    ///
    /// # Panics
    ///
    /// Panics if `cmd` is empty.
    #[must_use]
    pub fn new(cmd: Vec<String>) -> Self {
        assert!(!cmd.is_empty(), "wait command must not be empty");
        Self {
            cmd,
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
                if self.probe(ctx).await? {
                    return Ok(());
                }
                tokio::time::sleep(self.interval).await;
            }
        };

        tokio::time::timeout(self.timeout, attempts)
            .await
            .unwrap_or(Err(Error::WaitTimeout {
                strategy: "command",
            }))
    }

    /// One probe: create + start an exec, poll it until it stops or the
    /// per-iteration budget runs out. `Ok(true)` iff it exited 0.
    async fn probe(&self, ctx: &WaitContext<'_>) -> Result<bool> {
        let exec_id = ctx.api.create_exec(ctx.container_id, &self.cmd).await?;
        ctx.api.start_exec(&exec_id).await?;

        let budget = Instant::now() + self.interval;
        loop {
            let status = ctx.api.inspect_exec(&exec_id).await?;
            if !status.running {
                return Ok(status.exit_code == Some(0));
            }
            if Instant::now() >= budget {
                // Still running; abandon this exec and try a fresh one.
                return Ok(false);
            }
            tokio::time::sleep(EXEC_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DockerApi, FakeDockerApi};
    use crate::descriptor::ContainerDescriptor;

    async fn container(api: &FakeDockerApi) -> String {
        api.create_container(&ContainerDescriptor::new("redis:7.2"))
            .await
            .expect("create")
    }

    #[tokio::test]
    async fn test_command_wait_succeeds_on_zero_exit() {
        let api = FakeDockerApi::new();
        let id = container(&api).await;

        let wait = CommandWait::new(vec!["redis-cli".to_string(), "PING".to_string()]);
        let ctx = WaitContext {
            api: &api,
            container_id: &id,
            ports: &[],
        };
        wait.wait_until_ready(&ctx).await.expect("ready");
    }

    #[tokio::test]
    async fn test_command_wait_times_out_on_nonzero_exit() {
        let api = FakeDockerApi::new();
        let id = container(&api).await;
        api.script_exec(&["false"], 1).await;

        let wait = CommandWait::new(vec!["false".to_string()])
            .with_timeout(Duration::from_millis(120))
            .with_interval(Duration::from_millis(20));
        let ctx = WaitContext {
            api: &api,
            container_id: &id,
            ports: &[],
        };

        let started = std::time::Instant::now();
        let err = wait.wait_until_ready(&ctx).await.expect_err("timeout");
        assert!(matches!(err, Error::WaitTimeout { strategy: "command" }));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_command_wait_propagates_transport_errors() {
        let api = FakeDockerApi::new();
        let wait = CommandWait::new(vec!["true".to_string()]);
        let ctx = WaitContext {
            api: &api,
            container_id: "missing",
            ports: &[],
        };
        let err = wait.wait_until_ready(&ctx).await.expect_err("no container");
        assert!(matches!(err, Error::Http { status: 404, .. }));
    }

    #[test]
    #[should_panic(expected = "wait command must not be empty")]
    fn test_command_wait_rejects_empty_command() {
        let _ = CommandWait::new(Vec::new());
    }
}
