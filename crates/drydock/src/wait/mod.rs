//! Readiness probes.
//!
//! A wait strategy blocks start-up completion until an observable condition
//! holds: a command exits 0 inside the container, a log line matches, an
//! HTTP endpoint answers, or a mapped port accepts TCP. Strategies run in
//! declaration order and the first failure aborts the pipeline; polling is
//! bounded by wall-clock, not retry count.

use std::time::Duration;

use crate::api::DockerApi;
use crate::error::Result;
use crate::handle::ResolvedPort;

mod command;
mod http;
mod log;
mod port;

pub use command::CommandWait;
pub use http::HttpWait;
pub use log::LogWait;
pub use port::PortWait;

/// Default per-strategy timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default inter-probe interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// What a strategy gets to probe with: the facade, the container id and the
/// ports resolved after start.
pub struct WaitContext<'a> {
    /// Docker API facade.
    pub api: &'a dyn DockerApi,

    /// Container under observation.
    pub container_id: &'a str,

    /// Ports resolved from the post-start inspect.
    pub ports: &'a [ResolvedPort],
}

impl WaitContext<'_> {
    /// Host port bound to `container_port`, if any.
    #[must_use]
    pub fn mapped_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container_port == container_port)
            .map(|p| p.host_port)
    }
}

/// A readiness probe, one of four kinds.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Execute a command inside the container until it exits 0.
    Command(CommandWait),

    /// Match a regex against the container's stdout+stderr.
    Log(LogWait),

    /// Probe an HTTP endpoint on the mapped host port.
    Http(HttpWait),

    /// Probe that the mapped host port accepts TCP.
    Port(PortWait),
}

impl WaitStrategy {
    /// Command probe with default timeout and interval.
    #[must_use]
    pub fn command(cmd: Vec<String>) -> Self {
        Self::Command(CommandWait::new(cmd))
    }

    /// Log-regex probe with default timeout and interval.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex.
    #[must_use]
    pub fn log(pattern: &str) -> Self {
        Self::Log(LogWait::new(pattern))
    }

    /// HTTP probe with default timeout and interval.
    #[must_use]
    pub fn http(container_port: u16, path: &str, expected_status: u16) -> Self {
        Self::Http(HttpWait::new(container_port, path).with_expected_status(expected_status))
    }

    /// TCP port probe with default timeout and interval.
    #[must_use]
    pub fn port(container_port: u16) -> Self {
        Self::Port(PortWait::new(container_port))
    }

    /// Strategy name used in error kinds.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Log(_) => "log",
            Self::Http(_) => "http",
            Self::Port(_) => "port",
        }
    }

    /// Replace the wall-clock timeout.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match self {
            Self::Command(s) => Self::Command(s.with_timeout(timeout)),
            Self::Log(s) => Self::Log(s.with_timeout(timeout)),
            Self::Http(s) => Self::Http(s.with_timeout(timeout)),
            Self::Port(s) => Self::Port(s.with_timeout(timeout)),
        }
    }

    /// Replace the inter-probe interval.
    #[must_use]
    pub fn with_interval(self, interval: Duration) -> Self {
        match self {
            Self::Command(s) => Self::Command(s.with_interval(interval)),
            Self::Log(s) => Self::Log(s.with_interval(interval)),
            Self::Http(s) => Self::Http(s.with_interval(interval)),
            Self::Port(s) => Self::Port(s.with_interval(interval)),
        }
    }

    /// Block until the strategy's condition holds, its timeout elapses or a
    /// transport error occurs.
    ///
    /// # Errors
    ///
    /// [`crate::Error::WaitTimeout`] when the timeout elapses,
    /// [`crate::Error::WaitFailed`] on a non-retryable strategy failure, or
    /// any propagated facade error.
    pub async fn wait_until_ready(&self, ctx: &WaitContext<'_>) -> Result<()> {
        match self {
            Self::Command(s) => s.wait_until_ready(ctx).await,
            Self::Log(s) => s.wait_until_ready(ctx).await,
            Self::Http(s) => s.wait_until_ready(ctx).await,
            Self::Port(s) => s.wait_until_ready(ctx).await,
        }
    }
}

/// Run strategies in declaration order; the first failure short-circuits.
pub async fn run_pipeline(strategies: &[WaitStrategy], ctx: &WaitContext<'_>) -> Result<()> {
    for strategy in strategies {
        tracing::debug!(
            id = %ctx.container_id,
            strategy = strategy.name(),
            "running wait strategy"
        );
        strategy.wait_until_ready(ctx).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DockerApi, FakeDockerApi};
    use crate::descriptor::ContainerDescriptor;
    use crate::error::Error;

    fn strings(cmd: &[&str]) -> Vec<String> {
        cmd.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn test_pipeline_runs_in_order() {
        let api = FakeDockerApi::new();
        let id = api
            .create_container(&ContainerDescriptor::new("redis:7.2"))
            .await
            .expect("create");

        let strategies = vec![
            WaitStrategy::command(strings(&["first"])),
            WaitStrategy::command(strings(&["second"])),
        ];
        let ctx = WaitContext {
            api: &api,
            container_id: &id,
            ports: &[],
        };
        run_pipeline(&strategies, &ctx).await.expect("pipeline");

        let ops = api.operations().await;
        let execs: Vec<&String> = ops.iter().filter(|op| op.starts_with("exec")).collect();
        assert_eq!(execs, ["exec first", "exec second"]);
    }

    #[tokio::test]
    async fn test_pipeline_short_circuits_on_failure() {
        let api = FakeDockerApi::new();
        let id = api
            .create_container(&ContainerDescriptor::new("redis:7.2"))
            .await
            .expect("create");
        api.script_exec(&["failing"], 1).await;

        let strategies = vec![
            WaitStrategy::command(strings(&["failing"]))
                .with_timeout(Duration::from_millis(100))
                .with_interval(Duration::from_millis(20)),
            WaitStrategy::command(strings(&["never-run"])),
        ];
        let ctx = WaitContext {
            api: &api,
            container_id: &id,
            ports: &[],
        };

        let err = run_pipeline(&strategies, &ctx).await.expect_err("timeout");
        assert!(matches!(err, Error::WaitTimeout { strategy: "command" }));

        let ops = api.operations().await;
        assert!(
            !ops.iter().any(|op| op == "exec never-run"),
            "later strategies must not run after a failure: {ops:?}"
        );
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(WaitStrategy::port(80).name(), "port");
        assert_eq!(WaitStrategy::log("ready").name(), "log");
        assert_eq!(WaitStrategy::http(80, "/", 200).name(), "http");
        assert_eq!(WaitStrategy::command(vec!["true".to_string()]).name(), "command");
    }

    #[test]
    fn test_mapped_port_lookup() {
        use crate::handle::ResolvedPort;

        let api = FakeDockerApi::new();
        let ports = [ResolvedPort {
            container_port: 6379,
            host_port: 49160,
        }];
        let ctx = WaitContext {
            api: &api,
            container_id: "abc",
            ports: &ports,
        };
        assert_eq!(ctx.mapped_port(6379), Some(49160));
        assert_eq!(ctx.mapped_port(5432), None);
    }
}
