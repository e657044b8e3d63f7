//! Docker API facade.
//!
//! [`DockerApi`] is the seam between the lifecycle engine and the Engine
//! HTTP transport: pure request/reply operations, no retries, no
//! concurrency. [`EngineClient`] backs it with bollard;
//! [`FakeDockerApi`] is an in-memory double for runtime-free tests.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::ContainerDescriptor;
use crate::error::Result;
use crate::handle::ContainerHandle;

pub mod engine;
pub mod fake;

pub use engine::EngineClient;
pub use fake::FakeDockerApi;

/// Observation of an exec instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecStatus {
    /// Whether the exec process is still running.
    pub running: bool,

    /// Exit code, once the process has finished.
    pub exit_code: Option<i64>,
}

/// Typed operations over the Docker Engine HTTP API.
///
/// Object-safe so the session manager and wait strategies can share one
/// transport behind `Arc<dyn DockerApi>`.
pub trait DockerApi: Send + Sync {
    /// Pull an image. Idempotent at the Engine layer.
    fn pull_image<'a>(
        &'a self,
        image: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Create a container from a descriptor, returning its id.
    fn create_container<'a>(
        &'a self,
        descriptor: &'a ContainerDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Start a created container.
    fn start_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Kill a running container.
    fn kill_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Delete a container.
    fn remove_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Inspect a container and derive its handle.
    fn get_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ContainerHandle>> + Send + 'a>>;

    /// Create an exec instance for a command, returning the exec id.
    fn create_exec<'a>(
        &'a self,
        id: &'a str,
        cmd: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Start an exec instance detached.
    fn start_exec<'a>(
        &'a self,
        exec_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Inspect an exec instance.
    fn inspect_exec<'a>(
        &'a self,
        exec_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ExecStatus>> + Send + 'a>>;

    /// Fetch the container's stdout and stderr streams.
    fn stdout_logs<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

    /// Gateway address of the default bridge network.
    fn bridge_gateway(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>>;

    /// Write a single file into the container via the archive endpoint.
    fn put_file<'a>(
        &'a self,
        id: &'a str,
        path: &'a str,
        contents: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Check that the daemon is reachable.
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Composite operations over [`DockerApi`].
pub trait DockerApiExt: DockerApi {
    /// Stop a container: kill, then delete. Both calls are issued in that
    /// order; a kill failure aborts before the delete.
    fn stop_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            debug!(id = %id, "stopping container");
            self.kill_container(id).await?;
            self.remove_container(id).await
        })
    }
}

impl<T: DockerApi + ?Sized> DockerApiExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_container_kills_then_deletes() {
        let api = FakeDockerApi::new();
        let descriptor = ContainerDescriptor::new("redis:7.2");
        let id = api.create_container(&descriptor).await.expect("create");
        api.start_container(&id).await.expect("start");

        api.stop_container(&id).await.expect("stop");

        let ops = api.operations().await;
        let kill_pos = ops.iter().position(|op| op == &format!("kill {id}"));
        let remove_pos = ops.iter().position(|op| op == &format!("remove {id}"));
        assert!(kill_pos.is_some(), "kill was not issued: {ops:?}");
        assert!(remove_pos.is_some(), "remove was not issued: {ops:?}");
        assert!(kill_pos < remove_pos, "kill must precede remove: {ops:?}");
    }

    #[tokio::test]
    async fn test_stop_container_aborts_on_kill_failure() {
        let api = FakeDockerApi::new();
        let result = api.stop_container("missing").await;
        assert!(result.is_err());

        let ops = api.operations().await;
        assert!(
            !ops.iter().any(|op| op.starts_with("remove")),
            "delete must not run after a failed kill: {ops:?}"
        );
    }
}
