//! In-memory Docker API double for runtime-free tests.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::descriptor::ContainerDescriptor;
use crate::error::{Error, Result};
use crate::handle::{ContainerHandle, ResolvedPort};

use super::{DockerApi, ExecStatus};

#[derive(Debug, Clone)]
struct FakeContainer {
    descriptor: ContainerDescriptor,
    running: bool,
    ports: Vec<ResolvedPort>,
    logs: Vec<u8>,
    files: Vec<(String, Vec<u8>)>,
}

#[derive(Debug, Clone)]
struct FakeExec {
    cmd: Vec<String>,
    status: ExecStatus,
}

#[derive(Debug)]
struct FakeState {
    containers: HashMap<String, FakeContainer>,
    execs: HashMap<String, FakeExec>,
    /// Exit codes keyed by space-joined command; unknown commands exit 0.
    exec_results: HashMap<String, i64>,
    pulled: Vec<String>,
    ops: Vec<String>,
    next_id: u64,
    next_host_port: u16,
    gateway: String,
}

/// In-memory stand-in for the Docker Engine.
///
/// Containers are plain records: ephemeral ports are assigned from a
/// counter (or from [`FakeDockerApi::set_next_host_port`]), logs and exec
/// exit codes are scripted by the test, and every mutating call is recorded
/// so ordering can be asserted.
#[derive(Debug, Clone)]
pub struct FakeDockerApi {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeDockerApi {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDockerApi {
    /// Create an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                containers: HashMap::new(),
                execs: HashMap::new(),
                exec_results: HashMap::new(),
                pulled: Vec::new(),
                ops: Vec::new(),
                next_id: 0,
                next_host_port: 49152,
                gateway: "172.17.0.1".to_string(),
            })),
        }
    }

    /// Host port the next ephemeral assignment will use.
    pub async fn set_next_host_port(&self, port: u16) {
        self.state.lock().await.next_host_port = port;
    }

    /// Script the container's stdout+stderr bytes.
    pub async fn set_logs(&self, id: &str, logs: impl Into<Vec<u8>>) {
        if let Some(container) = self.state.lock().await.containers.get_mut(id) {
            container.logs = logs.into();
        }
    }

    /// Script the exit code for a command (matched on the full joined
    /// command). Unscripted commands exit 0.
    pub async fn script_exec(&self, cmd: &[&str], exit_code: i64) {
        self.state
            .lock()
            .await
            .exec_results
            .insert(cmd.join(" "), exit_code);
    }

    /// Every mutating call, in order (`"create <id>"`, `"kill <id>"`, …).
    pub async fn operations(&self) -> Vec<String> {
        self.state.lock().await.ops.clone()
    }

    /// Images pulled so far.
    pub async fn pulled_images(&self) -> Vec<String> {
        self.state.lock().await.pulled.clone()
    }

    /// Files uploaded into a container.
    pub async fn files_of(&self, id: &str) -> Vec<(String, Vec<u8>)> {
        self.state
            .lock()
            .await
            .containers
            .get(id)
            .map(|c| c.files.clone())
            .unwrap_or_default()
    }

    /// Ids of containers currently present.
    pub async fn container_ids(&self) -> Vec<String> {
        self.state.lock().await.containers.keys().cloned().collect()
    }
}

fn not_found(id: &str) -> Error {
    Error::Http {
        status: 404,
        message: format!("no such container: {id}"),
    }
}

impl DockerApi for FakeDockerApi {
    fn pull_image<'a>(
        &'a self,
        image: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.pulled.push(image.to_string());
            state.ops.push(format!("pull {image}"));
            Ok(())
        })
    }

    fn create_container<'a>(
        &'a self,
        descriptor: &'a ContainerDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = format!("{:064x}", state.next_id);

            let mut ports = Vec::new();
            for mapping in &descriptor.exposed_ports {
                let host_port = match mapping.host_port {
                    Some(fixed) => fixed,
                    None => {
                        let assigned = state.next_host_port;
                        state.next_host_port += 1;
                        assigned
                    }
                };
                ports.push(ResolvedPort {
                    container_port: mapping.container_port,
                    host_port,
                });
            }

            state.containers.insert(
                id.clone(),
                FakeContainer {
                    descriptor: descriptor.clone(),
                    running: false,
                    ports,
                    logs: Vec::new(),
                    files: Vec::new(),
                },
            );
            state.ops.push(format!("create {id}"));
            Ok(id)
        })
    }

    fn start_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
            container.running = true;
            state.ops.push(format!("start {id}"));
            Ok(())
        })
    }

    fn kill_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
            container.running = false;
            state.ops.push(format!("kill {id}"));
            Ok(())
        })
    }

    fn remove_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state
                .containers
                .remove(id)
                .ok_or_else(|| not_found(id))?;
            state.ops.push(format!("remove {id}"));
            Ok(())
        })
    }

    fn get_container<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ContainerHandle>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
            Ok(ContainerHandle {
                id: id.to_string(),
                image: container.descriptor.image.clone(),
                ports: container.ports.clone(),
                env: container.descriptor.env.clone(),
                labels: container.descriptor.labels.clone(),
            })
        })
    }

    fn create_exec<'a>(
        &'a self,
        id: &'a str,
        cmd: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !state.containers.contains_key(id) {
                return Err(not_found(id));
            }
            let exec_id = format!("exec-{}", state.execs.len() + 1);
            state.ops.push(format!("exec {}", cmd.join(" ")));
            state.execs.insert(
                exec_id.clone(),
                FakeExec {
                    cmd: cmd.to_vec(),
                    status: ExecStatus {
                        running: true,
                        exit_code: None,
                    },
                },
            );
            Ok(exec_id)
        })
    }

    fn start_exec<'a>(
        &'a self,
        exec_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let exit_code = {
                let exec = state.execs.get(exec_id).ok_or_else(|| not_found(exec_id))?;
                *state.exec_results.get(&exec.cmd.join(" ")).unwrap_or(&0)
            };
            let exec = state.execs.get_mut(exec_id).ok_or_else(|| not_found(exec_id))?;
            exec.status = ExecStatus {
                running: false,
                exit_code: Some(exit_code),
            };
            Ok(())
        })
    }

    fn inspect_exec<'a>(
        &'a self,
        exec_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ExecStatus>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let exec = state.execs.get(exec_id).ok_or_else(|| not_found(exec_id))?;
            Ok(exec.status)
        })
    }

    fn stdout_logs<'a>(
        &'a self,
        id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let container = state.containers.get(id).ok_or_else(|| not_found(id))?;
            Ok(container.logs.clone())
        })
    }

    fn bridge_gateway(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move { Ok(self.state.lock().await.gateway.clone()) })
    }

    fn put_file<'a>(
        &'a self,
        id: &'a str,
        path: &'a str,
        contents: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let container = state.containers.get_mut(id).ok_or_else(|| not_found(id))?;
            container.files.push((path.to_string(), contents.to_vec()));
            state.ops.push(format!("put_file {id} {path}"));
            Ok(())
        })
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move { Ok(()) })
    }
}
