//! Process-wide session manager.
//!
//! One session owns the Docker connection, a fresh session id, and the
//! reaper registration. All lifecycle operations are funneled through a
//! mailbox; the loop owns the mutable state and dispatches the long I/O to
//! detached worker tasks operating on immutable snapshots, so one slow
//! start never blocks another.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha1::{Digest, Sha1};
use tokio::sync::{mpsc, oneshot, OnceCell};
use tracing::{debug, info, warn};

use crate::api::{DockerApi, DockerApiExt, EngineClient, ExecStatus};
use crate::builder::ContainerBuilder;
use crate::descriptor::ContainerDescriptor;
use crate::error::{Error, Result};
use crate::handle::ContainerHandle;
use crate::labels::session_labels;
use crate::reaper::ReaperConnection;
use crate::wait::{run_pipeline, WaitContext};

/// Caller-side cap on any single session operation.
const CALL_TIMEOUT: Duration = Duration::from_millis(300_000);

const MAILBOX_CAPACITY: usize = 64;

static GLOBAL_SESSION: OnceCell<Session> = OnceCell::const_new();

enum Command {
    Start {
        descriptor: ContainerDescriptor,
        reply: oneshot::Sender<Result<ContainerHandle>>,
    },
    Stop {
        id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Result<ContainerHandle>>,
    },
    CreateExec {
        id: String,
        cmd: Vec<String>,
        reply: oneshot::Sender<Result<String>>,
    },
    StartExec {
        exec_id: String,
        reply: oneshot::Sender<Result<()>>,
    },
    InspectExec {
        exec_id: String,
        reply: oneshot::Sender<Result<ExecStatus>>,
    },
    Logs {
        id: String,
        reply: oneshot::Sender<Result<Vec<u8>>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to a running session.
///
/// ```rust,no_run
/// use drydock::{ContainerDescriptor, Session, WaitStrategy};
///
/// # async fn example() -> drydock::Result<()> {
/// let session = Session::global().await?;
/// let handle = session
///     .start_container(
///         &ContainerDescriptor::new("redis:7.2")
///             .with_exposed_port(6379)
///             .with_wait_strategy(WaitStrategy::command(vec![
///                 "redis-cli".into(),
///                 "PING".into(),
///             ])),
///     )
///     .await?;
/// let port = handle.mapped_port(6379).expect("mapped");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Session {
    tx: mpsc::Sender<Command>,
    session_id: String,
    reaper_container_id: String,
}

impl Session {
    /// The process-wide session, initialized on first use.
    ///
    /// Resolves the transport from the environment, validates the daemon is
    /// reachable, and runs the reaper handshake. Initialization happens at
    /// most once per process; failures are not cached, so a later call
    /// retries.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionFailed`] when the daemon is unreachable, reaper
    /// errors when the sidecar cannot be provisioned or does not
    /// acknowledge.
    pub async fn global() -> Result<&'static Session> {
        GLOBAL_SESSION
            .get_or_try_init(|| async {
                let api = EngineClient::connect_from_env()?;
                api.ping().await?;
                Session::start_with(Arc::new(api)).await
            })
            .await
    }

    /// Start a session over a custom transport.
    ///
    /// This is the non-singleton entry point; tests use it with an
    /// in-memory facade.
    ///
    /// # Errors
    ///
    /// Reaper provisioning and handshake errors fail the session.
    pub async fn start_with(api: Arc<dyn DockerApi>) -> Result<Self> {
        let session_id = new_session_id();
        let labels = session_labels(&session_id);

        let reaper = ReaperConnection::establish(api.as_ref(), &labels).await?;
        let reaper_container_id = reaper.container_id().to_string();
        info!(
            session_id = %session_id,
            reaper = %reaper_container_id,
            "session initialized"
        );

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        tokio::spawn(run_session(
            rx,
            SessionState {
                api,
                labels,
                reaper: Some(reaper),
            },
        ));

        Ok(Self {
            tx,
            session_id,
            reaper_container_id,
        })
    }

    /// The 40-hex session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Id of the reaper sidecar container.
    #[must_use]
    pub fn reaper_container_id(&self) -> &str {
        &self.reaper_container_id
    }

    /// Build the config, label the result with the session's reserved
    /// labels, then pull, create, start, deliver files, run the wait
    /// pipeline and inspect.
    ///
    /// A failure at any step aborts and is returned; a container created
    /// before the failure stays alive for the reaper.
    ///
    /// # Errors
    ///
    /// Facade errors from any lifecycle step, wait errors from the
    /// readiness pipeline.
    pub async fn start_container(&self, config: &impl ContainerBuilder) -> Result<ContainerHandle> {
        let descriptor = config.build();
        self.call(|reply| Command::Start { descriptor, reply })
            .await
    }

    /// Stop a container: kill, then delete.
    ///
    /// # Errors
    ///
    /// Facade errors from either call.
    pub async fn stop_container(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.call(|reply| Command::Stop { id, reply }).await
    }

    /// Inspect a container.
    ///
    /// # Errors
    ///
    /// Facade errors, including HTTP 404 for unknown containers.
    pub async fn get_container(&self, id: &str) -> Result<ContainerHandle> {
        let id = id.to_string();
        self.call(|reply| Command::Get { id, reply }).await
    }

    /// Create an exec instance.
    ///
    /// # Errors
    ///
    /// Facade errors.
    pub async fn create_exec(&self, id: &str, cmd: Vec<String>) -> Result<String> {
        let id = id.to_string();
        self.call(|reply| Command::CreateExec { id, cmd, reply })
            .await
    }

    /// Start an exec instance.
    ///
    /// # Errors
    ///
    /// Facade errors.
    pub async fn start_exec(&self, exec_id: &str) -> Result<()> {
        let exec_id = exec_id.to_string();
        self.call(|reply| Command::StartExec { exec_id, reply })
            .await
    }

    /// Inspect an exec instance.
    ///
    /// # Errors
    ///
    /// Facade errors.
    pub async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus> {
        let exec_id = exec_id.to_string();
        self.call(|reply| Command::InspectExec { exec_id, reply })
            .await
    }

    /// Fetch a container's stdout and stderr.
    ///
    /// # Errors
    ///
    /// Facade errors.
    pub async fn stdout_logs(&self, id: &str) -> Result<Vec<u8>> {
        let id = id.to_string();
        self.call(|reply| Command::Logs { id, reply }).await
    }

    /// Shut the session down, dropping the reaper connection so the sweep
    /// runs now instead of at process exit. Mostly useful in tests.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Close { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::SessionUnavailable("session task is gone".to_string()))?;

        match tokio::time::timeout(CALL_TIMEOUT, reply_rx).await {
            Err(_) => Err(Error::SessionUnavailable(
                "no reply within 300000 ms".to_string(),
            )),
            Ok(Err(_)) => Err(Error::SessionUnavailable(
                "reply channel closed".to_string(),
            )),
            Ok(Ok(result)) => result,
        }
    }
}

struct SessionState {
    api: Arc<dyn DockerApi>,
    labels: BTreeMap<String, String>,
    reaper: Option<ReaperConnection>,
}

/// The mailbox loop. Owns the session state; never awaits worker I/O.
async fn run_session(mut rx: mpsc::Receiver<Command>, mut state: SessionState) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Start { descriptor, reply } => {
                let api = Arc::clone(&state.api);
                let labels = state.labels.clone();
                tokio::spawn(async move {
                    let _ = reply.send(start_container_task(api, labels, descriptor).await);
                });
            }
            Command::Stop { id, reply } => {
                let api = Arc::clone(&state.api);
                tokio::spawn(async move {
                    let _ = reply.send(api.stop_container(&id).await);
                });
            }
            Command::Get { id, reply } => {
                let api = Arc::clone(&state.api);
                tokio::spawn(async move {
                    let _ = reply.send(api.get_container(&id).await);
                });
            }
            Command::CreateExec { id, cmd, reply } => {
                let api = Arc::clone(&state.api);
                tokio::spawn(async move {
                    let _ = reply.send(api.create_exec(&id, &cmd).await);
                });
            }
            Command::StartExec { exec_id, reply } => {
                let api = Arc::clone(&state.api);
                tokio::spawn(async move {
                    let _ = reply.send(api.start_exec(&exec_id).await);
                });
            }
            Command::InspectExec { exec_id, reply } => {
                let api = Arc::clone(&state.api);
                tokio::spawn(async move {
                    let _ = reply.send(api.inspect_exec(&exec_id).await);
                });
            }
            Command::Logs { id, reply } => {
                let api = Arc::clone(&state.api);
                tokio::spawn(async move {
                    let _ = reply.send(api.stdout_logs(&id).await);
                });
            }
            Command::Close { reply } => {
                // Dropping the connection is the sweep signal.
                state.reaper.take();
                let _ = reply.send(());
                break;
            }
        }
    }
    debug!("session loop stopped");
}

/// One start operation, strictly ordered.
async fn start_container_task(
    api: Arc<dyn DockerApi>,
    labels: BTreeMap<String, String>,
    mut descriptor: ContainerDescriptor,
) -> Result<ContainerHandle> {
    // Reserved labels win over user labels of the same name.
    descriptor.labels.extend(labels);

    api.pull_image(&descriptor.image).await?;
    let id = api.create_container(&descriptor).await?;
    api.start_container(&id).await?;

    for file in &descriptor.files {
        api.put_file(&id, &file.container_path, &file.contents)
            .await?;
    }

    let started = api.get_container(&id).await?;
    let ctx = WaitContext {
        api: api.as_ref(),
        container_id: &id,
        ports: &started.ports,
    };
    if let Err(e) = run_pipeline(&descriptor.wait_strategies, &ctx).await {
        warn!(id = %id, error = %e, "container did not become ready; left for the reaper");
        return Err(e);
    }

    api.get_container(&id).await
}

/// 40 hex chars: SHA-1 over the process id and the current UTC timestamp.
fn new_session_id() -> String {
    let mut hasher = Sha1::new();
    hasher.update(std::process::id().to_be_bytes());
    hasher.update(Utc::now().to_rfc3339().as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FakeDockerApi;
    use crate::labels::{LANG_LABEL, MARKER_LABEL, SESSION_ID_LABEL, VERSION_LABEL};
    use crate::wait::WaitStrategy;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Fake reaper accepting any number of sessions, always acknowledging.
    async fn fake_reaper() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut socket = BufReader::new(socket);
                    let mut line = String::new();
                    if socket.read_line(&mut line).await.is_ok() {
                        let _ = socket.write_all(b"ACK\n").await;
                        let _ = socket.flush().await;
                    }
                    tokio::time::sleep(Duration::from_secs(60)).await;
                });
            }
        });
        port
    }

    async fn fake_session() -> (Session, FakeDockerApi) {
        let port = fake_reaper().await;
        let api = FakeDockerApi::new();
        api.set_next_host_port(port).await;
        let session = Session::start_with(Arc::new(api.clone()))
            .await
            .expect("session");
        (session, api)
    }

    #[tokio::test]
    async fn test_session_id_is_40_hex() {
        let (session, _api) = fake_session().await;
        assert_eq!(session.session_id().len(), 40);
        assert!(session
            .session_id()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_start_container_attaches_reserved_labels() {
        let (session, _api) = fake_session().await;

        let handle = session
            .start_container(
                &ContainerDescriptor::new("redis:7.2").with_label("team", "storage"),
            )
            .await
            .expect("start");

        assert_eq!(handle.labels[SESSION_ID_LABEL], session.session_id());
        assert_eq!(handle.labels[VERSION_LABEL], env!("CARGO_PKG_VERSION"));
        assert_eq!(handle.labels[LANG_LABEL], "rust");
        assert_eq!(handle.labels[MARKER_LABEL], "true");
        assert_eq!(handle.labels["team"], "storage");
    }

    #[tokio::test]
    async fn test_start_container_resolves_ports() {
        let (session, _api) = fake_session().await;

        let handle = session
            .start_container(
                &ContainerDescriptor::new("postgres:15.4")
                    .with_exposed_port(5432)
                    .with_fixed_port(5433, 15433),
            )
            .await
            .expect("start");

        let ephemeral = handle.mapped_port(5432).expect("ephemeral mapping");
        assert!(ephemeral > 0);
        assert_eq!(handle.mapped_port(5433), Some(15433));
    }

    #[tokio::test]
    async fn test_start_container_round_trips_env() {
        let (session, _api) = fake_session().await;

        let handle = session
            .start_container(
                &ContainerDescriptor::new("postgres:15.4")
                    .with_env("POSTGRES_USER", "app")
                    .with_env("POSTGRES_DB", "orders"),
            )
            .await
            .expect("start");

        assert_eq!(handle.env["POSTGRES_USER"], "app");
        assert_eq!(handle.env["POSTGRES_DB"], "orders");
    }

    #[tokio::test]
    async fn test_start_container_step_order() {
        let (session, api) = fake_session().await;

        let handle = session
            .start_container(
                &ContainerDescriptor::new("redis:7.2")
                    .with_file("/opt/init.sh", b"#!/bin/sh\n".to_vec()),
            )
            .await
            .expect("start");

        let ops = api.operations().await;
        let relevant: Vec<String> = ops
            .iter()
            .filter(|op| op.contains(&handle.id) || op.as_str() == "pull redis:7.2")
            .cloned()
            .collect();
        assert_eq!(
            relevant,
            vec![
                "pull redis:7.2".to_string(),
                format!("create {}", handle.id),
                format!("start {}", handle.id),
                format!("put_file {} /opt/init.sh", handle.id),
            ]
        );
    }

    #[tokio::test]
    async fn test_start_container_runs_wait_pipeline() {
        let (session, api) = fake_session().await;

        let handle = session
            .start_container(
                &ContainerDescriptor::new("redis:7.2").with_wait_strategy(WaitStrategy::command(
                    vec!["redis-cli".to_string(), "PING".to_string()],
                )),
            )
            .await
            .expect("start");
        assert!(!handle.id.is_empty());

        let ops = api.operations().await;
        assert!(ops.iter().any(|op| op == "exec redis-cli PING"));
    }

    #[tokio::test]
    async fn test_wait_failure_surfaces_and_leaves_container() {
        let (session, api) = fake_session().await;
        api.script_exec(&["false"], 1).await;

        let err = session
            .start_container(
                &ContainerDescriptor::new("redis:7.2").with_wait_strategy(
                    WaitStrategy::command(vec!["false".to_string()])
                        .with_timeout(Duration::from_millis(120))
                        .with_interval(Duration::from_millis(20)),
                ),
            )
            .await
            .expect_err("wait failure");
        assert!(matches!(err, Error::WaitTimeout { strategy: "command" }));

        // The failed container is not deleted here; the reaper owns it.
        assert_eq!(api.container_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_container_kills_then_deletes() {
        let (session, api) = fake_session().await;

        let handle = session
            .start_container(&ContainerDescriptor::new("redis:7.2"))
            .await
            .expect("start");
        session.stop_container(&handle.id).await.expect("stop");

        let ops = api.operations().await;
        let kill = ops.iter().position(|op| op == &format!("kill {}", handle.id));
        let remove = ops
            .iter()
            .position(|op| op == &format!("remove {}", handle.id));
        assert!(kill.expect("kill issued") < remove.expect("remove issued"));

        let err = session.get_container(&handle.id).await.expect_err("gone");
        assert!(matches!(err, Error::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_exec_passthrough() {
        let (session, api) = fake_session().await;
        api.script_exec(&["pg_isready"], 0).await;

        let handle = session
            .start_container(&ContainerDescriptor::new("postgres:15.4"))
            .await
            .expect("start");

        let exec_id = session
            .create_exec(&handle.id, vec!["pg_isready".to_string()])
            .await
            .expect("create exec");
        session.start_exec(&exec_id).await.expect("start exec");
        let status = session.inspect_exec(&exec_id).await.expect("inspect exec");
        assert!(!status.running);
        assert_eq!(status.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_init_fails_without_reaper_ack() {
        // A listener that accepts but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            let _keep = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let api = FakeDockerApi::new();
        api.set_next_host_port(port).await;

        let err = Session::start_with(Arc::new(api))
            .await
            .expect_err("no ack");
        assert!(matches!(err, Error::ReaperAckMissing));
    }

    #[tokio::test]
    async fn test_close_makes_session_unavailable() {
        let (session, _api) = fake_session().await;
        session.close().await;

        let err = session
            .start_container(&ContainerDescriptor::new("redis:7.2"))
            .await
            .expect_err("closed");
        assert!(matches!(err, Error::SessionUnavailable(_)));
    }

    #[test]
    fn test_new_session_ids_are_unique() {
        // Timestamps differ between calls at nanosecond resolution.
        let a = new_session_id();
        std::thread::sleep(Duration::from_millis(2));
        let b = new_session_id();
        assert_eq!(a.len(), 40);
        assert_ne!(a, b);
    }
}
