//! Reaper sidecar client.
//!
//! The reaper is a long-lived companion container
//! (`testcontainers/ryuk`) watching the Docker daemon. A session registers
//! its label filter over a line-framed TCP connection once; from then on the
//! open socket is the session's liveness signal. When the socket closes —
//! clean exit or crash — the reaper deletes every container matching the
//! filter.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::api::DockerApi;
use crate::descriptor::{BindMode, ContainerDescriptor};
use crate::error::{Error, Result};

/// Reaper sidecar image.
pub const RYUK_IMAGE: &str = "testcontainers/ryuk:0.5.1";

/// Port the reaper listens on inside its container.
pub const RYUK_PORT: u16 = 8080;

/// How long the reaper gets to acknowledge a filter registration.
const ACK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Descriptor for the reaper sidecar. The reaper talks to the daemon
/// through the host's Docker socket and must not carry the session labels
/// itself.
pub(crate) fn reaper_descriptor() -> ContainerDescriptor {
    ContainerDescriptor::new(RYUK_IMAGE)
        .with_exposed_port(RYUK_PORT)
        .with_env("RYUK_PORT", RYUK_PORT.to_string())
        .with_bind_mount("/var/run/docker.sock", "/var/run/docker.sock", BindMode::Rw)
}

/// One registration line: `label=<k>=<v>` pairs joined with `&`, newline
/// terminated. Label keys and values are plain label-safe ASCII, so the
/// URL-encoded form is the text itself.
pub(crate) fn filter_line(labels: &BTreeMap<String, String>) -> String {
    let mut line = labels
        .iter()
        .map(|(k, v)| format!("label={k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    line.push('\n');
    line
}

/// An established, registered connection to the reaper sidecar.
///
/// Holding the value keeps the TCP stream — and with it the session's
/// containers — alive. Dropping it is the signal to sweep.
#[derive(Debug)]
pub struct ReaperConnection {
    container_id: String,
    _stream: BufReader<TcpStream>,
}

impl ReaperConnection {
    /// Provision the reaper container and run the registration handshake.
    ///
    /// # Errors
    ///
    /// Propagates facade errors from the container lifecycle;
    /// [`Error::ReaperConnectFailed`] when the TCP connection cannot be
    /// opened and [`Error::ReaperAckMissing`] when no `ACK` arrives within
    /// one second.
    pub(crate) async fn establish(
        api: &dyn DockerApi,
        labels: &BTreeMap<String, String>,
    ) -> Result<Self> {
        api.pull_image(RYUK_IMAGE).await?;
        let descriptor = reaper_descriptor();
        let id = api.create_container(&descriptor).await?;
        api.start_container(&id).await?;

        let handle = api.get_container(&id).await?;
        let host_port = handle
            .mapped_port(RYUK_PORT)
            .ok_or_else(|| Error::ReaperConnectFailed("reaper port is not mapped".to_string()))?;

        debug!(id = %id, port = host_port, "connecting to reaper");
        let stream = TcpStream::connect(("127.0.0.1", host_port))
            .await
            .map_err(|e| Error::ReaperConnectFailed(e.to_string()))?;
        let mut stream = BufReader::new(stream);

        register(&mut stream, labels).await?;
        info!(id = %id, "reaper registered");

        Ok(Self {
            container_id: id,
            _stream: stream,
        })
    }

    /// Id of the reaper container.
    #[must_use]
    pub fn container_id(&self) -> &str {
        &self.container_id
    }
}

/// Send the filter line and wait for the `ACK` line.
async fn register(
    stream: &mut BufReader<TcpStream>,
    labels: &BTreeMap<String, String>,
) -> Result<()> {
    let line = filter_line(labels);
    stream
        .write_all(line.as_bytes())
        .await
        .map_err(|e| Error::ReaperConnectFailed(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| Error::ReaperConnectFailed(e.to_string()))?;

    let mut response = String::new();
    match tokio::time::timeout(ACK_TIMEOUT, stream.read_line(&mut response)).await {
        Err(_) => Err(Error::ReaperAckMissing),
        Ok(Err(e)) => Err(Error::ReaperConnectFailed(e.to_string())),
        Ok(Ok(0)) => Err(Error::ReaperAckMissing),
        Ok(Ok(_)) if response.trim_end() == "ACK" => Ok(()),
        Ok(Ok(_)) => Err(Error::ReaperAckMissing),
    }
}
