//! Error types for container lifecycle operations.

use thiserror::Error;

/// Errors surfaced by the lifecycle engine.
///
/// Configuration misuse (bad image prefix, zero port, invalid regex) is a
/// programming error and panics at builder time; everything that can fail at
/// runtime is returned as one of these variants.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to reach the Docker daemon.
    #[error("failed to connect to Docker daemon: {0}")]
    ConnectionFailed(String),

    /// The Engine answered with an unexpected HTTP status.
    #[error("Docker Engine returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Engine error message, if any.
        message: String,
    },

    /// The Engine reported a domain error inside an otherwise successful
    /// response (e.g. an error frame in the image pull stream).
    #[error("Docker Engine error: {0}")]
    Engine(String),

    /// Image pull failed.
    #[error("failed to pull image {image}: {reason}")]
    PullImageFailed {
        /// Image reference.
        image: String,
        /// Failure reason.
        reason: String,
    },

    /// Container creation failed.
    #[error("failed to create container: {0}")]
    CreateContainerFailed(String),

    /// Container start failed.
    #[error("failed to start container {id}: {reason}")]
    StartContainerFailed {
        /// Container id.
        id: String,
        /// Failure reason.
        reason: String,
    },

    /// The default bridge network has no gateway address.
    #[error("bridge network has no gateway")]
    NoGateway,

    /// A wait strategy did not observe readiness within its timeout.
    #[error("wait strategy {strategy} timed out")]
    WaitTimeout {
        /// Strategy name.
        strategy: &'static str,
    },

    /// A wait strategy failed for a reason other than its timeout.
    #[error("wait strategy {strategy} failed: {detail}")]
    WaitFailed {
        /// Strategy name.
        strategy: &'static str,
        /// Failure detail.
        detail: String,
    },

    /// The reaper sidecar did not acknowledge the label filter.
    #[error("reaper did not acknowledge filter registration")]
    ReaperAckMissing,

    /// Could not open the TCP connection to the reaper sidecar.
    #[error("failed to connect to reaper: {0}")]
    ReaperConnectFailed(String),

    /// The session actor is gone or did not answer within the caller cap.
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),
}

/// Result alias for container lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;
