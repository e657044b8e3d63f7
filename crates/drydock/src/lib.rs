//! # drydock
//!
//! Ephemeral Docker containers for integration tests.
//!
//! Describe the container a test needs — image, ports, environment,
//! readiness probes — and drydock pulls the image, creates and starts the
//! container through the Docker Engine API, blocks until the service is
//! observably ready, and hands back the mapped host ports. A reaper sidecar
//! registered at session start deletes everything the session created once
//! the process exits, even if it crashes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use drydock::{ContainerDescriptor, Session, WaitStrategy};
//!
//! # async fn example() -> drydock::Result<()> {
//! let session = Session::global().await?;
//!
//! let redis = session
//!     .start_container(
//!         &ContainerDescriptor::new("redis:7.2")
//!             .with_exposed_port(6379)
//!             .with_wait_strategy(WaitStrategy::command(vec![
//!                 "redis-cli".into(),
//!                 "PING".into(),
//!             ])),
//!     )
//!     .await?;
//!
//! let port = redis.mapped_port(6379).expect("6379 is mapped");
//! // connect your client to 127.0.0.1:{port} …
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     Session (actor)                    │
//! │   labels · session id · reaper socket · mailbox loop   │
//! └───────────────┬───────────────────────┬────────────────┘
//!                 │                       │
//!                 ▼                       ▼
//! ┌───────────────────────────┐  ┌──────────────────────────┐
//! │    DockerApi (facade)     │  │  WaitStrategy pipeline   │
//! │  EngineClient / fake      │  │  command·log·http·port   │
//! └───────────────────────────┘  └──────────────────────────┘
//! ```
//!
//! The session resolves its transport from `DOCKER_HOST` (or the default
//! Unix socket), serializes lifecycle requests through a mailbox, and runs
//! the long I/O in detached workers. Readiness probes retry on an interval
//! and are bounded by wall-clock timeouts.
//!
//! Image-specific configs (Postgres, MySQL, Redis, Kafka) live in the
//! `drydock-images` crate and compose on [`ContainerBuilder`].

#![forbid(unsafe_code)]

pub mod api;
pub mod builder;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod labels;
pub mod reaper;
pub mod session;
pub mod wait;

pub use api::{DockerApi, DockerApiExt, EngineClient, ExecStatus, FakeDockerApi};
pub use builder::ContainerBuilder;
pub use descriptor::{
    BindMode, BindMount, ContainerDescriptor, ContainerFile, PortMapping, VolumeBinding,
};
pub use error::{Error, Result};
pub use handle::{ContainerHandle, ResolvedPort};
pub use session::Session;
pub use wait::{CommandWait, HttpWait, LogWait, PortWait, WaitStrategy};
