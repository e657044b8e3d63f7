//! Redis container config.

use std::time::Duration;

use drydock::{ContainerBuilder, ContainerDescriptor, WaitStrategy};

/// Canonical image prefix.
const CANONICAL_IMAGE: &str = "redis";

/// Default image.
const DEFAULT_IMAGE: &str = "redis:7.2";

/// Port Redis listens on inside the container.
pub const REDIS_PORT: u16 = 6379;

const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Declarative Redis config.
///
/// Defaults: `redis:7.2`, ephemeral host port, readiness via
/// `redis-cli PING`.
#[derive(Debug, Clone)]
pub struct RedisContainer {
    image: String,
    fixed_host_port: Option<u16>,
}

impl RedisContainer {
    /// Config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            fixed_host_port: None,
        }
    }

    /// Use a different Redis image.
    ///
    /// # Panics
    ///
    /// Panics if `image` does not start with `redis`.
    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        let image = image.into();
        assert!(
            image.starts_with(CANONICAL_IMAGE),
            "image {image:?} does not match canonical image {CANONICAL_IMAGE:?}"
        );
        self.image = image;
        self
    }

    /// Bind port 6379 to a fixed host port instead of an ephemeral one.
    ///
    /// # Panics
    ///
    /// Panics if `host_port` is zero.
    #[must_use]
    pub fn with_fixed_port(mut self, host_port: u16) -> Self {
        assert!(host_port != 0, "host port must be non-zero");
        self.fixed_host_port = Some(host_port);
        self
    }
}

impl Default for RedisContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder for RedisContainer {
    fn build(&self) -> ContainerDescriptor {
        let descriptor = ContainerDescriptor::new(&self.image);

        let descriptor = match self.fixed_host_port {
            Some(host_port) => descriptor.with_fixed_port(REDIS_PORT, host_port),
            None => descriptor.with_exposed_port(REDIS_PORT),
        };

        descriptor.with_wait_strategy(
            WaitStrategy::command(vec!["redis-cli".to_string(), "PING".to_string()])
                .with_timeout(READY_TIMEOUT),
        )
    }
}
