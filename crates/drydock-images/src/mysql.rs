//! MySQL container config.

use std::time::Duration;

use drydock::{ContainerBuilder, ContainerDescriptor, WaitStrategy};

/// Canonical image prefix.
const CANONICAL_IMAGE: &str = "mysql";

/// Default image.
const DEFAULT_IMAGE: &str = "mysql:8";

/// Port MySQL listens on inside the container.
pub const MYSQL_PORT: u16 = 3306;

// MySQL initializes its data directory on first boot; allow for it.
const READY_TIMEOUT: Duration = Duration::from_secs(120);

/// Declarative MySQL config.
///
/// Defaults: `mysql:8`, user/password/database `test`, a randomized root
/// password, ephemeral host port, readiness via `mysqladmin ping`.
#[derive(Debug, Clone)]
pub struct MySqlContainer {
    image: String,
    user: String,
    password: String,
    database: String,
    fixed_host_port: Option<u16>,
}

impl MySqlContainer {
    /// Config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            user: "test".to_string(),
            password: "test".to_string(),
            database: "test".to_string(),
            fixed_host_port: None,
        }
    }

    /// Use a different MySQL image.
    ///
    /// # Panics
    ///
    /// Panics if `image` does not start with `mysql`.
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

    /// Set the application user name.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the application user password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the default database name.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Bind port 3306 to a fixed host port instead of an ephemeral one.
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

    /// Configured user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Configured password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Configured database.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }
}

impl Default for MySqlContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder for MySqlContainer {
    fn build(&self) -> ContainerDescriptor {
        let descriptor = ContainerDescriptor::new(&self.image)
            .with_env("MYSQL_USER", &self.user)
            .with_env("MYSQL_PASSWORD", &self.password)
            .with_env("MYSQL_DATABASE", &self.database)
            .with_env("MYSQL_RANDOM_ROOT_PASSWORD", "yes");

        let descriptor = match self.fixed_host_port {
            Some(host_port) => descriptor.with_fixed_port(MYSQL_PORT, host_port),
            None => descriptor.with_exposed_port(MYSQL_PORT),
        };

        descriptor.with_wait_strategy(
            WaitStrategy::command(vec![
                "mysqladmin".to_string(),
                "ping".to_string(),
                "-h".to_string(),
                "localhost".to_string(),
                format!("-u{}", self.user),
                format!("-p{}", self.password),
            ])
            .with_timeout(READY_TIMEOUT),
        )
    }
}
