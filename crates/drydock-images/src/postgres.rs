//! Postgres container config.

use std::time::Duration;

use drydock::{ContainerBuilder, ContainerDescriptor, WaitStrategy};

/// Canonical image prefix.
const CANONICAL_IMAGE: &str = "postgres";

/// Default image.
const DEFAULT_IMAGE: &str = "postgres:15.4";

/// Port Postgres listens on inside the container.
pub const POSTGRES_PORT: u16 = 5432;

const READY_TIMEOUT: Duration = Duration::from_secs(60);

/// Declarative Postgres config.
///
/// Defaults: `postgres:15.4`, user/password/database `test`, ephemeral host
/// port, readiness via `pg_isready`.
#[derive(Debug, Clone)]
pub struct PostgresContainer {
    image: String,
    user: String,
    password: String,
    database: String,
    fixed_host_port: Option<u16>,
}

impl PostgresContainer {
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

    /// Use a different Postgres image (tag, registry mirror, …).
    ///
    /// # Panics
    ///
    /// Panics if `image` does not start with `postgres`.
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

    /// Set the superuser name.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the superuser password.
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

    /// Bind port 5432 to a fixed host port instead of an ephemeral one.
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

impl Default for PostgresContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder for PostgresContainer {
    fn build(&self) -> ContainerDescriptor {
        let descriptor = ContainerDescriptor::new(&self.image)
            .with_env("POSTGRES_USER", &self.user)
            .with_env("POSTGRES_PASSWORD", &self.password)
            .with_env("POSTGRES_DB", &self.database);

        let descriptor = match self.fixed_host_port {
            Some(host_port) => descriptor.with_fixed_port(POSTGRES_PORT, host_port),
            None => descriptor.with_exposed_port(POSTGRES_PORT),
        };

        descriptor.with_wait_strategy(
            WaitStrategy::command(vec![
                "pg_isready".to_string(),
                "-U".to_string(),
                self.user.clone(),
            ])
            .with_timeout(READY_TIMEOUT),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_defaults() {
        let descriptor = PostgresContainer::new().build();
        assert_eq!(descriptor.image, "postgres:15.4");
        assert_eq!(descriptor.env["POSTGRES_USER"], "test");
        assert_eq!(descriptor.env["POSTGRES_PASSWORD"], "test");
        assert_eq!(descriptor.env["POSTGRES_DB"], "test");
        assert_eq!(descriptor.exposed_ports.len(), 1);
        assert_eq!(descriptor.exposed_ports[0].container_port, POSTGRES_PORT);
        assert!(descriptor.exposed_ports[0].host_port.is_none());
        assert_eq!(descriptor.wait_strategies.len(), 1);
        assert_eq!(descriptor.wait_strategies[0].name(), "command");
    }

    #[test]
    fn test_postgres_credentials_flow_into_env() {
        let descriptor = PostgresContainer::new()
            .with_user("app")
            .with_password("s3cret")
            .with_database("orders")
            .build();
        assert_eq!(descriptor.env["POSTGRES_USER"], "app");
        assert_eq!(descriptor.env["POSTGRES_PASSWORD"], "s3cret");
        assert_eq!(descriptor.env["POSTGRES_DB"], "orders");
    }

    #[test]
    fn test_postgres_fixed_port() {
        let descriptor = PostgresContainer::new().with_fixed_port(5433).build();
        assert_eq!(descriptor.exposed_ports[0].container_port, 5432);
        assert_eq!(descriptor.exposed_ports[0].host_port, Some(5433));
    }

    #[test]
    fn test_postgres_accepts_other_tags() {
        let descriptor = PostgresContainer::new()
            .with_image("postgres:16-alpine")
            .build();
        assert_eq!(descriptor.image, "postgres:16-alpine");
    }

    #[test]
    #[should_panic(expected = "does not match canonical image")]
    fn test_postgres_rejects_foreign_image() {
        let _ = PostgresContainer::new().with_image("mysql:8");
    }
}
