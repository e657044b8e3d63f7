//! # drydock-images
//!
//! Ready-made declarative configs for common test dependencies, built on
//! [`drydock::ContainerBuilder`]: Postgres, MySQL, Redis and Kafka.
//!
//! Each config validates its canonical image, injects the environment the
//! image needs, and attaches a readiness probe, so a test only states what
//! it wants:
//!
//! ```rust,no_run
//! use drydock::Session;
//! use drydock_images::PostgresContainer;
//!
//! # async fn example() -> drydock::Result<()> {
//! let session = Session::global().await?;
//! let postgres = session
//!     .start_container(&PostgresContainer::new().with_database("orders"))
//!     .await?;
//! let port = postgres.mapped_port(5432).expect("mapped");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod kafka;
pub mod mysql;
pub mod postgres;
pub mod redis;

pub use kafka::KafkaContainer;
pub use mysql::MySqlContainer;
pub use postgres::PostgresContainer;
pub use redis::RedisContainer;
