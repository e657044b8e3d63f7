//! Kafka container config (embedded ZooKeeper).
//!
//! The Confluent image wants its advertised listeners before the broker
//! boots, but the BROKER listener address is only known inside the running
//! container. The config therefore parks the container command until a
//! starter script shows up, ships that script through the descriptor's
//! file delivery, and lets the script start ZooKeeper, export the
//! advertised listeners and exec the image entrypoint.

use std::time::Duration;

use drydock::{ContainerBuilder, ContainerDescriptor, WaitStrategy};

/// Canonical image prefix.
const CANONICAL_IMAGE: &str = "confluentinc/cp-kafka";

/// Default image.
const DEFAULT_IMAGE: &str = "confluentinc/cp-kafka:7.4.3";

/// Port of the OUTSIDE listener, reachable from the host.
pub const KAFKA_PORT: u16 = 9092;

/// Port of the BROKER listener, used for inter-broker traffic and
/// readiness probes inside the container.
pub const BROKER_PORT: u16 = 29092;

/// Embedded ZooKeeper client port.
pub const ZOOKEEPER_PORT: u16 = 2181;

/// Where the starter script is delivered.
const START_SCRIPT: &str = "/drydock_start.sh";

// Broker plus embedded ZooKeeper take a while on cold pulls.
const READY_TIMEOUT: Duration = Duration::from_secs(120);

/// Declarative Kafka config.
///
/// Defaults: `confluentinc/cp-kafka:7.4.3`, embedded ZooKeeper, fixed
/// host binding `9092:9092`, readiness once topic listing and broker API
/// version queries succeed.
#[derive(Debug, Clone)]
pub struct KafkaContainer {
    image: String,
    host_port: u16,
}

impl KafkaContainer {
    /// Config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            host_port: KAFKA_PORT,
        }
    }

    /// Use a different Confluent Kafka image.
    ///
    /// # Panics
    ///
    /// Panics if `image` does not start with `confluentinc/cp-kafka`.
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

    /// Bind the OUTSIDE listener to a different fixed host port.
    ///
    /// The port is baked into the advertised listeners, so it has to be
    /// fixed at build time; an ephemeral binding is not supported.
    ///
    /// # Panics
    ///
    /// Panics if `host_port` is zero.
    #[must_use]
    pub fn with_fixed_port(mut self, host_port: u16) -> Self {
        assert!(host_port != 0, "host port must be non-zero");
        self.host_port = host_port;
        self
    }

    /// The starter script: embedded ZooKeeper, runtime-resolved advertised
    /// listeners, then the image entrypoint.
    fn start_script(&self) -> String {
        format!(
            "#!/bin/bash\n\
             echo 'clientPort={ZOOKEEPER_PORT}' > zookeeper.properties\n\
             echo 'dataDir=/var/lib/zookeeper/data' >> zookeeper.properties\n\
             echo 'dataLogDir=/var/lib/zookeeper/log' >> zookeeper.properties\n\
             zookeeper-server-start zookeeper.properties &\n\
             export KAFKA_ADVERTISED_LISTENERS=\"BROKER://$(hostname -i | awk '{{print $1}}'):{BROKER_PORT},OUTSIDE://localhost:{}\"\n\
             exec /etc/confluent/docker/run\n",
            self.host_port
        )
    }
}

impl Default for KafkaContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder for KafkaContainer {
    fn build(&self) -> ContainerDescriptor {
        let broker = format!("localhost:{BROKER_PORT}");

        ContainerDescriptor::new(&self.image)
            .with_fixed_port(KAFKA_PORT, self.host_port)
            .with_env("KAFKA_BROKER_ID", "1")
            .with_env("KAFKA_ZOOKEEPER_CONNECT", format!("localhost:{ZOOKEEPER_PORT}"))
            .with_env(
                "KAFKA_LISTENERS",
                format!("BROKER://0.0.0.0:{BROKER_PORT},OUTSIDE://0.0.0.0:{KAFKA_PORT}"),
            )
            .with_env(
                "KAFKA_LISTENER_SECURITY_PROTOCOL_MAP",
                "BROKER:PLAINTEXT,OUTSIDE:PLAINTEXT",
            )
            .with_env("KAFKA_INTER_BROKER_LISTENER_NAME", "BROKER")
            // Placeholder until the starter script exports the real value.
            .with_env(
                "KAFKA_ADVERTISED_LISTENERS",
                format!(
                    "BROKER://localhost:{BROKER_PORT},OUTSIDE://localhost:{}",
                    self.host_port
                ),
            )
            .with_env("KAFKA_OFFSETS_TOPIC_REPLICATION_FACTOR", "1")
            .with_env("KAFKA_TRANSACTION_STATE_LOG_REPLICATION_FACTOR", "1")
            .with_env("KAFKA_TRANSACTION_STATE_LOG_MIN_ISR", "1")
            .with_cmd(vec![
                "sh".to_string(),
                "-c".to_string(),
                format!(
                    "while [ ! -x {START_SCRIPT} ]; do sleep 0.1; done; {START_SCRIPT}"
                ),
            ])
            .with_file(START_SCRIPT, self.start_script().into_bytes())
            .with_wait_strategy(
                WaitStrategy::command(vec![
                    "kafka-topics".to_string(),
                    "--bootstrap-server".to_string(),
                    broker.clone(),
                    "--list".to_string(),
                ])
                .with_timeout(READY_TIMEOUT),
            )
            .with_wait_strategy(
                WaitStrategy::command(vec![
                    "kafka-broker-api-versions".to_string(),
                    "--bootstrap-server".to_string(),
                    broker,
                ])
                .with_timeout(READY_TIMEOUT),
            )
    }
}
