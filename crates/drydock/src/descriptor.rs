//! Normalized container-creation request types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::wait::WaitStrategy;

/// Access mode for a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindMode {
    /// Read-only.
    Ro,
    /// Read-write.
    Rw,
}

impl BindMode {
    /// Mode suffix used in Engine `Binds` entries.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ro => "ro",
            Self::Rw => "rw",
        }
    }
}

/// A host-path bind mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Source path on the host.
    pub host_src: String,

    /// Destination path inside the container.
    pub container_dest: String,

    /// Access mode.
    pub mode: BindMode,
}

/// A named-volume binding.
///
/// When a named volume and a bind mount target the same container path, the
/// named volume wins: the Engine applies `Mounts` after `Binds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBinding {
    /// Docker volume name.
    pub volume_name: String,

    /// Destination path inside the container.
    pub container_dest: String,

    /// Mount the volume read-only.
    pub read_only: bool,
}

/// An exposed container port, optionally pinned to a fixed host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// TCP port inside the container.
    pub container_port: u16,

    /// Host port; `None` lets the daemon assign an ephemeral one.
    pub host_port: Option<u16>,
}

/// A file uploaded into the container after start, before wait strategies run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFile {
    /// Absolute destination path inside the container.
    pub container_path: String,

    /// File contents.
    pub contents: Vec<u8>,
}

/// Normalized container-creation request consumed by the Docker API facade.
///
/// Build one directly for ad-hoc containers, or let an image-specific
/// builder produce it:
///
/// ```rust
/// use drydock::{ContainerDescriptor, WaitStrategy};
///
/// let descriptor = ContainerDescriptor::new("nginx:1.25")
///     .with_exposed_port(80)
///     .with_env("NGINX_PORT", "80")
///     .with_wait_strategy(WaitStrategy::http(80, "/", 200));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerDescriptor {
    /// Image reference (`name:tag`).
    pub image: String,

    /// Command override.
    pub cmd: Option<Vec<String>>,

    /// Exposed TCP ports.
    pub exposed_ports: Vec<PortMapping>,

    /// Environment variables. Ordered map so the Engine `Env` list is stable
    /// regardless of insertion order.
    pub env: BTreeMap<String, String>,

    /// Container labels.
    pub labels: BTreeMap<String, String>,

    /// Host-path bind mounts.
    pub bind_mounts: Vec<BindMount>,

    /// Named-volume bindings.
    pub bind_volumes: Vec<VolumeBinding>,

    /// Files delivered into the container after start.
    pub files: Vec<ContainerFile>,

    /// Ask the daemon to remove the container when it exits. Off by default;
    /// the reaper owns cleanup.
    pub auto_remove: bool,

    /// Run the container privileged.
    pub privileged: bool,

    /// Readiness probes, applied in declaration order.
    #[serde(skip)]
    pub wait_strategies: Vec<WaitStrategy>,
}

impl ContainerDescriptor {
    /// Create a descriptor for an image with no ports, env or mounts.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            cmd: None,
            exposed_ports: Vec::new(),
            env: BTreeMap::new(),
            labels: BTreeMap::new(),
            bind_mounts: Vec::new(),
            bind_volumes: Vec::new(),
            files: Vec::new(),
            auto_remove: false,
            privileged: false,
            wait_strategies: Vec::new(),
        }
    }

    /// Override the container command.
    #[must_use]
    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    /// Expose a container port on a daemon-assigned ephemeral host port.
    ///
    /// # Panics
    ///
    /// Panics if `container_port` is zero.
    #[must_use]
    pub fn with_exposed_port(mut self, container_port: u16) -> Self {
        assert!(container_port != 0, "container port must be non-zero");
        self.exposed_ports.push(PortMapping {
            container_port,
            host_port: None,
        });
        self
    }

    /// Expose a container port on a fixed host port.
    ///
    /// # Panics
    ///
    /// Panics if either port is zero.
    #[must_use]
    pub fn with_fixed_port(mut self, container_port: u16, host_port: u16) -> Self {
        assert!(
            container_port != 0 && host_port != 0,
            "ports must be non-zero"
        );
        self.exposed_ports.push(PortMapping {
            container_port,
            host_port: Some(host_port),
        });
        self
    }

    /// Set an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set a container label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a host-path bind mount.
    #[must_use]
    pub fn with_bind_mount(
        mut self,
        host_src: impl Into<String>,
        container_dest: impl Into<String>,
        mode: BindMode,
    ) -> Self {
        self.bind_mounts.push(BindMount {
            host_src: host_src.into(),
            container_dest: container_dest.into(),
            mode,
        });
        self
    }

    /// Add a named-volume binding.
    #[must_use]
    pub fn with_volume(
        mut self,
        volume_name: impl Into<String>,
        container_dest: impl Into<String>,
        read_only: bool,
    ) -> Self {
        self.bind_volumes.push(VolumeBinding {
            volume_name: volume_name.into(),
            container_dest: container_dest.into(),
            read_only,
        });
        self
    }

    /// Deliver a file into the container after start, before readiness probes.
    #[must_use]
    pub fn with_file(mut self, container_path: impl Into<String>, contents: Vec<u8>) -> Self {
        self.files.push(ContainerFile {
            container_path: container_path.into(),
            contents,
        });
        self
    }

    /// Ask the daemon to auto-remove the container on exit.
    #[must_use]
    pub fn with_auto_remove(mut self) -> Self {
        self.auto_remove = true;
        self
    }

    /// Run the container privileged.
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Append a readiness probe. Probes run in declaration order.
    #[must_use]
    pub fn with_wait_strategy(mut self, strategy: WaitStrategy) -> Self {
        self.wait_strategies.push(strategy);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_defaults() {
        let descriptor = ContainerDescriptor::new("alpine:3.19");
        assert_eq!(descriptor.image, "alpine:3.19");
        assert!(descriptor.cmd.is_none());
        assert!(!descriptor.auto_remove);
        assert!(!descriptor.privileged);
        assert!(descriptor.wait_strategies.is_empty());
    }

    #[test]
    fn test_descriptor_ports() {
        let descriptor = ContainerDescriptor::new("redis:7.2")
            .with_exposed_port(6379)
            .with_fixed_port(8080, 18080);

        assert_eq!(
            descriptor.exposed_ports,
            vec![
                PortMapping {
                    container_port: 6379,
                    host_port: None
                },
                PortMapping {
                    container_port: 8080,
                    host_port: Some(18080)
                },
            ]
        );
    }

    #[test]
    #[should_panic(expected = "container port must be non-zero")]
    fn test_descriptor_zero_port_panics() {
        let _ = ContainerDescriptor::new("redis:7.2").with_exposed_port(0);
    }

    #[test]
    fn test_descriptor_env_is_ordered() {
        let descriptor = ContainerDescriptor::new("postgres:15.4")
            .with_env("ZZZ", "1")
            .with_env("AAA", "2");

        let keys: Vec<&str> = descriptor.env.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["AAA", "ZZZ"]);
    }

    #[test]
    fn test_descriptor_env_no_duplicates() {
        let descriptor = ContainerDescriptor::new("postgres:15.4")
            .with_env("POSTGRES_DB", "old")
            .with_env("POSTGRES_DB", "new");

        assert_eq!(descriptor.env.len(), 1);
        assert_eq!(descriptor.env["POSTGRES_DB"], "new");
    }

    #[test]
    fn test_descriptor_mounts() {
        let descriptor = ContainerDescriptor::new("alpine:3.19")
            .with_bind_mount("/var/run/docker.sock", "/var/run/docker.sock", BindMode::Rw)
            .with_volume("pgdata", "/var/lib/postgresql/data", false);

        assert_eq!(descriptor.bind_mounts.len(), 1);
        assert_eq!(descriptor.bind_mounts[0].mode.as_str(), "rw");
        assert_eq!(descriptor.bind_volumes.len(), 1);
        assert!(!descriptor.bind_volumes[0].read_only);
    }
}
