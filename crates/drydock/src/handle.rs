//! Post-start container observation returned to callers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A container port together with the host port the daemon bound it to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPort {
    /// TCP port inside the container.
    pub container_port: u16,

    /// Host-side port.
    pub host_port: u16,
}

/// Observation of a started container.
///
/// Ports, environment and labels are derived from the Engine's inspect
/// response, not echoed from the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Container id.
    pub id: String,

    /// Image reference the container was created from.
    pub image: String,

    /// Resolved port mappings.
    pub ports: Vec<ResolvedPort>,

    /// Environment as reported by inspect.
    pub env: BTreeMap<String, String>,

    /// Labels as reported by inspect.
    pub labels: BTreeMap<String, String>,
}

impl ContainerHandle {
    /// Host port the daemon bound `container_port` to, if any.
    #[must_use]
    pub fn mapped_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container_port == container_port)
            .map(|p| p.host_port)
    }
}
