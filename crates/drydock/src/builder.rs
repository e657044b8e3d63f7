//! Polymorphic container builder protocol.

use crate::descriptor::ContainerDescriptor;

/// Turns a high-level declarative config into a normalized
/// [`ContainerDescriptor`].
///
/// Image-specific configs (Postgres, Redis, …) implement this; a descriptor
/// is its own builder for the generic case. Configuration errors (wrong
/// image prefix, invalid ports) panic in the config's setters, before any
/// I/O happens.
pub trait ContainerBuilder {
    /// Produce the normalized container-creation request.
    fn build(&self) -> ContainerDescriptor;
}

/// The generic direct-descriptor case.
impl ContainerBuilder for ContainerDescriptor {
    fn build(&self) -> ContainerDescriptor {
        self.clone()
    }
}
