//! Host-platform capability seams

pub mod memory;
pub mod registry;

pub use memory::{FixedProbe, MemoryProbe, SysinfoProbe};
pub use registry::{MapRegistry, Registry, RegistryError, RegistryRoot, RegistryValue};
