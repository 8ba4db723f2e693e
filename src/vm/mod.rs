//! Runtime discovery, argument assembly and library hosting.

pub mod args;
pub mod classpath;
pub mod host;
pub mod locator;
pub mod version;

pub use args::ArgumentBuilder;
pub use host::{
    EntryPoints, HostError, HostedRuntimeBridge, NativeRuntimeFactory, RuntimeFactory,
    RuntimeSession, ShutdownStatus, VmHost,
};
pub use locator::{LocateError, VmLocator};
pub use version::VersionDescriptor;
