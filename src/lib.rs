//! vmlaunch
//!
//! A native launcher for programs hosted on a managed runtime.
//!
//! # Overview
//!
//! The launcher lets you:
//! - Describe a launch in a flat `key=value` configuration file, with
//!   embedded defaults and registry/environment value expansion
//! - Discover installed runtimes by version, or pin explicit locations
//! - Expand classpath wildcards and derive heap sizing from physical
//!   memory
//! - Keep a single running instance, forwarding later launches to it
//! - Run the hosted program as an OS service with proper status
//!   reporting
//!
//! # Example Configuration
//!
//! ```ini
//! main.class=org.example.Main
//! classpath.1=lib/*.jar
//! vm.version.min=1.8
//! vm.heapsize.preferred=512
//! single.instance=true
//! ```

pub mod assoc;
pub mod cli;
pub mod config;
pub mod error;
pub mod instance;
pub mod orchestrator;
pub mod platform;
pub mod service;
pub mod vm;

pub use error::LaunchError;
pub use orchestrator::{LaunchEnv, LaunchOrchestrator, ServiceHooks};
