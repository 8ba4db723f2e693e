//! Configuration resolution: flat sectioned key/value stores, layered
//! loading, environment and registry expansion, command-line overrides.

pub mod expand;
pub mod loader;
pub mod overrides;
pub mod store;

pub use loader::{default_config_path, load, ConfigError};
pub use store::ConfigStore;
