//! Launcher-wide error type and user-facing presentation.

use crate::assoc::AssocError;
use crate::config::ConfigError;
use crate::config::ConfigStore;
use crate::service::ServiceError;
use crate::vm::{HostError, LocateError};
use thiserror::Error;

const KEY_SHOW_POPUP: &str = "ErrorMessages:show.popup";
const KEY_MSG_NOT_FOUND: &str = "ErrorMessages:runtime.not.found";
const KEY_MSG_FAILED: &str = "ErrorMessages:runtime.failed";

const DEFAULT_MSG_NOT_FOUND: &str =
    "No compatible runtime could be found. Please check your installation.";
const DEFAULT_MSG_FAILED: &str = "The application failed to start. See the log for details.";

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Assoc(#[from] AssocError),

    #[error("{0}")]
    Command(String),

    #[error("Hosted program exited with code {0}")]
    RuntimeExit(i32),
}

impl LaunchError {
    /// Process exit code: configuration and command failures are 1,
    /// runtime and OS error codes pass through unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchError::RuntimeExit(code) => *code,
            LaunchError::Host(HostError::InvokeFailed(code)) if *code != 0 => *code,
            _ => 1,
        }
    }

    fn user_message<'a>(&self, store: &'a ConfigStore) -> &'a str {
        match self {
            LaunchError::Locate(_) => store.get(KEY_MSG_NOT_FOUND).unwrap_or(DEFAULT_MSG_NOT_FOUND),
            _ => store.get(KEY_MSG_FAILED).unwrap_or(DEFAULT_MSG_FAILED),
        }
    }

    /// Log the failure and, unless popups are disabled, show the
    /// configured user-facing message.
    pub fn present(&self, store: &ConfigStore) {
        log::error!("{}", self);
        if store.get_bool(KEY_SHOW_POPUP, true) {
            eprintln!("{}", self.user_message(store));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(LaunchError::Command("bad".into()).exit_code(), 1);
        assert_eq!(LaunchError::RuntimeExit(42).exit_code(), 42);
        assert_eq!(
            LaunchError::Locate(LocateError::RuntimeNotFound("x".into())).exit_code(),
            1
        );
        assert_eq!(LaunchError::Host(HostError::InvokeFailed(7)).exit_code(), 7);
    }

    #[test]
    fn test_not_found_message_configurable() {
        let mut store = ConfigStore::new();
        let err = LaunchError::Locate(LocateError::RuntimeNotFound("x".into()));
        assert_eq!(err.user_message(&store), DEFAULT_MSG_NOT_FOUND);
        store.set("ErrorMessages:runtime.not.found", "Install the runtime first.".to_string());
        assert_eq!(err.user_message(&store), "Install the runtime first.");
    }
}
