//! Command-line surface
//!
//! A first argument carrying the `--vmlaunch:` prefix selects a built-in
//! command; everything else is a normal launch and the arguments flow
//! through to the configuration override layer untouched.

use crate::error::LaunchError;
use std::path::PathBuf;

pub const BUILTIN_PREFIX: &str = "--vmlaunch:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltInCommand {
    RegisterFileAssociations,
    UnregisterFileAssociations,
    RegisterService,
    UnregisterService,
    PrintConfig,
    /// Launch with an explicit configuration file instead of the
    /// executable-adjacent one.
    ExecuteConfig(PathBuf),
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliMode {
    /// Normal launch; the arguments pass through to the override layer.
    Launch(Vec<String>),
    /// Built-in command with the remaining launch arguments.
    BuiltIn(BuiltInCommand, Vec<String>),
}

/// Parse the arguments after the program name.
pub fn parse(args: &[String]) -> Result<CliMode, LaunchError> {
    let Some(first) = args.first() else {
        return Ok(CliMode::Launch(Vec::new()));
    };
    let Some(name) = first.strip_prefix(BUILTIN_PREFIX) else {
        return Ok(CliMode::Launch(args.to_vec()));
    };

    let mut rest = args[1..].to_vec();
    let command = match name {
        "RegisterFileAssociations" => BuiltInCommand::RegisterFileAssociations,
        "UnregisterFileAssociations" => BuiltInCommand::UnregisterFileAssociations,
        "RegisterService" => BuiltInCommand::RegisterService,
        "UnregisterService" => BuiltInCommand::UnregisterService,
        "PrintConfig" => BuiltInCommand::PrintConfig,
        "Version" => BuiltInCommand::Version,
        "ExecuteConfig" => {
            if rest.is_empty() {
                return Err(LaunchError::Command(
                    "ExecuteConfig requires a configuration file argument".to_string(),
                ));
            }
            BuiltInCommand::ExecuteConfig(PathBuf::from(rest.remove(0)))
        }
        other => {
            return Err(LaunchError::Command(format!(
                "Unrecognized built-in command: {other}"
            )))
        }
    };
    Ok(CliMode::BuiltIn(command, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_plain_arguments_are_a_launch() {
        let mode = parse(&args(&["input.txt", "-Wmain.class=Other"])).unwrap();
        assert_eq!(mode, CliMode::Launch(args(&["input.txt", "-Wmain.class=Other"])));
    }

    #[test]
    fn test_builtin_prefix_selects_command() {
        let mode = parse(&args(&["--vmlaunch:PrintConfig"])).unwrap();
        assert_eq!(mode, CliMode::BuiltIn(BuiltInCommand::PrintConfig, vec![]));
    }

    #[test]
    fn test_execute_config_consumes_file_argument() {
        let mode = parse(&args(&["--vmlaunch:ExecuteConfig", "other.ini", "file.txt"])).unwrap();
        assert_eq!(
            mode,
            CliMode::BuiltIn(
                BuiltInCommand::ExecuteConfig(PathBuf::from("other.ini")),
                args(&["file.txt"])
            )
        );
    }

    #[test]
    fn test_execute_config_without_file_fails() {
        assert!(parse(&args(&["--vmlaunch:ExecuteConfig"])).is_err());
    }

    #[test]
    fn test_unrecognized_builtin_fails() {
        assert!(parse(&args(&["--vmlaunch:Frobnicate"])).is_err());
    }

    #[test]
    fn test_builtin_only_recognized_in_first_position() {
        let mode = parse(&args(&["file.txt", "--vmlaunch:PrintConfig"])).unwrap();
        assert!(matches!(mode, CliMode::Launch(_)));
    }
}
