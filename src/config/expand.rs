//! Environment and registry variable expansion over configuration values

use crate::platform::registry::{parse_root, Registry, RegistryValue};
use regex::{Captures, Regex};
use std::sync::LazyLock;

use super::store::ConfigStore;

/// `%NAME%` environment-variable references.
static ENV_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%([^%]+)%").unwrap());

/// `$REG{ROOT\Path\To\Key:ValueName}` registry references.
static REG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$REG\{([^}]*)\}").unwrap());

/// Expand `%NAME%` references in every value.
///
/// A reference to an undefined variable leaves the whole value unchanged
/// and logs a warning; expansion is never fatal.
pub fn expand_environment(store: &mut ConfigStore) {
    store.map_values(|key, value| {
        if !value.contains('%') {
            return None;
        }
        let mut failed = false;
        let expanded = ENV_PATTERN.replace_all(value, |caps: &Captures| {
            match std::env::var(&caps[1]) {
                Ok(v) => v,
                Err(_) => {
                    failed = true;
                    String::new()
                }
            }
        });
        if failed {
            log::warn!("Could not expand variable in {}: {}", key, value);
            None
        } else if expanded != value {
            Some(expanded.into_owned())
        } else {
            None
        }
    });
}

/// Expand `$REG{...}` references in every value.
///
/// An unreadable or malformed reference leaves the value unchanged and
/// logs a warning.
pub fn expand_registry(store: &mut ConfigStore, registry: &dyn Registry) {
    store.map_values(|key, value| {
        if !value.contains("$REG{") {
            return None;
        }
        let mut failed = false;
        let expanded = REG_PATTERN.replace_all(value, |caps: &Captures| {
            match read_reference(registry, &caps[1]) {
                Some(v) => v,
                None => {
                    failed = true;
                    String::new()
                }
            }
        });
        if failed {
            log::warn!("Could not expand registry reference in {}: {}", key, value);
            None
        } else if expanded != value {
            log::info!("Reg: {} = '{}' to '{}'", key, value, expanded);
            Some(expanded.into_owned())
        } else {
            None
        }
    });
}

/// Resolve one `ROOT\Path:ValueName` reference body.
fn read_reference(registry: &dyn Registry, body: &str) -> Option<String> {
    let (root_name, rest) = body.split_once('\\')?;
    let root = parse_root(root_name)?;
    let (path, value_name) = rest.rsplit_once(':')?;
    match registry.value(root, path, value_name) {
        Ok(RegistryValue::Text(s)) => Some(s),
        Ok(RegistryValue::Number(n)) => Some(n.to_string()),
        Err(e) => {
            log::warn!("Unable to read registry key ({}): {}", body, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::registry::{MapRegistry, RegistryRoot};

    #[test]
    fn test_env_expansion() {
        std::env::set_var("VMLAUNCH_TEST_HOME", "/opt/app");
        let mut store = ConfigStore::parse_str("working.directory=%VMLAUNCH_TEST_HOME%/run\n");
        expand_environment(&mut store);
        assert_eq!(store.get("working.directory"), Some("/opt/app/run"));
    }

    #[test]
    fn test_undefined_env_leaves_value() {
        let mut store = ConfigStore::parse_str("k=%VMLAUNCH_NO_SUCH_VAR%/x\n");
        expand_environment(&mut store);
        assert_eq!(store.get("k"), Some("%VMLAUNCH_NO_SUCH_VAR%/x"));
    }

    #[test]
    fn test_registry_expansion() {
        let registry = MapRegistry::new();
        registry
            .set_value(
                RegistryRoot::LocalMachine,
                "Software\\Acme\\App",
                Some("InstallDir"),
                RegistryValue::Text("C:\\Acme".into()),
            )
            .unwrap();
        let mut store =
            ConfigStore::parse_str("lib=$REG{HKLM\\Software\\Acme\\App:InstallDir}\\lib\n");
        expand_registry(&mut store, &registry);
        assert_eq!(store.get("lib"), Some("C:\\Acme\\lib"));
    }

    #[test]
    fn test_missing_registry_reference_leaves_value() {
        let registry = MapRegistry::new();
        let mut store = ConfigStore::parse_str("lib=$REG{HKLM\\Missing\\Key:Value}\n");
        expand_registry(&mut store, &registry);
        assert_eq!(store.get("lib"), Some("$REG{HKLM\\Missing\\Key:Value}"));
    }

    #[test]
    fn test_dword_reference_renders_decimal() {
        let registry = MapRegistry::new();
        registry
            .set_value(
                RegistryRoot::LocalMachine,
                "Software\\Acme",
                Some("Port"),
                RegistryValue::Number(8080),
            )
            .unwrap();
        let mut store = ConfigStore::parse_str("port=$REG{HKLM\\Software\\Acme:Port}\n");
        expand_registry(&mut store, &registry);
        assert_eq!(store.get("port"), Some("8080"));
    }
}
