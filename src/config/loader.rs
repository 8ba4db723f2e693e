//! Layered configuration resolution
//!
//! Merge order, lowest to highest precedence: embedded defaults, the
//! config file next to the executable, an externally-referenced file,
//! registry-sourced values. Command-line overrides are applied afterwards
//! by the orchestrator and therefore carry final precedence.

use crate::platform::registry::{parse_root, Registry, RegistryValue};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::expand::{expand_environment, expand_registry};
use super::store::ConfigStore;

/// Magic prefix identifying an embedded configuration resource block.
pub const CONFIG_RES_MAGIC: [u8; 4] = *b"CFG\x1a";

/// Environment variable carrying the configuration file's directory,
/// set before the first expansion pass so values may refer to it.
pub const CONFIG_DIR_ENV: &str = "CONFIG_DIR";

const ALLOW_CONFIG_OVERRIDE: &str = ":config.override";
const CONFIG_FILE_LOCATION: &str = ":config.file.location";
const CONFIG_REGISTRY_LOCATION: &str = ":config.registry.location";

/// Keys recording the resolved module identity.
pub const KEY_CONFIG_FILE: &str = ":config.file";
pub const KEY_CONFIG_DIR: &str = ":config.dir";
pub const KEY_MODULE_NAME: &str = ":module.name";
pub const KEY_MODULE_DIR: &str = ":module.dir";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not load configuration file '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Embedded configuration block is not valid UTF-8")]
    EmbeddedEncoding,
}

/// Default configuration path: same directory and stem as the
/// executable, with an `ini` extension.
pub fn default_config_path(executable: &Path) -> PathBuf {
    executable.with_extension("ini")
}

/// Resolve the layered configuration.
///
/// `embedded` is the raw resource block (magic prefix included) when one
/// is present in the executable. When no embedded block exists, the file
/// source is primary and a failure to load it is fatal.
pub fn load(
    embedded: Option<&[u8]>,
    config_path: &Path,
    registry: &dyn Registry,
) -> Result<ConfigStore, ConfigError> {
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    // Exported before expansion so values can reference it.
    std::env::set_var(CONFIG_DIR_ENV, &config_dir);

    let mut store = match embedded.and_then(parse_embedded) {
        Some(embedded_store) => {
            let mut store = embedded_store?;
            if store.get_bool(ALLOW_CONFIG_OVERRIDE, true) {
                match ConfigStore::parse_file(config_path) {
                    Ok(file_store) => store.merge(&file_store),
                    Err(e) => log::info!(
                        "No configuration file override at {}: {}",
                        config_path.display(),
                        e
                    ),
                }
            }
            store
        }
        None => ConfigStore::parse_file(config_path).map_err(|source| {
            log::error!("Could not load configuration file: {}", config_path.display());
            ConfigError::Load {
                path: config_path.display().to_string(),
                source,
            }
        })?,
    };

    expand_environment(&mut store);
    expand_registry(&mut store, registry);

    if let Some(location) = store.get(CONFIG_FILE_LOCATION).map(str::to_string) {
        log::info!("Loading configuration keys from file location: {}", location);
        match ConfigStore::parse_file(Path::new(&location)) {
            Ok(mut external) => {
                expand_environment(&mut external);
                store.merge(&external);
            }
            Err(e) => log::warn!("Could not load configuration keys from {}: {}", location, e),
        }
    }

    merge_registry_location(&mut store, registry);

    store.set(KEY_CONFIG_FILE, config_path.display().to_string());
    store.set(KEY_CONFIG_DIR, config_dir.display().to_string());
    if let Ok(module) = std::env::current_exe() {
        store.set(KEY_MODULE_NAME, module.display().to_string());
        if let Some(dir) = module.parent() {
            store.set(KEY_MODULE_DIR, dir.display().to_string());
        }
    }

    log::info!("Module config: {}", config_path.display());
    log::info!("Config dir: {}", config_dir.display());

    Ok(store)
}

/// Parse an embedded resource block. `None` when the magic prefix does
/// not match (the block is then treated as absent, not as an error).
fn parse_embedded(bytes: &[u8]) -> Option<Result<ConfigStore, ConfigError>> {
    let body = bytes.strip_prefix(&CONFIG_RES_MAGIC)?;
    Some(match std::str::from_utf8(body) {
        Ok(text) => Ok(ConfigStore::parse_str(text)),
        Err(_) => {
            log::warn!("Could not load embedded configuration block");
            Err(ConfigError::EmbeddedEncoding)
        }
    })
}

/// Merge key/value pairs from the registry location named by
/// `:config.registry.location`, if any. Value names without a section
/// delimiter land in the main section.
fn merge_registry_location(store: &mut ConfigStore, registry: &dyn Registry) {
    let Some(location) = store.get(CONFIG_REGISTRY_LOCATION).map(str::to_string) else {
        return;
    };
    log::info!("Loading configuration keys from registry: {}", location);

    let Some((root_name, path)) = location.split_once('\\') else {
        log::warn!("Unable to parse registry location ({}) - keys not included", location);
        return;
    };
    let Some(root) = parse_root(root_name) else {
        log::warn!("Unrecognized registry root key: {}", root_name);
        return;
    };
    let values = match registry.values(root, path) {
        Ok(values) => values,
        Err(e) => {
            log::warn!("Unable to open registry location ({}): {}", location, e);
            return;
        }
    };
    for (name, value) in values {
        match value {
            RegistryValue::Text(s) => store.set(&name, s),
            RegistryValue::Number(n) => store.set(&name, n.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::registry::{MapRegistry, RegistryRoot};
    use std::io::Write;
    use std::sync::{Mutex, MutexGuard};

    // load() writes the CONFIG_DIR environment variable, which is
    // process-global; serialize the tests that call it.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write_config(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn embedded(content: &str) -> Vec<u8> {
        let mut bytes = CONFIG_RES_MAGIC.to_vec();
        bytes.extend_from_slice(content.as_bytes());
        bytes
    }

    #[test]
    fn test_file_is_primary_without_embedded() {
        let _env = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "app.ini", "main.class=App\n");
        let registry = MapRegistry::new();
        let store = load(None, &path, &registry).unwrap();
        assert_eq!(store.get("main.class"), Some("App"));
        assert_eq!(store.get(KEY_CONFIG_FILE), Some(path.display().to_string().as_str()));
    }

    #[test]
    fn test_missing_primary_file_is_fatal() {
        let _env = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let registry = MapRegistry::new();
        let result = load(None, &dir.path().join("absent.ini"), &registry);
        assert!(matches!(result, Err(ConfigError::Load { .. })));
    }

    #[test]
    fn test_file_overrides_embedded_entry_by_entry() {
        let _env = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "app.ini", "b=file\n");
        let registry = MapRegistry::new();
        let block = embedded("a=emb\nb=emb\n");
        let store = load(Some(&block), &path, &registry).unwrap();
        assert_eq!(store.get("a"), Some("emb"));
        assert_eq!(store.get("b"), Some("file"));
    }

    #[test]
    fn test_override_disabled_keeps_embedded() {
        let _env = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "app.ini", "b=file\n");
        let registry = MapRegistry::new();
        let block = embedded("config.override=false\nb=emb\n");
        let store = load(Some(&block), &path, &registry).unwrap();
        assert_eq!(store.get("b"), Some("emb"));
    }

    #[test]
    fn test_bad_magic_falls_back_to_file() {
        let _env = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "app.ini", "b=file\n");
        let registry = MapRegistry::new();
        let store = load(Some(b"XXXXb=emb\n"), &path, &registry).unwrap();
        assert_eq!(store.get("b"), Some("file"));
    }

    #[test]
    fn test_external_file_layer() {
        let _env = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let external = write_config(dir.path(), "extra.ini", "a=external\n");
        let primary = write_config(
            dir.path(),
            "app.ini",
            &format!("a=primary\nconfig.file.location={}\n", external.display()),
        );
        let registry = MapRegistry::new();
        let store = load(None, &primary, &registry).unwrap();
        assert_eq!(store.get("a"), Some("external"));
    }

    #[test]
    fn test_registry_layer_overrides_file() {
        let _env = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "app.ini",
            "a=file\nconfig.registry.location=HKLM\\Software\\Acme\\Launcher\n",
        );
        let registry = MapRegistry::new();
        registry
            .set_value(
                RegistryRoot::LocalMachine,
                "Software\\Acme\\Launcher",
                Some("a"),
                RegistryValue::Text("registry".into()),
            )
            .unwrap();
        registry
            .set_value(
                RegistryRoot::LocalMachine,
                "Software\\Acme\\Launcher",
                Some("Extra:key"),
                RegistryValue::Number(7),
            )
            .unwrap();
        let store = load(None, &path, &registry).unwrap();
        assert_eq!(store.get("a"), Some("registry"));
        assert_eq!(store.get("Extra:key"), Some("7"));
    }

    #[test]
    fn test_config_dir_env_usable_in_values() {
        let _env = env_guard();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "app.ini", "classpath.1=%CONFIG_DIR%/lib\n");
        let registry = MapRegistry::new();
        let store = load(None, &path, &registry).unwrap();
        let expected = format!("{}/lib", dir.path().display());
        assert_eq!(store.get("classpath.1"), Some(expected.as_str()));
    }
}
