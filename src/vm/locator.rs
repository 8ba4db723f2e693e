//! Runtime discovery
//!
//! Installed runtimes are discovered through vendor registry locations,
//! or taken from an explicit `:vm.location` candidate list. When the
//! explicit list is configured but every candidate is missing, that is a
//! hard failure; registry discovery is not attempted as a fallback.

use crate::config::ConfigStore;
use crate::platform::registry::{Registry, RegistryRoot};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::version::VersionDescriptor;

const KEY_VM_LOCATION: &str = ":vm.location";
const KEY_VM_VERSION: &str = ":vm.version";
const KEY_VM_VERSION_MIN: &str = ":vm.version.min";
const KEY_VM_VERSION_MAX: &str = ":vm.version.max";
const KEY_VM_SYSFIRST: &str = ":vm.sysfirst";
const KEY_WORKING_DIRECTORY: &str = ":working.directory";

const RUNTIME_LIB_VALUE: &str = "RuntimeLib";

#[cfg(target_pointer_width = "64")]
const SEARCH_PATHS: &[&str] = &[
    "Software\\JavaSoft\\Java Runtime Environment",
    "Software\\JavaSoft\\JRE",
    "Software\\IBM\\Java2 Runtime Environment",
];

// 32-bit processes also see the redirected vendor keys.
#[cfg(target_pointer_width = "32")]
const SEARCH_PATHS: &[&str] = &[
    "Software\\JavaSoft\\Java Runtime Environment",
    "Software\\JavaSoft\\JRE",
    "Software\\IBM\\Java2 Runtime Environment",
    "Software\\Wow6432Node\\JavaSoft\\Java Runtime Environment",
    "Software\\Wow6432Node\\JavaSoft\\JRE",
];

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("No compatible runtime found: {0}")]
    RuntimeNotFound(String),
}

/// A runtime version discovered in the registry, with the key it was
/// found under so the library path can be resolved later.
#[derive(Debug, Clone)]
pub struct DiscoveredRuntime {
    pub version: VersionDescriptor,
    key_path: String,
}

pub struct VmLocator<'a> {
    registry: &'a dyn Registry,
}

impl<'a> VmLocator<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        VmLocator { registry }
    }

    /// Resolve the runtime shared-library path from the configuration.
    pub fn locate(&self, store: &ConfigStore) -> Result<PathBuf, LocateError> {
        let explicit = store.get(KEY_VM_LOCATION);
        let sys_first = store.get_bool(KEY_VM_SYSFIRST, false);

        if sys_first {
            // System runtime preferred: registry discovery first, the
            // explicit list only as fallback.
            match self.locate_from_registry(store) {
                Ok(path) => return Ok(path),
                Err(e) => {
                    if let Some(list) = explicit {
                        log::info!("System runtime lookup failed ({}), trying explicit locations", e);
                        return self.locate_from_list(store, list);
                    }
                    return Err(e);
                }
            }
        }

        match explicit {
            Some(list) => self.locate_from_list(store, list),
            None => self.locate_from_registry(store),
        }
    }

    fn locate_from_list(&self, store: &ConfigStore, list: &str) -> Result<PathBuf, LocateError> {
        let base = store
            .get(KEY_WORKING_DIRECTORY)
            .or_else(|| store.get(crate::config::loader::KEY_CONFIG_DIR))
            .map(PathBuf::from)
            .unwrap_or_default();
        for candidate in list.split('|').map(str::trim).filter(|c| !c.is_empty()) {
            let path = if Path::new(candidate).is_absolute() {
                PathBuf::from(candidate)
            } else {
                base.join(candidate)
            };
            if path.exists() {
                log::info!("Found runtime location: {}", path.display());
                return Ok(path);
            }
            log::debug!("Runtime location candidate missing: {}", path.display());
        }
        Err(LocateError::RuntimeNotFound(format!(
            "none of the configured runtime locations exist: {}",
            list
        )))
    }

    fn locate_from_registry(&self, store: &ConfigStore) -> Result<PathBuf, LocateError> {
        let found = self.find_versions();
        log::debug!("Found {} installed runtime(s)", found.len());
        let chosen = select_version(
            &found,
            store.get(KEY_VM_VERSION),
            store.get(KEY_VM_VERSION_MIN),
            store.get(KEY_VM_VERSION_MAX),
        )?;
        log::info!("Selected runtime version: {}", chosen.version);
        self.resolve_library_path(chosen)
    }

    /// Enumerate installed runtime versions from the vendor registry
    /// locations. Each version subkey name is parsed as a version.
    pub fn find_versions(&self) -> Vec<DiscoveredRuntime> {
        let mut found = Vec::new();
        for base in SEARCH_PATHS {
            let Ok(subkeys) = self.registry.subkeys(RegistryRoot::LocalMachine, base) else {
                continue;
            };
            for name in subkeys {
                found.push(DiscoveredRuntime {
                    version: VersionDescriptor::parse(&name),
                    key_path: format!("{}\\{}", base, name),
                });
            }
        }
        found
    }

    /// Read the shared-library path recorded under a discovered
    /// version's registry key.
    pub fn resolve_library_path(&self, runtime: &DiscoveredRuntime) -> Result<PathBuf, LocateError> {
        let value = self
            .registry
            .value(RegistryRoot::LocalMachine, &runtime.key_path, RUNTIME_LIB_VALUE)
            .map_err(|e| {
                LocateError::RuntimeNotFound(format!(
                    "no library path recorded for runtime {}: {}",
                    runtime.version, e
                ))
            })?;
        Ok(fix_client_path(PathBuf::from(value.as_text())))
    }
}

/// Pick a version: exact match wins (first equal in discovery order),
/// otherwise the greatest within the `[min, max]` bounds.
pub fn select_version<'r>(
    found: &'r [DiscoveredRuntime],
    exact: Option<&str>,
    min: Option<&str>,
    max: Option<&str>,
) -> Result<&'r DiscoveredRuntime, LocateError> {
    if let Some(exact) = exact {
        let wanted = VersionDescriptor::parse(exact);
        return found
            .iter()
            .find(|r| r.version == wanted)
            .ok_or_else(|| LocateError::RuntimeNotFound(format!("required version {} not installed", exact)));
    }

    let min = min.map(VersionDescriptor::parse);
    // The max bound is a prefix: `1.8` must admit `1.8.0_202`.
    let max = max.map(|m| VersionDescriptor::parse(m).as_max_bound());
    found
        .iter()
        .filter(|r| min.as_ref().is_none_or(|m| r.version >= *m))
        .filter(|r| max.as_ref().is_none_or(|m| r.version <= *m))
        .max_by(|a, b| a.version.cmp(&b.version))
        .ok_or_else(|| {
            LocateError::RuntimeNotFound(format!(
                "no installed runtime within [{}, {}]",
                min.as_ref().map_or("*".to_string(), |v| v.to_string()),
                max.as_ref().map_or("*".to_string(), |v| v.to_string()),
            ))
        })
}

/// Some installs record a `client` runtime directory that was never laid
/// down on 64-bit machines; fall back to the `server` directory when the
/// recorded path is missing.
#[cfg(target_pointer_width = "64")]
fn fix_client_path(path: PathBuf) -> PathBuf {
    if path.exists() {
        return path;
    }
    let text = path.to_string_lossy();
    if let Some(pos) = text.find("client") {
        let mut fixed = String::with_capacity(text.len());
        fixed.push_str(&text[..pos]);
        fixed.push_str("server");
        fixed.push_str(&text[pos + "client".len()..]);
        log::info!("Client runtime missing, substituting server directory: {}", fixed);
        return PathBuf::from(fixed);
    }
    path
}

#[cfg(not(target_pointer_width = "64"))]
fn fix_client_path(path: PathBuf) -> PathBuf {
    path
}
