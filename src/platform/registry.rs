//! Registry capability seam
//!
//! All registry access in the launcher goes through the [`Registry`] trait
//! so that version discovery, configuration layering and the install
//! commands can be exercised without a live OS registry. The production
//! binding for Windows is a thin marshaling shim outside this crate;
//! [`MapRegistry`] is the in-memory implementation used by tests and by
//! hosts without a registry.

use indexmap::IndexMap;
use std::sync::Mutex;
use thiserror::Error;

/// Root hive of a registry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryRoot {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
}

/// Parse a root hive name, accepting both long and short spellings.
pub fn parse_root(name: &str) -> Option<RegistryRoot> {
    match name {
        "HKEY_LOCAL_MACHINE" | "HKLM" => Some(RegistryRoot::LocalMachine),
        "HKEY_CURRENT_USER" | "HKCU" => Some(RegistryRoot::CurrentUser),
        "HKEY_CLASSES_ROOT" | "HKCR" => Some(RegistryRoot::ClassesRoot),
        _ => None,
    }
}

/// A registry value. Only string and dword values are meaningful to the
/// launcher; other types are ignored during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    Text(String),
    Number(u32),
}

impl RegistryValue {
    /// Render the value as configuration text.
    pub fn as_text(&self) -> String {
        match self {
            RegistryValue::Text(s) => s.clone(),
            RegistryValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry key not found: {0}")]
    KeyNotFound(String),

    #[error("registry value not found: {0}")]
    ValueNotFound(String),

    #[error("registry operation not supported on this host")]
    Unsupported,
}

/// Narrow registry capability used by the launcher.
pub trait Registry: Send + Sync {
    /// Enumerate immediate subkey names of a key, in enumeration order.
    fn subkeys(&self, root: RegistryRoot, path: &str) -> Result<Vec<String>, RegistryError>;

    /// Read a single named value.
    fn value(
        &self,
        root: RegistryRoot,
        path: &str,
        name: &str,
    ) -> Result<RegistryValue, RegistryError>;

    /// Enumerate all values of a key, in enumeration order.
    fn values(
        &self,
        root: RegistryRoot,
        path: &str,
    ) -> Result<Vec<(String, RegistryValue)>, RegistryError>;

    /// Create the key if absent and set a value. `name` of `None`
    /// addresses the key's default value.
    fn set_value(
        &self,
        root: RegistryRoot,
        path: &str,
        name: Option<&str>,
        value: RegistryValue,
    ) -> Result<(), RegistryError>;

    /// Delete a key and its values. Subkeys survive; the launcher only
    /// ever deletes leaf keys it created.
    fn delete_key(&self, root: RegistryRoot, path: &str) -> Result<(), RegistryError>;
}

/// Default value name marker used by [`MapRegistry`].
const DEFAULT_VALUE: &str = "";

#[derive(Debug, Default)]
struct KeyData {
    /// Values in insertion order; map key is the value name, `""` is the
    /// key's default value.
    values: IndexMap<String, RegistryValue>,
}

/// In-memory registry. Paths are compared case-insensitively, matching
/// registry semantics; value enumeration order is insertion order.
#[derive(Debug, Default)]
pub struct MapRegistry {
    keys: Mutex<IndexMap<String, KeyData>>,
}

fn key_id(root: RegistryRoot, path: &str) -> String {
    let root = match root {
        RegistryRoot::LocalMachine => "HKLM",
        RegistryRoot::CurrentUser => "HKCU",
        RegistryRoot::ClassesRoot => "HKCR",
    };
    format!("{}\\{}", root, path.trim_matches('\\')).to_ascii_lowercase()
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for MapRegistry {
    fn subkeys(&self, root: RegistryRoot, path: &str) -> Result<Vec<String>, RegistryError> {
        let id = key_id(root, path);
        let prefix = format!("{id}\\");
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        if !keys.contains_key(&id) && !keys.keys().any(|k| k.starts_with(&prefix)) {
            return Err(RegistryError::KeyNotFound(path.to_string()));
        }
        let mut out = Vec::new();
        for key in keys.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                let first = rest.split('\\').next().unwrap_or(rest);
                if !out.iter().any(|s: &String| s.eq_ignore_ascii_case(first)) {
                    out.push(first.to_string());
                }
            }
        }
        Ok(out)
    }

    fn value(
        &self,
        root: RegistryRoot,
        path: &str,
        name: &str,
    ) -> Result<RegistryValue, RegistryError> {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        let data = keys
            .get(&key_id(root, path))
            .ok_or_else(|| RegistryError::KeyNotFound(path.to_string()))?;
        data.values
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| RegistryError::ValueNotFound(name.to_string()))
    }

    fn values(
        &self,
        root: RegistryRoot,
        path: &str,
    ) -> Result<Vec<(String, RegistryValue)>, RegistryError> {
        let keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        let data = keys
            .get(&key_id(root, path))
            .ok_or_else(|| RegistryError::KeyNotFound(path.to_string()))?;
        Ok(data
            .values
            .iter()
            .map(|(n, v)| (n.clone(), v.clone()))
            .collect())
    }

    fn set_value(
        &self,
        root: RegistryRoot,
        path: &str,
        name: Option<&str>,
        value: RegistryValue,
    ) -> Result<(), RegistryError> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        let data = keys.entry(key_id(root, path)).or_default();
        data.values
            .insert(name.unwrap_or(DEFAULT_VALUE).to_string(), value);
        Ok(())
    }

    fn delete_key(&self, root: RegistryRoot, path: &str) -> Result<(), RegistryError> {
        let mut keys = self.keys.lock().unwrap_or_else(|e| e.into_inner());
        keys.shift_remove(&key_id(root, path))
            .map(|_| ())
            .ok_or_else(|| RegistryError::KeyNotFound(path.to_string()))
    }
}
