//! File association registration
//!
//! Numbered `FileAssociations:file.N.*` families map file extensions to
//! the launcher: the extension key points at a program id whose open
//! command re-launches this executable, and the activation endpoint is
//! recorded so an already-running instance receives the file instead.

use crate::config::ConfigStore;
use crate::platform::registry::{Registry, RegistryError, RegistryRoot, RegistryValue};
use thiserror::Error;

const BASE: &str = "FileAssociations:file";

const KEY_SERVER_NAME: &str = ":instance.server.name";
const KEY_TOPIC: &str = ":instance.topic";
const DEFAULT_SERVER_NAME: &str = "vmlaunch";
const DEFAULT_TOPIC: &str = "system";

#[derive(Debug, Error)]
pub enum AssocError {
    #[error("File association {index} is missing its {field}")]
    Incomplete { index: u32, field: &'static str },

    #[error("Registry update failed: {0}")]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone)]
struct Association {
    extension: String,
    name: String,
    description: Option<String>,
}

/// Collect the configured association families. The numbered scan
/// tolerates a single gap, like every other numbered list.
fn associations(store: &ConfigStore) -> Result<Vec<Association>, AssocError> {
    let mut out = Vec::new();
    let mut max_seen = 0u32;
    let mut index = 1u32;
    loop {
        let extension = store.get(&format!("{BASE}.{index}.extension"));
        let name = store.get(&format!("{BASE}.{index}.name"));
        if extension.is_some() || name.is_some() {
            let extension = extension
                .ok_or(AssocError::Incomplete { index, field: "extension" })?
                .to_string();
            let name = name
                .ok_or(AssocError::Incomplete { index, field: "name" })?
                .to_string();
            out.push(Association {
                extension,
                name,
                description: store
                    .get(&format!("{BASE}.{index}.description"))
                    .map(str::to_string),
            });
            max_seen = index;
        }
        index += 1;
        if index > max_seen + 1 {
            break;
        }
    }
    Ok(out)
}

/// Write the class-root keys for every configured association.
/// `command` is the full path of this executable.
pub fn register(
    store: &ConfigStore,
    registry: &dyn Registry,
    command: &str,
) -> Result<usize, AssocError> {
    let server = store.get(KEY_SERVER_NAME).unwrap_or(DEFAULT_SERVER_NAME);
    let topic = store.get(KEY_TOPIC).unwrap_or(DEFAULT_TOPIC);

    let found = associations(store)?;
    for assoc in &found {
        log::info!("Registering association: {} -> {}", assoc.extension, assoc.name);
        registry.set_value(
            RegistryRoot::ClassesRoot,
            &assoc.extension,
            None,
            RegistryValue::Text(assoc.name.clone()),
        )?;
        if let Some(description) = &assoc.description {
            registry.set_value(
                RegistryRoot::ClassesRoot,
                &assoc.name,
                None,
                RegistryValue::Text(description.clone()),
            )?;
        }
        let open = format!("{}\\shell\\open", assoc.name);
        registry.set_value(
            RegistryRoot::ClassesRoot,
            &format!("{open}\\command"),
            None,
            RegistryValue::Text(format!("\"{command}\" \"%1\"")),
        )?;
        // Activation routing for a running instance.
        registry.set_value(
            RegistryRoot::ClassesRoot,
            &format!("{open}\\ddeexec"),
            None,
            RegistryValue::Text("%1".to_string()),
        )?;
        registry.set_value(
            RegistryRoot::ClassesRoot,
            &format!("{open}\\ddeexec\\application"),
            None,
            RegistryValue::Text(server.to_string()),
        )?;
        registry.set_value(
            RegistryRoot::ClassesRoot,
            &format!("{open}\\ddeexec\\topic"),
            None,
            RegistryValue::Text(topic.to_string()),
        )?;
    }
    Ok(found.len())
}

/// Remove the class-root keys for every configured association.
pub fn unregister(store: &ConfigStore, registry: &dyn Registry) -> Result<usize, AssocError> {
    let found = associations(store)?;
    for assoc in &found {
        log::info!("Removing association: {}", assoc.extension);
        let open = format!("{}\\shell\\open", assoc.name);
        for key in [
            format!("{open}\\ddeexec\\topic"),
            format!("{open}\\ddeexec\\application"),
            format!("{open}\\ddeexec"),
            format!("{open}\\command"),
            open,
            format!("{}\\shell", assoc.name),
            assoc.name.clone(),
            assoc.extension.clone(),
        ] {
            if let Err(e) = registry.delete_key(RegistryRoot::ClassesRoot, &key) {
                log::debug!("Association key already absent ({}): {}", key, e);
            }
        }
    }
    Ok(found.len())
}
