//! Service registration
//!
//! Builds the service definition from configuration and drives the OS
//! service manager through the [`ServiceManager`] trait. Registration
//! also records the description under the service's registry key, which
//! older OS versions do not store through the manager API.

use crate::config::ConfigStore;
use crate::platform::registry::{Registry, RegistryRoot, RegistryValue};

use super::control::AcceptedControls;
use super::{ServiceError, KEY_SERVICE_ID};

const KEY_SERVICE_NAME: &str = ":service.name";
const KEY_SERVICE_DESCRIPTION: &str = ":service.description";
const KEY_SERVICE_CONTROLS: &str = ":service.controls";
const KEY_SERVICE_STARTUP: &str = ":service.startup";
const KEY_SERVICE_DEPENDENCY: &str = ":service.dependency";
const KEY_SERVICE_LOAD_ORDER_GROUP: &str = ":service.loadordergroup";
const KEY_SERVICE_USER: &str = ":service.user";
const KEY_SERVICE_PASSWORD: &str = ":service.password";

const SERVICES_KEY: &str = "System\\CurrentControlSet\\Services";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupMode {
    Boot,
    System,
    Auto,
    #[default]
    Demand,
    Disabled,
}

impl StartupMode {
    fn parse(text: Option<&str>) -> Self {
        let Some(text) = text else {
            return Self::default();
        };
        match text.to_ascii_lowercase().as_str() {
            "boot" => StartupMode::Boot,
            "system" => StartupMode::System,
            "auto" => StartupMode::Auto,
            "demand" => StartupMode::Demand,
            "disabled" => StartupMode::Disabled,
            other => {
                log::warn!("Unknown service startup mode '{}', using demand", other);
                StartupMode::Demand
            }
        }
    }
}

/// Everything the OS service manager needs to create the service entry.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub startup: StartupMode,
    pub controls: AcceptedControls,
    pub dependencies: Vec<String>,
    pub load_order_group: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl ServiceDefinition {
    /// Build the definition from configuration. The id and display name
    /// are required.
    pub fn from_config(store: &ConfigStore) -> Result<Self, ServiceError> {
        let id = store
            .get(KEY_SERVICE_ID)
            .ok_or(ServiceError::MissingId)?
            .to_string();
        let name = store
            .get(KEY_SERVICE_NAME)
            .unwrap_or(&id)
            .to_string();
        Ok(ServiceDefinition {
            id,
            name,
            description: store.get(KEY_SERVICE_DESCRIPTION).map(str::to_string),
            startup: StartupMode::parse(store.get(KEY_SERVICE_STARTUP)),
            controls: AcceptedControls::parse(store.get(KEY_SERVICE_CONTROLS)),
            dependencies: store.numbered_values(KEY_SERVICE_DEPENDENCY),
            load_order_group: store.get(KEY_SERVICE_LOAD_ORDER_GROUP).map(str::to_string),
            user: store.get(KEY_SERVICE_USER).map(str::to_string),
            password: store.get(KEY_SERVICE_PASSWORD).map(str::to_string),
        })
    }
}

/// The OS service database.
pub trait ServiceManager: Send + Sync {
    /// Create the service entry; `command` is the full launch command.
    fn install(&self, definition: &ServiceDefinition, command: &str) -> Result<(), ServiceError>;

    fn uninstall(&self, id: &str) -> Result<(), ServiceError>;
}

/// Register the service and record its description.
pub fn register(
    store: &ConfigStore,
    manager: &dyn ServiceManager,
    registry: &dyn Registry,
    command: &str,
) -> Result<(), ServiceError> {
    let definition = ServiceDefinition::from_config(store)?;
    log::info!("Registering service: {} ({})", definition.name, definition.id);
    manager.install(&definition, command)?;

    if let Some(description) = &definition.description {
        let key = format!("{}\\{}", SERVICES_KEY, definition.id);
        if let Err(e) = registry.set_value(
            RegistryRoot::LocalMachine,
            &key,
            Some("Description"),
            RegistryValue::Text(description.clone()),
        ) {
            log::warn!("Could not record service description: {}", e);
        }
    }
    Ok(())
}

pub fn unregister(
    store: &ConfigStore,
    manager: &dyn ServiceManager,
) -> Result<(), ServiceError> {
    let id = store
        .get(KEY_SERVICE_ID)
        .ok_or(ServiceError::MissingId)?;
    log::info!("Unregistering service: {}", id);
    manager.uninstall(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::registry::MapRegistry;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeManager {
        installed: Mutex<Vec<(String, String)>>,
        removed: Mutex<Vec<String>>,
    }

    impl ServiceManager for FakeManager {
        fn install(&self, definition: &ServiceDefinition, command: &str) -> Result<(), ServiceError> {
            self.installed
                .lock()
                .unwrap()
                .push((definition.id.clone(), command.to_string()));
            Ok(())
        }

        fn uninstall(&self, id: &str) -> Result<(), ServiceError> {
            self.removed.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    fn store_with(pairs: &[(&str, &str)]) -> ConfigStore {
        let mut store = ConfigStore::new();
        for (k, v) in pairs {
            store.set(k, (*v).to_string());
        }
        store
    }

    #[test]
    fn test_definition_from_config() {
        let store = store_with(&[
            ("service.id", "acme"),
            ("service.name", "Acme Service"),
            ("service.description", "Does acme things"),
            ("service.startup", "auto"),
            ("service.dependency.1", "Tcpip"),
            ("service.dependency.2", "Dnscache"),
        ]);
        let definition = ServiceDefinition::from_config(&store).unwrap();
        assert_eq!(definition.id, "acme");
        assert_eq!(definition.name, "Acme Service");
        assert_eq!(definition.startup, StartupMode::Auto);
        assert_eq!(definition.dependencies, vec!["Tcpip", "Dnscache"]);
    }

    #[test]
    fn test_name_defaults_to_id_and_unknown_startup_warns_to_demand() {
        let store = store_with(&[("service.id", "acme"), ("service.startup", "sometimes")]);
        let definition = ServiceDefinition::from_config(&store).unwrap();
        assert_eq!(definition.name, "acme");
        assert_eq!(definition.startup, StartupMode::Demand);
    }

    #[test]
    fn test_missing_id_fails() {
        let store = ConfigStore::new();
        assert!(matches!(
            ServiceDefinition::from_config(&store),
            Err(ServiceError::MissingId)
        ));
    }

    #[test]
    fn test_register_records_description() {
        let store = store_with(&[
            ("service.id", "acme"),
            ("service.description", "Does acme things"),
        ]);
        let manager = FakeManager::default();
        let registry = MapRegistry::new();
        register(&store, &manager, &registry, "C:\\acme\\acme.exe").unwrap();

        assert_eq!(manager.installed.lock().unwrap().len(), 1);
        let recorded = registry
            .value(
                RegistryRoot::LocalMachine,
                "System\\CurrentControlSet\\Services\\acme",
                "Description",
            )
            .unwrap();
        assert_eq!(recorded.as_text(), "Does acme things");
    }

    #[test]
    fn test_unregister_uses_configured_id() {
        let store = store_with(&[("service.id", "acme")]);
        let manager = FakeManager::default();
        unregister(&store, &manager).unwrap();
        assert_eq!(*manager.removed.lock().unwrap(), vec!["acme"]);
    }
}
