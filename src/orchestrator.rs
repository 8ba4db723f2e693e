//! Launch sequencing
//!
//! Ties the subsystems together: resolve configuration, coordinate
//! single-instance mode, locate the runtime, assemble its arguments,
//! start it and hand control to the hosted program (directly or through
//! the service lifecycle). Every OS-facing capability arrives through
//! [`LaunchEnv`], so the whole sequence runs in tests against fakes.

use crate::cli::{self, BuiltInCommand, CliMode};
use crate::config::{self, ConfigStore};
use crate::error::LaunchError;
use crate::instance::{EndpointTransport, InstanceRole, SingleInstanceCoordinator};
use crate::platform::memory::MemoryProbe;
use crate::platform::registry::Registry;
use crate::service::{
    self, ServiceDispatcher, ServiceLifecycleBridge, ServiceManager, StatusReporter,
};
use crate::vm::{ArgumentBuilder, EntryPoints, RuntimeFactory, VmLocator};
use crate::{assoc, vm};
use std::path::PathBuf;
use std::sync::Arc;

const KEY_MAIN_CLASS: &str = ":main.class";
const KEY_SERVICE_CLASS: &str = ":service.class";
const KEY_INSTANCE_CLASS: &str = ":instance.class";
const KEY_SERVICE_MODE: &str = ":service.mode";
const KEY_ARG: &str = ":arg";

/// Service integration points. Without a dispatcher the service entry
/// runs in console mode; without a manager, registration commands fail.
pub struct ServiceHooks {
    pub reporter: Arc<dyn StatusReporter>,
    pub dispatcher: Option<Arc<dyn ServiceDispatcher>>,
    pub manager: Option<Box<dyn ServiceManager>>,
}

/// The launcher's view of its host process and OS.
pub struct LaunchEnv {
    pub executable: PathBuf,
    pub embedded_config: Option<Vec<u8>>,
    pub registry: Arc<dyn Registry>,
    pub memory: Box<dyn MemoryProbe>,
    pub transport: Arc<dyn EndpointTransport>,
    pub runtime_factory: Box<dyn RuntimeFactory>,
    pub service: Option<ServiceHooks>,
}

pub struct LaunchOrchestrator {
    env: LaunchEnv,
}

impl LaunchOrchestrator {
    pub fn new(env: LaunchEnv) -> Self {
        LaunchOrchestrator { env }
    }

    /// Run the launcher to completion and return the process exit code.
    pub fn execute(&self, args: &[String]) -> i32 {
        let mode = match cli::parse(args) {
            Ok(mode) => mode,
            Err(e) => {
                e.present(&ConfigStore::new());
                return e.exit_code();
            }
        };

        let (builtin, launch_args, config_path) = match mode {
            CliMode::Launch(args) => (None, args, config::default_config_path(&self.env.executable)),
            CliMode::BuiltIn(BuiltInCommand::Version, _) => {
                println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
                return 0;
            }
            CliMode::BuiltIn(BuiltInCommand::ExecuteConfig(path), args) => (None, args, path),
            CliMode::BuiltIn(command, args) => {
                let path = config::default_config_path(&self.env.executable);
                (Some(command), args, path)
            }
        };

        let mut store = match config::load(
            self.env.embedded_config.as_deref(),
            &config_path,
            self.env.registry.as_ref(),
        ) {
            Ok(store) => store,
            Err(e) => {
                let e = LaunchError::from(e);
                e.present(&ConfigStore::new());
                return e.exit_code();
            }
        };
        config::overrides::apply_command_line(&mut store, &launch_args);

        let result = match builtin {
            Some(command) => self.run_builtin(command, &store),
            None => self.run_launch(&store, &launch_args),
        };
        match result {
            Ok(code) => code,
            Err(e) => {
                e.present(&store);
                e.exit_code()
            }
        }
    }

    fn run_builtin(&self, command: BuiltInCommand, store: &ConfigStore) -> Result<i32, LaunchError> {
        let executable = self.env.executable.display().to_string();
        match command {
            BuiltInCommand::PrintConfig => {
                for (key, value) in store.iter() {
                    println!("{key}={value}");
                }
                Ok(0)
            }
            BuiltInCommand::RegisterFileAssociations => {
                let count = assoc::register(store, self.env.registry.as_ref(), &executable)?;
                log::info!("Registered {} file association(s)", count);
                Ok(0)
            }
            BuiltInCommand::UnregisterFileAssociations => {
                let count = assoc::unregister(store, self.env.registry.as_ref())?;
                log::info!("Removed {} file association(s)", count);
                Ok(0)
            }
            BuiltInCommand::RegisterService => {
                let manager = self.service_manager()?;
                service::install::register(store, manager, self.env.registry.as_ref(), &executable)?;
                Ok(0)
            }
            BuiltInCommand::UnregisterService => {
                let manager = self.service_manager()?;
                service::install::unregister(store, manager)?;
                Ok(0)
            }
            // Handled before configuration is loaded.
            BuiltInCommand::Version | BuiltInCommand::ExecuteConfig(_) => Ok(0),
        }
    }

    fn service_manager(&self) -> Result<&dyn ServiceManager, LaunchError> {
        self.env
            .service
            .as_ref()
            .and_then(|hooks| hooks.manager.as_deref())
            .ok_or_else(|| {
                LaunchError::Command("No service manager available on this host".to_string())
            })
    }

    fn run_launch(&self, store: &ConfigStore, launch_args: &[String]) -> Result<i32, LaunchError> {
        let command_line = launch_args.join(" ");
        let mut coordinator = SingleInstanceCoordinator::start(
            store,
            Arc::clone(&self.env.transport),
            &command_line,
        );
        if coordinator.role() == InstanceRole::Secondary {
            // The primary instance handles this launch.
            return Ok(0);
        }

        let library = VmLocator::new(self.env.registry.as_ref()).locate(store)?;
        let runtime_args = ArgumentBuilder::new(store, self.env.memory.as_ref()).build();
        let entries = EntryPoints {
            main: store.get(KEY_MAIN_CLASS).map(str::to_string),
            service: store.get(KEY_SERVICE_CLASS).map(str::to_string),
            instance: store.get(KEY_INSTANCE_CLASS).map(str::to_string),
        };

        let session = self.env.runtime_factory.start(&library, &runtime_args, entries)?;
        let bridge = session.bridge();

        let service_mode =
            store.get_bool(KEY_SERVICE_MODE, store.get(KEY_SERVICE_CLASS).is_some());
        let program_args = store.numbered_values(KEY_ARG);

        let result = if service_mode {
            self.run_as_service(store, Arc::clone(&bridge), &program_args)
        } else {
            bridge.invoke_main(&program_args).map(|()| 0).map_err(|e| match e {
                vm::HostError::InvokeFailed(code) => LaunchError::RuntimeExit(code),
                other => LaunchError::from(other),
            })
        };

        // Activation messages stay buffered until the hosted entry point
        // has returned; only then may they be dispatched.
        if result.is_ok() {
            coordinator.signal_ready(Arc::clone(&bridge));
        }
        coordinator.teardown();
        if let Err(e) = session.shutdown() {
            log::warn!("Runtime shutdown failed: {}", e);
        }
        result
    }

    fn run_as_service(
        &self,
        store: &ConfigStore,
        bridge: Arc<dyn vm::HostedRuntimeBridge>,
        args: &[String],
    ) -> Result<i32, LaunchError> {
        let hooks = self
            .env
            .service
            .as_ref()
            .ok_or_else(|| LaunchError::Command("No service dispatcher available".to_string()))?;
        let lifecycle =
            ServiceLifecycleBridge::initialise(store, bridge, Arc::clone(&hooks.reporter))?;
        // Abort/exit hooks in the hosted runtime must reach the status
        // reporter even on abnormal termination.
        let notifier: Arc<dyn vm::host::ShutdownNotifier> = lifecycle.clone();
        vm::host::install_shutdown_notifier(notifier);

        let dispatcher: Arc<dyn ServiceDispatcher> = match &hooks.dispatcher {
            Some(dispatcher) => Arc::clone(dispatcher),
            None => Arc::new(service::ConsoleDispatcher { args: args.to_vec() }),
        };
        let code = lifecycle.run(dispatcher.as_ref())?;
        if code == 0 {
            Ok(0)
        } else {
            Err(LaunchError::RuntimeExit(code))
        }
    }
}
