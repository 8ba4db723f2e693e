//! vmlaunch CLI
//!
//! Usage:
//!   vmlaunch [args for the hosted program] [-Wkey=value overrides]
//!   vmlaunch --vmlaunch:PrintConfig
//!   vmlaunch --vmlaunch:ExecuteConfig other.ini

use std::path::PathBuf;
use std::sync::Arc;
use vmlaunch::platform::{MapRegistry, SysinfoProbe};
use vmlaunch::service::LogStatusReporter;
use vmlaunch::{instance::LocalBroker, vm::NativeRuntimeFactory};
use vmlaunch::{LaunchEnv, LaunchOrchestrator, ServiceHooks};

fn main() {
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::init_from_env(env);

    let executable = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("vmlaunch"));
    let args: Vec<String> = std::env::args().skip(1).collect();

    let env = LaunchEnv {
        executable,
        // Embedded configuration blocks come from the executable image;
        // extraction is platform packaging, not done here.
        embedded_config: None,
        registry: Arc::new(MapRegistry::new()),
        memory: Box::new(SysinfoProbe),
        transport: Arc::new(LocalBroker),
        runtime_factory: Box::new(NativeRuntimeFactory),
        service: Some(ServiceHooks {
            reporter: Arc::new(LogStatusReporter),
            dispatcher: None,
            manager: None,
        }),
    };

    let code = LaunchOrchestrator::new(env).execute(&args);
    std::process::exit(code);
}
