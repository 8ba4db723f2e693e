//! OS service lifecycle bridge
//!
//! Runs the hosted entry point as an OS service: the control thread
//! stays inside the dispatcher answering control codes while a worker
//! thread runs the hosted service main to completion. Status reporting
//! to the OS goes through [`StatusReporter`], and the dispatcher itself
//! through [`ServiceDispatcher`], so the lifecycle is testable without
//! a service control manager.

pub mod control;
pub mod install;

use crate::config::ConfigStore;
use crate::vm::host::ShutdownNotifier;
use crate::vm::HostedRuntimeBridge;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub use control::{AcceptedControls, ControlCode};
pub use install::{ServiceDefinition, ServiceManager, StartupMode};

pub const KEY_SERVICE_ID: &str = ":service.id";
pub const KEY_SERVICE_CLASS: &str = ":service.class";
const KEY_SERVICE_CONTROLS: &str = ":service.controls";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service id is not configured")]
    MissingId,

    #[error("Service entry point is not configured")]
    MissingEntryPoint,

    #[error("Service dispatcher failed: {0}")]
    Dispatch(String),

    #[error("Service manager operation failed: {0}")]
    Manager(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    StartPending,
    Running,
    Paused,
    StopPending,
    Stopped,
}

/// What the bridge does in response to an accepted control code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Notify the hosted runtime on a detached thread, then report the
    /// new state without waiting.
    NotifyStop,
    /// Forward to the hosted control handler, then report the new state.
    Notify,
    /// Forward to the hosted control handler; state is unchanged.
    Forward,
    Ignore,
}

/// The service state machine as a pure table.
pub fn transition(state: ServiceState, code: ControlCode) -> (ServiceState, ControlAction) {
    use ControlAction::*;
    use ServiceState::*;
    match (state, code) {
        // Stop and shutdown interrupt any live state.
        (StartPending | Running | Paused, ControlCode::Stop | ControlCode::Shutdown) => {
            (StopPending, NotifyStop)
        }
        (Running, ControlCode::Pause) => (Paused, Notify),
        (Paused, ControlCode::Continue) => (Running, Notify),
        // Informational controls are forwarded from any live state.
        (
            StartPending | Running | Paused,
            ControlCode::ParamChange
            | ControlCode::NetBindChange
            | ControlCode::HardwareProfile
            | ControlCode::PowerEvent
            | ControlCode::SessionChange,
        ) => (state, Forward),
        (_, ControlCode::Interrogate) => (state, Forward),
        _ => (state, Ignore),
    }
}

/// Reports service status transitions to the OS.
pub trait StatusReporter: Send + Sync {
    fn report(&self, state: ServiceState, exit_code: i32);
}

/// The OS service control dispatcher connection.
pub trait ServiceDispatcher: Send + Sync {
    /// Register the service, blocking until the OS signals start.
    /// Returns the service start arguments.
    fn connect(&self, service_id: &str) -> Result<Vec<String>, ServiceError>;

    /// Block for the next control code; `None` once the service stops.
    fn next_control(&self) -> Option<ControlCode>;
}

/// Reporter for hosts without a service control manager: transitions
/// only reach the log.
pub struct LogStatusReporter;

impl StatusReporter for LogStatusReporter {
    fn report(&self, state: ServiceState, exit_code: i32) {
        log::info!("Service status: {:?} (exit code {})", state, exit_code);
    }
}

/// Dispatcher for hosts without a service control manager: start is
/// immediate with the given arguments and no controls ever arrive, so
/// the hosted service main simply runs to completion.
pub struct ConsoleDispatcher {
    pub args: Vec<String>,
}

impl ServiceDispatcher for ConsoleDispatcher {
    fn connect(&self, service_id: &str) -> Result<Vec<String>, ServiceError> {
        log::info!("Running service '{}' in console mode", service_id);
        Ok(self.args.clone())
    }

    fn next_control(&self) -> Option<ControlCode> {
        None
    }
}

pub struct ServiceLifecycleBridge {
    id: String,
    accepted: AcceptedControls,
    bridge: Arc<dyn HostedRuntimeBridge>,
    reporter: Arc<dyn StatusReporter>,
    state: Mutex<ServiceState>,
    exit_code: Mutex<i32>,
}

impl ServiceLifecycleBridge {
    /// Resolve service identity and accepted controls. Fails when the
    /// service id or hosted entry point is missing.
    pub fn initialise(
        store: &ConfigStore,
        bridge: Arc<dyn HostedRuntimeBridge>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Result<Arc<Self>, ServiceError> {
        let id = store
            .get(KEY_SERVICE_ID)
            .ok_or(ServiceError::MissingId)?
            .to_string();
        if store.get(KEY_SERVICE_CLASS).is_none() {
            return Err(ServiceError::MissingEntryPoint);
        }
        let accepted = AcceptedControls::parse(store.get(KEY_SERVICE_CONTROLS));
        log::info!("Service '{}' accepts controls: {:?}", id, accepted);
        Ok(Arc::new(ServiceLifecycleBridge {
            id,
            accepted,
            bridge,
            reporter,
            state: Mutex::new(ServiceState::StartPending),
            exit_code: Mutex::new(0),
        }))
    }

    pub fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn report(&self, state: ServiceState, exit_code: i32) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        self.reporter.report(state, exit_code);
    }

    /// Run the service to completion. Blocks the calling thread inside
    /// the dispatcher until the OS signals start, then keeps it as the
    /// control thread while a worker runs the hosted service main.
    pub fn run(self: &Arc<Self>, dispatcher: &dyn ServiceDispatcher) -> Result<i32, ServiceError> {
        let args = dispatcher.connect(&self.id)?;
        self.report(ServiceState::StartPending, 0);

        let (ready_tx, ready_rx) = mpsc::channel();
        let worker_self = Arc::clone(self);
        let worker = std::thread::Builder::new()
            .name("service-worker".to_string())
            .spawn(move || {
                // Arguments are handed off; the control thread may now
                // report the service as running.
                let _ = ready_tx.send(());
                let code = worker_self.run_hosted_main(&args);
                worker_self.finish(code);
            })
            .map_err(|e| ServiceError::Dispatch(e.to_string()))?;

        let _ = ready_rx.recv();
        self.report(ServiceState::Running, 0);

        while let Some(code) = dispatcher.next_control() {
            self.control(code);
        }

        let _ = worker.join();
        Ok(*self.exit_code.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn run_hosted_main(&self, args: &[String]) -> i32 {
        if let Err(e) = self.bridge.attach_worker() {
            log::error!("Could not attach service worker thread: {}", e);
            return 1;
        }
        let code = match self.bridge.invoke_service_main(args) {
            Ok(code) => code,
            Err(e) => {
                log::error!("Hosted service main failed: {}", e);
                1
            }
        };
        if let Err(e) = self.bridge.detach() {
            log::warn!("Service worker detach failed: {}", e);
        }
        code
    }

    fn finish(&self, exit_code: i32) {
        *self.exit_code.lock().unwrap_or_else(|e| e.into_inner()) = exit_code;
        self.report(ServiceState::Stopped, exit_code);
    }

    /// Handle one control code on the control thread. Returns the
    /// hosted handler's result for forwarded codes.
    pub fn control(self: &Arc<Self>, code: ControlCode) -> i32 {
        if !self.accepted.accepts(code) {
            log::debug!("Control code not accepted, ignoring: {:?}", code);
            return 0;
        }
        let current = self.state();
        let (next, action) = transition(current, code);
        log::debug!("Service control {:?}: {:?} -> {:?}", code, current, next);
        match action {
            ControlAction::NotifyStop => {
                // The hosted shutdown may take arbitrarily long; the
                // pending report must not wait on it.
                let notify_self = Arc::clone(self);
                let _ = std::thread::Builder::new()
                    .name("service-stop-notify".to_string())
                    .spawn(move || {
                        if let Err(e) = notify_self.bridge.invoke_service_control(code.code()) {
                            log::warn!("Hosted stop notification failed: {}", e);
                        }
                    });
                self.report(next, 0);
                0
            }
            ControlAction::Notify => {
                let result = self.forward(code);
                self.report(next, 0);
                result
            }
            ControlAction::Forward => self.forward(code),
            ControlAction::Ignore => 0,
        }
    }

    fn forward(&self, code: ControlCode) -> i32 {
        match self.bridge.invoke_service_control(code.code()) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Hosted control handler failed: {}", e);
                1
            }
        }
    }
}

impl ShutdownNotifier for ServiceLifecycleBridge {
    /// Called from the runtime's abort/exit hooks so the OS sees the
    /// service stop even on abnormal termination.
    fn notify_shutdown(&self, exit_code: i32) {
        self.finish(exit_code);
    }
}
