//! Single-instance coordination
//!
//! The first launch registers a named endpoint and becomes primary;
//! later launches forward their command line to it and exit. Messages
//! received before the hosted runtime signals readiness are buffered in
//! arrival order and drained exactly once when readiness arrives.

pub mod transport;

use crate::config::ConfigStore;
use crate::vm::HostedRuntimeBridge;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub use transport::{EndpointName, EndpointTransport, LocalBroker, TransportError};

const KEY_SINGLE_INSTANCE: &str = ":single.instance";
const KEY_SERVER_NAME: &str = ":instance.server.name";
const KEY_TOPIC: &str = ":instance.topic";

const DEFAULT_SERVER_NAME: &str = "vmlaunch";
const DEFAULT_TOPIC: &str = "system";

const ACTIVATE_PREFIX: &str = "ACTIVATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    /// Single-instance mode is off.
    Disabled,
    /// This launch owns the endpoint and keeps running.
    Primary,
    /// This launch forwarded its command line and should exit.
    Secondary,
}

/// Buffers incoming messages until the hosted runtime is ready, then
/// dispatches in strict arrival order.
pub struct ReadyGate {
    inner: Mutex<GateState>,
}

struct GateState {
    ready: bool,
    pending: VecDeque<String>,
    bridge: Option<Arc<dyn HostedRuntimeBridge>>,
}

impl ReadyGate {
    pub fn new() -> Self {
        ReadyGate {
            inner: Mutex::new(GateState {
                ready: false,
                pending: VecDeque::new(),
                bridge: None,
            }),
        }
    }

    /// Called from the message thread for every received transaction.
    pub fn submit(&self, message: String) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.ready {
            if let Some(bridge) = &state.bridge {
                // Dispatch under the lock so a message arriving during
                // the drain cannot overtake a buffered one.
                dispatch(bridge.as_ref(), &message);
            }
        } else {
            log::debug!("Buffering message until runtime is ready: {}", message);
            state.pending.push_back(message);
        }
    }

    /// Marks the runtime ready and drains the buffer in arrival order.
    /// Each buffered message is delivered exactly once.
    pub fn signal_ready(&self, bridge: Arc<dyn HostedRuntimeBridge>) {
        let mut state = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if state.ready {
            return;
        }
        state.ready = true;
        state.bridge = Some(Arc::clone(&bridge));
        while let Some(message) = state.pending.pop_front() {
            dispatch(bridge.as_ref(), &message);
        }
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

fn dispatch(bridge: &dyn HostedRuntimeBridge, message: &str) {
    let result = if message == ACTIVATE_PREFIX {
        bridge.invoke_activate("")
    } else if let Some(rest) = message.strip_prefix("ACTIVATE ") {
        bridge.invoke_activate(rest)
    } else {
        bridge.invoke_execute(message)
    };
    if let Err(e) = result {
        log::error!("Message dispatch failed: {}", e);
    }
}

pub struct SingleInstanceCoordinator {
    role: InstanceRole,
    endpoint: Option<EndpointName>,
    transport: Arc<dyn EndpointTransport>,
    gate: Arc<ReadyGate>,
    message_thread: Option<JoinHandle<()>>,
}

impl SingleInstanceCoordinator {
    /// Resolve the instance role. A secondary launch has already
    /// forwarded `command_line` when this returns.
    pub fn start(
        store: &ConfigStore,
        transport: Arc<dyn EndpointTransport>,
        command_line: &str,
    ) -> Self {
        if !store.get_bool(KEY_SINGLE_INSTANCE, false) {
            return Self::inactive(transport, InstanceRole::Disabled);
        }

        let name = EndpointName::new(
            store.get(KEY_SERVER_NAME).unwrap_or(DEFAULT_SERVER_NAME),
            store.get(KEY_TOPIC).unwrap_or(DEFAULT_TOPIC),
        );

        match transport.register(&name) {
            Ok(server) => Self::primary(transport, name, server),
            Err(_) => {
                log::info!("Existing instance detected on endpoint: {}", name);
                if forward(transport.as_ref(), &name, command_line) {
                    return Self::inactive(transport, InstanceRole::Secondary);
                }
                // The owner disappeared or refused the message; take
                // over rather than vanish without running anything.
                log::warn!("Forwarding to existing instance failed, continuing as primary");
                match transport.register(&name) {
                    Ok(server) => Self::primary(transport, name, server),
                    Err(e) => {
                        log::warn!("Endpoint registration failed ({}), running unlinked", e);
                        Self::inactive(transport, InstanceRole::Primary)
                    }
                }
            }
        }
    }

    fn inactive(transport: Arc<dyn EndpointTransport>, role: InstanceRole) -> Self {
        SingleInstanceCoordinator {
            role,
            endpoint: None,
            transport,
            gate: Arc::new(ReadyGate::new()),
            message_thread: None,
        }
    }

    fn primary(
        transport: Arc<dyn EndpointTransport>,
        name: EndpointName,
        server: Box<dyn transport::EndpointServer>,
    ) -> Self {
        log::info!("Registered as primary instance on endpoint: {}", name);
        let gate = Arc::new(ReadyGate::new());
        let thread_gate = Arc::clone(&gate);
        let message_thread = std::thread::Builder::new()
            .name("instance-messages".to_string())
            .spawn(move || {
                while let Some(message) = server.receive() {
                    thread_gate.submit(message);
                }
            })
            .ok();
        SingleInstanceCoordinator {
            role: InstanceRole::Primary,
            endpoint: Some(name),
            transport,
            gate,
            message_thread,
        }
    }

    pub fn role(&self) -> InstanceRole {
        self.role
    }

    /// Hosted runtime is ready for activation messages.
    pub fn signal_ready(&self, bridge: Arc<dyn HostedRuntimeBridge>) {
        self.gate.signal_ready(bridge);
    }

    /// Release the endpoint and stop the message thread. Safe to call
    /// regardless of role or whether registration ever completed.
    pub fn teardown(&mut self) {
        if let Some(name) = self.endpoint.take() {
            self.transport.release(&name);
        }
        if let Some(thread) = self.message_thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SingleInstanceCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn forward(transport: &dyn EndpointTransport, name: &EndpointName, command_line: &str) -> bool {
    let message = if command_line.is_empty() {
        ACTIVATE_PREFIX.to_string()
    } else {
        format!("{ACTIVATE_PREFIX} {command_line}")
    };
    match transport.connect(name).and_then(|client| client.send(&message)) {
        Ok(()) => {
            log::info!("Forwarded command line to primary instance");
            true
        }
        Err(e) => {
            log::warn!("Could not forward to primary instance: {}", e);
            false
        }
    }
}
