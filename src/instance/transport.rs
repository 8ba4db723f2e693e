//! Named message endpoints
//!
//! Single-instance coordination runs over a named endpoint: one owner
//! per name, any number of one-shot clients. [`LocalBroker`] is the
//! in-process transport; OS-specific transports implement the same
//! traits.

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{LazyLock, Mutex};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointName {
    pub server: String,
    pub topic: String,
}

impl EndpointName {
    pub fn new(server: impl Into<String>, topic: impl Into<String>) -> Self {
        EndpointName {
            server: server.into(),
            topic: topic.into(),
        }
    }
}

impl fmt::Display for EndpointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.topic)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Endpoint '{0}' already has an owner")]
    AlreadyOwned(EndpointName),

    #[error("No owner registered for endpoint '{0}'")]
    NoOwner(EndpointName),

    #[error("Could not deliver message to endpoint '{0}'")]
    SendFailed(EndpointName),
}

pub trait EndpointTransport: Send + Sync {
    /// Claim ownership of the endpoint. Fails when another owner holds it.
    fn register(&self, name: &EndpointName) -> Result<Box<dyn EndpointServer>, TransportError>;

    /// Connect to the current owner for sending.
    fn connect(&self, name: &EndpointName) -> Result<Box<dyn EndpointClient>, TransportError>;

    /// Release ownership; a blocked [`EndpointServer::receive`] then
    /// returns `None`. Safe to call when nothing is registered.
    fn release(&self, name: &EndpointName);
}

pub trait EndpointServer: Send {
    /// Block for the next message; `None` once the endpoint is released.
    fn receive(&self) -> Option<String>;
}

pub trait EndpointClient {
    fn send(&self, message: &str) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// In-process broker

static BROKER_ENDPOINTS: LazyLock<Mutex<HashMap<EndpointName, Sender<String>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Process-local transport over channels. All [`LocalBroker`] instances
/// share one endpoint table, mirroring a machine-global namespace.
#[derive(Debug, Default, Clone)]
pub struct LocalBroker;

struct LocalServer {
    receiver: Receiver<String>,
}

struct LocalClient {
    name: EndpointName,
    sender: Sender<String>,
}

impl EndpointTransport for LocalBroker {
    fn register(&self, name: &EndpointName) -> Result<Box<dyn EndpointServer>, TransportError> {
        let mut endpoints = BROKER_ENDPOINTS.lock().unwrap_or_else(|e| e.into_inner());
        if endpoints.contains_key(name) {
            return Err(TransportError::AlreadyOwned(name.clone()));
        }
        let (sender, receiver) = channel();
        endpoints.insert(name.clone(), sender);
        log::debug!("Registered endpoint: {}", name);
        Ok(Box::new(LocalServer { receiver }))
    }

    fn connect(&self, name: &EndpointName) -> Result<Box<dyn EndpointClient>, TransportError> {
        let endpoints = BROKER_ENDPOINTS.lock().unwrap_or_else(|e| e.into_inner());
        let sender = endpoints
            .get(name)
            .cloned()
            .ok_or_else(|| TransportError::NoOwner(name.clone()))?;
        Ok(Box::new(LocalClient {
            name: name.clone(),
            sender,
        }))
    }

    fn release(&self, name: &EndpointName) {
        let mut endpoints = BROKER_ENDPOINTS.lock().unwrap_or_else(|e| e.into_inner());
        if endpoints.remove(name).is_some() {
            log::debug!("Released endpoint: {}", name);
        }
    }
}

impl EndpointServer for LocalServer {
    fn receive(&self) -> Option<String> {
        self.receiver.recv().ok()
    }
}

impl EndpointClient for LocalClient {
    fn send(&self, message: &str) -> Result<(), TransportError> {
        self.sender
            .send(message.to_string())
            .map_err(|_| TransportError::SendFailed(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> EndpointName {
        // The broker table is process-global; keep test endpoints apart.
        EndpointName::new(format!("transport-test-{tag}"), "system")
    }

    #[test]
    fn test_single_owner_per_endpoint() {
        let name = unique_name("owner");
        let broker = LocalBroker;
        let _server = broker.register(&name).unwrap();
        assert!(matches!(
            broker.register(&name),
            Err(TransportError::AlreadyOwned(_))
        ));
        broker.release(&name);
        let _server = broker.register(&name).unwrap();
        broker.release(&name);
    }

    #[test]
    fn test_messages_arrive_in_send_order() {
        let name = unique_name("order");
        let broker = LocalBroker;
        let server = broker.register(&name).unwrap();
        let client = broker.connect(&name).unwrap();
        client.send("first").unwrap();
        client.send("second").unwrap();
        assert_eq!(server.receive().as_deref(), Some("first"));
        assert_eq!(server.receive().as_deref(), Some("second"));
        broker.release(&name);
    }

    #[test]
    fn test_release_unblocks_receiver() {
        let name = unique_name("release");
        let broker = LocalBroker;
        let server = broker.register(&name).unwrap();
        broker.release(&name);
        assert_eq!(server.receive(), None);
    }

    #[test]
    fn test_connect_without_owner_fails() {
        let name = unique_name("no-owner");
        let broker = LocalBroker;
        assert!(matches!(
            broker.connect(&name),
            Err(TransportError::NoOwner(_))
        ));
    }
}
