//! Session Broker Simulator.
//!
//! In-process pub/sub standing in for the realtime session transport.
//! Clients join rooms keyed by session id and the server rebroadcasts typed
//! [`SessionMessage`](tavern_shared::SessionMessage)s to every connected
//! member, the sender included.

mod client;
mod connection;
mod server;

use std::sync::Arc;
use std::time::Duration;

pub use client::{ClientOptions, SessionClient};
pub use connection::{ClientEvent, ClientListener, ConnectionState};
pub use server::SessionServer;

use crate::infrastructure::clock::Suspension;
use crate::infrastructure::ports::RandomPort;
use server::BrokerCore;

/// Broker-wide transport behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    /// Simulated one-way delay per message (zero delivers inline)
    pub latency: Duration,
    /// Default fault injection for new clients
    pub simulate_errors: bool,
    /// Events a faulty client delivers before errors may start
    pub error_threshold: u64,
    /// Chance that an event past the threshold becomes an error
    pub error_probability: f64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            simulate_errors: false,
            error_threshold: 5,
            error_probability: 0.1,
        }
    }
}

/// The session broker: client registry plus server.
pub struct SessionBroker {
    core: Arc<BrokerCore>,
}

impl SessionBroker {
    pub fn new(
        settings: BrokerSettings,
        suspension: Suspension,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            core: Arc::new(BrokerCore::new(settings, suspension, random)),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.core.settings
    }

    /// Create and register a client.
    pub fn create_client(&self, options: ClientOptions) -> SessionClient {
        SessionClient::attach(Arc::clone(&self.core), options)
    }

    /// Handle to a registered client.
    pub fn client(&self, client_id: &str) -> Option<SessionClient> {
        self.core
            .client(client_id)
            .map(|state| SessionClient::from_state(Arc::clone(&self.core), state))
    }

    pub fn server(&self) -> SessionServer {
        SessionServer::new(Arc::clone(&self.core))
    }

    /// Registered clients (created or connected, not yet disconnected).
    pub fn client_count(&self) -> usize {
        self.core.client_count()
    }

    /// Disconnect every client and start over with an empty registry.
    pub fn reset_clients(&self) {
        self.core.reset();
    }
}

impl std::fmt::Debug for SessionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBroker")
            .field("settings", &self.core.settings)
            .field("clients", &self.core.client_count())
            .finish()
    }
}
