//! Client connection state and the events a client observes.

use tavern_shared::SessionMessage;
use tokio::sync::mpsc;

/// Connection state of a simulated session client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to the broker
    Disconnected,
    /// `connect()` is waiting out the simulated handshake
    Connecting,
    /// Receiving room traffic
    Connected,
}

impl ConnectionState {
    /// Convert to u8 for atomic storage.
    pub fn to_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    /// Convert from u8 (atomic storage).
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Something a client listener observes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    /// A room broadcast (the `session_message` event)
    Message(SessionMessage),
    /// Simulated transport failure raised instead of a delivery
    Error(String),
}

impl ClientEvent {
    pub fn into_message(self) -> Option<SessionMessage> {
        match self {
            ClientEvent::Message(message) => Some(message),
            _ => None,
        }
    }
}

/// Receiving end of a client subscription.
///
/// Every listener of a client sees every event emitted after it subscribed,
/// in emission order.
#[derive(Debug)]
pub struct ClientListener {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
}

impl ClientListener {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ClientEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event. `None` once the client is gone.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next room message, skipping other events.
    pub async fn next_message(&mut self) -> Option<SessionMessage> {
        while let Some(event) = self.rx.recv().await {
            if let ClientEvent::Message(message) = event {
                return Some(message);
            }
        }
        None
    }

    /// All room messages queued right now, in order.
    pub fn drain_messages(&mut self) -> Vec<SessionMessage> {
        std::iter::from_fn(|| self.try_next())
            .filter_map(ClientEvent::into_message)
            .collect()
    }

    /// All events queued right now, in order.
    pub fn drain(&mut self) -> Vec<ClientEvent> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}
