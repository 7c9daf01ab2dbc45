//! Simulated session clients.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tavern_shared::{SessionMessage, SessionMessageType};
use tokio::sync::mpsc;

use super::connection::{ClientEvent, ClientListener, ConnectionState};
use super::server::BrokerCore;
use crate::infrastructure::ports::BrokerError;
use crate::infrastructure::sync::lock;

/// Options for `SessionBroker::create_client`.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Client id; generated (`client-N`) when absent
    pub id: Option<String>,
    /// Start in the connected state
    pub auto_connect: bool,
    /// Override the broker-wide fault injection setting
    pub simulate_errors: Option<bool>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn auto_connect(mut self) -> Self {
        self.auto_connect = true;
        self
    }

    pub fn simulate_errors(mut self, enabled: bool) -> Self {
        self.simulate_errors = Some(enabled);
        self
    }
}

/// Per-client state shared with the server side.
pub(crate) struct ClientState {
    id: String,
    connection: AtomicU8,
    sessions: Mutex<BTreeSet<String>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<ClientEvent>>>,
    simulate_errors: bool,
    emitted: AtomicU64,
}

impl ClientState {
    pub(crate) fn new(id: String, simulate_errors: bool) -> Self {
        Self {
            id,
            connection: AtomicU8::new(ConnectionState::Disconnected.to_u8()),
            sessions: Mutex::new(BTreeSet::new()),
            listeners: Mutex::new(Vec::new()),
            simulate_errors,
            emitted: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.connection.store(state.to_u8(), Ordering::SeqCst);
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub(crate) fn in_session(&self, session_id: &str) -> bool {
        lock(&self.sessions).contains(session_id)
    }

    pub(crate) fn simulate_errors(&self) -> bool {
        self.simulate_errors
    }

    /// Count one room event; returns the new total.
    pub(crate) fn record_emitted(&self) -> u64 {
        self.emitted.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Send an event to every live listener, dropping closed ones.
    pub(crate) fn emit(&self, event: ClientEvent) {
        lock(&self.listeners).retain(|tx| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(client_id = %self.id, "Dropping closed client listener");
                false
            }
        });
    }

    fn mark_connected(&self) {
        self.set_state(ConnectionState::Connected);
        self.emit(ClientEvent::Connected);
    }

    /// Move from `from` to `to`; false when another call changed the state first.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.connection
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Leave every room and drop to `Disconnected`.
    pub(crate) fn force_disconnect(&self) {
        let was = self.state();
        self.set_state(ConnectionState::Disconnected);
        lock(&self.sessions).clear();
        if was != ConnectionState::Disconnected {
            self.emit(ClientEvent::Disconnected);
        }
    }
}

/// A simulated realtime client.
///
/// Cloning yields another handle to the same client.
#[derive(Clone)]
pub struct SessionClient {
    state: Arc<ClientState>,
    core: Arc<BrokerCore>,
}

impl SessionClient {
    pub(crate) fn attach(core: Arc<BrokerCore>, options: ClientOptions) -> Self {
        let id = options.id.unwrap_or_else(|| core.next_client_id());
        let simulate_errors = options
            .simulate_errors
            .unwrap_or(core.settings.simulate_errors);
        let state = Arc::new(ClientState::new(id, simulate_errors));
        core.register(Arc::clone(&state));
        if options.auto_connect {
            state.mark_connected();
        }
        tracing::debug!(
            client_id = %state.id(),
            auto_connect = options.auto_connect,
            simulate_errors,
            "Session client created"
        );
        Self { state, core }
    }

    pub(crate) fn from_state(core: Arc<BrokerCore>, state: Arc<ClientState>) -> Self {
        Self { state, core }
    }

    pub fn id(&self) -> &str {
        self.state.id()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Sessions this client has joined, sorted.
    pub fn joined_sessions(&self) -> Vec<String> {
        lock(&self.state.sessions).iter().cloned().collect()
    }

    /// Register a listener for this client's events.
    pub fn subscribe(&self) -> ClientListener {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state.listeners).push(tx);
        ClientListener::new(rx)
    }

    /// Connect to the broker. A no-op while already connected.
    ///
    /// Waits out the simulated latency in the `Connecting` state. Fails with
    /// `NotConnected` when `disconnect` runs before the latency elapses.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        if self.state.is_connected() {
            return Ok(());
        }
        self.state.set_state(ConnectionState::Connecting);
        self.core.register(Arc::clone(&self.state));

        if let Err(cancelled) = self.core.suspension.pause(self.core.settings.latency).await {
            self.state
                .transition(ConnectionState::Connecting, ConnectionState::Disconnected);
            return Err(cancelled.into());
        }

        // A disconnect during the latency window wins.
        if !self
            .state
            .transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            tracing::debug!(client_id = %self.id(), "Connect abandoned by disconnect");
            return Err(BrokerError::NotConnected {
                client_id: self.id().to_string(),
            });
        }
        self.core.register(Arc::clone(&self.state));
        self.state.emit(ClientEvent::Connected);
        tracing::debug!(client_id = %self.id(), "Session client connected");
        Ok(())
    }

    /// Leave every session, drop to `Disconnected` and leave the registry.
    pub fn disconnect(&self) {
        self.state.force_disconnect();
        self.core.unregister(self.id());
    }

    /// Join a session room and announce it to the room (including self).
    pub fn join_session(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<SessionMessage, BrokerError> {
        self.ensure_connected()?;
        lock(&self.state.sessions).insert(session_id.to_string());
        tracing::debug!(
            client_id = %self.id(),
            session_id = %session_id,
            "Client joined session"
        );
        let message = self
            .message(SessionMessageType::JoinSession, session_id)
            .with_player(participant_id);
        self.core.publish(message)
    }

    /// Leave a session room and announce it to the remaining members.
    pub fn leave_session(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<SessionMessage, BrokerError> {
        self.ensure_connected()?;
        if !lock(&self.state.sessions).remove(session_id) {
            return Err(BrokerError::NotInSession {
                client_id: self.id().to_string(),
                session_id: session_id.to_string(),
            });
        }
        let message = self
            .message(SessionMessageType::LeaveSession, session_id)
            .with_player(participant_id);
        self.core.publish(message)
    }

    pub fn send_player_action(
        &self,
        session_id: &str,
        player_id: &str,
        data: serde_json::Value,
    ) -> Result<SessionMessage, BrokerError> {
        self.ensure_connected()?;
        let message = self
            .message(SessionMessageType::PlayerAction, session_id)
            .with_player(player_id)
            .with_data(data);
        self.core.publish(message)
    }

    pub fn send_gm_response(
        &self,
        session_id: &str,
        data: serde_json::Value,
    ) -> Result<SessionMessage, BrokerError> {
        self.ensure_connected()?;
        let message = self
            .message(SessionMessageType::GmResponse, session_id)
            .with_data(data);
        self.core.publish(message)
    }

    pub fn send_session_update(
        &self,
        session_id: &str,
        data: serde_json::Value,
    ) -> Result<SessionMessage, BrokerError> {
        self.ensure_connected()?;
        let message = self
            .message(SessionMessageType::SessionUpdate, session_id)
            .with_data(data);
        self.core.publish(message)
    }

    fn ensure_connected(&self) -> Result<(), BrokerError> {
        if self.state.is_connected() {
            Ok(())
        } else {
            Err(BrokerError::NotConnected {
                client_id: self.id().to_string(),
            })
        }
    }

    fn message(&self, message_type: SessionMessageType, session_id: &str) -> SessionMessage {
        SessionMessage::new(message_type, session_id, self.core.suspension.clock().now())
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("sessions", &self.joined_sessions())
            .finish()
    }
}
