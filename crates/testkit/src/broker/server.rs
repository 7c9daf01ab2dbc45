//! Server side of the session broker: room membership and delivery.
//!
//! Delivery is FIFO per room. Without latency a broadcast is delivered
//! inside the call. With latency each room gets one dispatcher task that
//! releases messages in the order they were broadcast, each no earlier than
//! `sent_at + latency` on the injected clock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use tavern_shared::{SessionMessage, SessionMessageType};
use tokio::sync::mpsc;

use super::client::ClientState;
use super::connection::ClientEvent;
use super::BrokerSettings;
use crate::infrastructure::clock::Suspension;
use crate::infrastructure::ports::{BrokerError, RandomPort};
use crate::infrastructure::sync::{lock, read, write};

/// A broadcast waiting for its simulated network delay.
struct Envelope {
    message: SessionMessage,
    due: Duration,
}

/// State shared by the broker, its server handle and every client.
pub(crate) struct BrokerCore {
    pub(crate) settings: BrokerSettings,
    pub(crate) suspension: Suspension,
    random: Arc<dyn RandomPort>,
    /// Ordered by id so fault injection draws are reproducible
    clients: RwLock<BTreeMap<String, Arc<ClientState>>>,
    rooms: Mutex<HashMap<String, mpsc::UnboundedSender<Envelope>>>,
    log: Mutex<Vec<SessionMessage>>,
    next_client: AtomicU64,
}

impl BrokerCore {
    pub(crate) fn new(
        settings: BrokerSettings,
        suspension: Suspension,
        random: Arc<dyn RandomPort>,
    ) -> Self {
        Self {
            settings,
            suspension,
            random,
            clients: RwLock::new(BTreeMap::new()),
            rooms: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            next_client: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_client_id(&self) -> String {
        let n = self.next_client.fetch_add(1, Ordering::SeqCst) + 1;
        format!("client-{n}")
    }

    pub(crate) fn register(&self, client: Arc<ClientState>) {
        let previous = write(&self.clients).insert(client.id().to_string(), Arc::clone(&client));
        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &client) {
                tracing::warn!(
                    client_id = %client.id(),
                    "Client id reused, previous client dropped"
                );
                previous.force_disconnect();
            }
        }
    }

    pub(crate) fn unregister(&self, client_id: &str) {
        if write(&self.clients).remove(client_id).is_some() {
            tracing::debug!(client_id = %client_id, "Client unregistered");
        }
    }

    pub(crate) fn client(&self, client_id: &str) -> Option<Arc<ClientState>> {
        read(&self.clients).get(client_id).cloned()
    }

    pub(crate) fn client_count(&self) -> usize {
        read(&self.clients).len()
    }

    /// Disconnect every client and empty the registry and message log.
    pub(crate) fn reset(&self) {
        let clients = std::mem::take(&mut *write(&self.clients));
        for client in clients.values() {
            client.force_disconnect();
        }
        lock(&self.log).clear();
        tracing::debug!(count = clients.len(), "Session broker clients reset");
    }

    /// Route a message to every connected member of its room.
    pub(crate) fn publish(
        self: &Arc<Self>,
        message: SessionMessage,
    ) -> Result<SessionMessage, BrokerError> {
        if self.suspension.is_shut_down() {
            return Err(BrokerError::Cancelled);
        }
        lock(&self.log).push(message.clone());
        tracing::debug!(
            session_id = %message.session_id,
            message_type = %message.message_type,
            "Broadcasting to session"
        );

        if self.settings.latency.is_zero() {
            self.deliver_to_room(&message);
        } else {
            let due = self.suspension.clock().elapsed() + self.settings.latency;
            self.enqueue(Envelope {
                message: message.clone(),
                due,
            });
        }
        Ok(message)
    }

    fn enqueue(self: &Arc<Self>, envelope: Envelope) {
        let mut rooms = lock(&self.rooms);
        let session_id = envelope.message.session_id.clone();

        let envelope = match rooms.get(&session_id) {
            Some(tx) => match tx.send(envelope) {
                Ok(()) => return,
                Err(mpsc::error::SendError(envelope)) => envelope,
            },
            None => envelope,
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            drop(rooms);
            tracing::warn!(
                session_id = %session_id,
                "No async runtime for delayed delivery, delivering inline"
            );
            self.deliver_to_room(&envelope.message);
            return;
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // Receiver is alive: it is moved into the task below.
        let _ = tx.send(envelope);
        rooms.insert(session_id.clone(), tx);
        runtime.spawn(dispatch_room(
            Arc::downgrade(self),
            self.suspension.clone(),
            session_id,
            rx,
        ));
    }

    fn deliver_to_room(&self, message: &SessionMessage) {
        let members: Vec<Arc<ClientState>> = read(&self.clients)
            .values()
            .filter(|client| client.is_connected() && client.in_session(&message.session_id))
            .cloned()
            .collect();
        for member in members {
            self.deliver(&member, message);
        }
    }

    fn deliver(&self, client: &ClientState, message: &SessionMessage) {
        if client.simulate_errors() {
            let emitted = client.record_emitted();
            if emitted > self.settings.error_threshold
                && self.random.gen_unit() < self.settings.error_probability
            {
                let error = BrokerError::SimulatedTransport {
                    client_id: client.id().to_string(),
                    emitted,
                };
                tracing::debug!(client_id = %client.id(), emitted, "Simulated transport error");
                client.emit(ClientEvent::Error(error.to_string()));
                return;
            }
        }
        client.emit(ClientEvent::Message(message.clone()));
    }

    fn members(&self, session_id: &str) -> Vec<String> {
        read(&self.clients)
            .values()
            .filter(|client| client.is_connected() && client.in_session(session_id))
            .map(|client| client.id().to_string())
            .collect()
    }
}

async fn dispatch_room(
    core: Weak<BrokerCore>,
    suspension: Suspension,
    session_id: String,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = suspension.shutdown_token().cancelled() => break,
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let now = suspension.clock().elapsed();
        if envelope.due > now && suspension.pause(envelope.due - now).await.is_err() {
            break;
        }
        let Some(core) = core.upgrade() else {
            break;
        };
        core.deliver_to_room(&envelope.message);
    }
    tracing::debug!(session_id = %session_id, "Room dispatcher stopped");
}

/// Server-side handle of the broker.
#[derive(Clone)]
pub struct SessionServer {
    core: Arc<BrokerCore>,
}

impl SessionServer {
    pub(crate) fn new(core: Arc<BrokerCore>) -> Self {
        Self { core }
    }

    /// Deliver a message to every connected client that joined `session_id`.
    pub fn broadcast_to_session(
        &self,
        session_id: &str,
        message_type: SessionMessageType,
        data: serde_json::Value,
    ) -> Result<SessionMessage, BrokerError> {
        let now = self.core.suspension.clock().now();
        let message = SessionMessage::new(message_type, session_id, now).with_data(data);
        self.core.publish(message)
    }

    /// Broadcast a prebuilt message to its room.
    pub fn broadcast(&self, message: SessionMessage) -> Result<SessionMessage, BrokerError> {
        self.core.publish(message)
    }

    /// Ids of connected clients currently in the room.
    pub fn session_members(&self, session_id: &str) -> Vec<String> {
        self.core.members(session_id)
    }

    /// Every message broadcast since the last reset, in call order.
    pub fn message_log(&self) -> Vec<SessionMessage> {
        lock(&self.core.log).clone()
    }
}

impl std::fmt::Debug for SessionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServer")
            .field("clients", &self.core.client_count())
            .finish()
    }
}
