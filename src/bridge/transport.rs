//! Page-context transport.
//!
//! The [`PageBus`] is the addressed channel joining clients and relays:
//! outbound messages are routed to the relay registered under their alias,
//! and inbound responses/events are dispatched to the one-shot listener or
//! subscription registered under their correlation id.
//!
//! The registries are guarded by a mutex that is never held across an
//! await, so registration and deregistration are atomic relative to
//! dispatch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use super::protocol::Envelope;

/// Callback invoked with each delivered subscription event.
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle returned when a subscription listener is added; stands in for
/// callback identity when removing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerHandle {
    /// Listener id, carried by delivered events.
    pub id: Uuid,
    /// Extension alias the listener targets.
    pub alias: String,
    /// Dotted event source path.
    pub property: String,
}

/// Emits events for one subscription back into the page context.
#[derive(Clone)]
pub struct EventSink {
    listener_id: Uuid,
    page_tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    /// Creates a sink delivering events under the given listener id.
    #[must_use]
    pub fn new(listener_id: Uuid, page_tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            listener_id,
            page_tx,
        }
    }

    /// Delivers one event payload. Best-effort: a torn-down page side just
    /// drops the event.
    pub fn emit(&self, payload: Value) {
        let _ = self.page_tx.send(Envelope::Event {
            correlation_id: self.listener_id,
            payload,
        });
    }
}

struct Subscription {
    handle: ListenerHandle,
    callback: EventCallback,
}

#[derive(Default)]
struct BusState {
    relays: HashMap<String, mpsc::UnboundedSender<Envelope>>,
    pending: HashMap<Uuid, oneshot::Sender<Envelope>>,
    subscriptions: Vec<Subscription>,
}

/// The page-side message bus.
#[derive(Clone)]
pub struct PageBus {
    state: Arc<Mutex<BusState>>,
    inbound_tx: mpsc::UnboundedSender<Envelope>,
}

impl Default for PageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl PageBus {
    /// Creates a bus and spawns its dispatch task.
    #[must_use]
    pub fn new() -> Self {
        let state: Arc<Mutex<BusState>> = Arc::default();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        let dispatch_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(envelope) = inbound_rx.recv().await {
                Self::dispatch(&dispatch_state, envelope);
            }
        });

        Self { state, inbound_tx }
    }

    fn dispatch(state: &Mutex<BusState>, envelope: Envelope) {
        match envelope {
            Envelope::Response { correlation_id, .. } => {
                // Remove-then-send keeps the settle exactly-once
                let listener = lock(state).pending.remove(&correlation_id);
                match listener {
                    Some(tx) => {
                        let _ = tx.send(envelope);
                    }
                    None => debug!("Unmatched response for {}", correlation_id),
                }
            }
            Envelope::Event {
                correlation_id,
                payload,
            } => {
                let callback = lock(state)
                    .subscriptions
                    .iter()
                    .find(|sub| sub.handle.id == correlation_id)
                    .map(|sub| Arc::clone(&sub.callback));
                match callback {
                    Some(callback) => callback(payload),
                    None => debug!("Event for unknown listener {}", correlation_id),
                }
            }
            other => debug!("Ignoring inbound {:?}", other),
        }
    }

    /// Registers a one-shot response listener for a correlation id. Must
    /// happen before the command is posted so a fast reply cannot race the
    /// registration.
    #[must_use]
    pub fn register_listener(&self, correlation_id: Uuid) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        lock(&self.state).pending.insert(correlation_id, tx);
        rx
    }

    /// Removes a response listener, if still present.
    pub fn remove_listener(&self, correlation_id: Uuid) {
        lock(&self.state).pending.remove(&correlation_id);
    }

    /// Whether a response listener is currently registered.
    #[must_use]
    pub fn has_listener(&self, correlation_id: Uuid) -> bool {
        lock(&self.state).pending.contains_key(&correlation_id)
    }

    /// Connects a relay under an alias. Returns the relay's inbox and the
    /// sender it uses for responses and events.
    pub fn connect_relay(
        &self,
        alias: &str,
    ) -> (
        mpsc::UnboundedReceiver<Envelope>,
        mpsc::UnboundedSender<Envelope>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.state).relays.insert(alias.to_string(), tx);
        (rx, self.inbound_tx.clone())
    }

    /// Disconnects the relay for an alias; its inbox closes and the relay
    /// task drains out.
    pub fn disconnect_relay(&self, alias: &str) {
        lock(&self.state).relays.remove(alias);
    }

    /// Posts a message toward its addressed relay. A message addressed to an
    /// alias with no relay is dropped, like a window message nobody listens
    /// to.
    pub fn post(&self, envelope: Envelope) {
        let Some(alias) = envelope.alias().map(str::to_string) else {
            debug!("Dropping unaddressed outbound {:?}", envelope);
            return;
        };

        let relay = lock(&self.state).relays.get(&alias).cloned();
        match relay {
            Some(tx) => {
                let _ = tx.send(envelope);
            }
            None => debug!("No relay connected for alias {}", alias),
        }
    }

    /// Adds a subscription listener and returns its handle.
    pub fn add_subscription(
        &self,
        alias: &str,
        property: &str,
        callback: EventCallback,
    ) -> ListenerHandle {
        let handle = ListenerHandle {
            id: Uuid::new_v4(),
            alias: alias.to_string(),
            property: property.to_string(),
        };
        lock(&self.state).subscriptions.push(Subscription {
            handle: handle.clone(),
            callback,
        });
        handle
    }

    /// Removes the subscription matching the handle's (id, property, alias)
    /// triple. Returns whether one was removed.
    pub fn remove_subscription(&self, handle: &ListenerHandle) -> bool {
        let mut state = lock(&self.state);
        let before = state.subscriptions.len();
        state.subscriptions.retain(|sub| sub.handle != *handle);
        state.subscriptions.len() != before
    }
}

fn lock(state: &Mutex<BusState>) -> std::sync::MutexGuard<'_, BusState> {
    // The bus never holds its lock across an await, so poisoning can only
    // come from a panicking callback; recover rather than cascade
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
