//! Typed publish/subscribe for client lifecycle events.

use crate::error::ClientError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Lifecycle events emitted by the client and its connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connecting,
    Connected,
    Disconnected,
    Error(ClientError),
    CircuitBreakerTrip { service_name: String },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::Connecting => EventKind::Connecting,
            ClientEvent::Connected => EventKind::Connected,
            ClientEvent::Disconnected => EventKind::Disconnected,
            ClientEvent::Error(_) => EventKind::Error,
            ClientEvent::CircuitBreakerTrip { .. } => EventKind::CircuitBreakerTrip,
        }
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::Connecting => write!(f, "connecting"),
            ClientEvent::Connected => write!(f, "connected"),
            ClientEvent::Disconnected => write!(f, "disconnected"),
            ClientEvent::Error(err) => write!(f, "error({})", err),
            ClientEvent::CircuitBreakerTrip { service_name } => {
                write!(f, "circuitBreakerTrip({})", service_name)
            }
        }
    }
}

/// Event names a handler can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connecting,
    Connected,
    Disconnected,
    Error,
    CircuitBreakerTrip,
}

type Handler = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

struct Listener {
    id: u64,
    kind: EventKind,
    handler: Handler,
}

/// Handle returned by `subscribe`; pass back to `unsubscribe` to detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
}

/// Handler lists per event name. Emission is synchronous and in subscription
/// order; handlers run outside the registry lock so they may re-subscribe.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ClientEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Listener { id, kind, handler: Arc::new(handler) });
        Subscription { id }
    }

    /// Detach one listener; returns whether it was still registered.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != subscription.id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &ClientEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = self
            .lock()
            .iter()
            .filter(|listener| listener.kind == kind)
            .map(|listener| listener.handler.clone())
            .collect();
        for handler in handlers {
            handler(event);
        }
    }

    /// Detach every listener. Called on client close.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Listener>> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus").field("listeners", &self.listener_count()).finish()
    }
}
