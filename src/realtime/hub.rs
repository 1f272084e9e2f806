//! Fan-out of live events to scoped subscribers.
//!
//! A view subscribes when it is entered and holds the returned
//! `Subscription`; dropping the guard deregisters the listener, so a view
//! that exits (on any path) never receives or double-handles events.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use crate::orders::StatusChange;

/// Events delivered by the live channel, in receipt order.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// `new-order`: summary of a freshly created order.
    NewOrder(Value),
    /// `order-updated`: `{orderId, status}`.
    OrderUpdated(StatusChange),
    Connected,
    /// Connection re-established after a drop; state may be stale.
    Reconnected,
    Disconnected,
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    listeners: HashMap<u64, mpsc::UnboundedSender<LiveEvent>>,
}

#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = match self.inner.lock() {
            Ok(mut inner) => {
                inner.next_id += 1;
                let id = inner.next_id;
                inner.listeners.insert(id, tx);
                id
            }
            Err(_) => 0,
        };
        debug!(subscription = id, "live listener registered");
        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every listener. Returns how many received it.
    pub fn publish(&self, event: LiveEvent) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        inner
            .listeners
            .retain(|_, tx| tx.send(event.clone()).is_ok());
        inner.listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().map(|i| i.listeners.len()).unwrap_or(0)
    }
}

/// Registered listener. Deregisters itself on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<LiveEvent>,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LiveEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if let Ok(mut inner) = hub.lock() {
                inner.listeners.remove(&self.id);
            }
        }
        debug!(subscription = self.id, "live listener removed");
    }
}
