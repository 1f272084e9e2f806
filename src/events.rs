//! Outbound events to the UI host.
//!
//! The core never renders; it tells the host what changed through named
//! events (`toast`, `orders_changed`, `session_expired`, `live_status`,
//! `play_chime`, `desktop_notification`).

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

pub const EVENT_TOAST: &str = "toast";
pub const EVENT_ORDERS_CHANGED: &str = "orders_changed";
pub const EVENT_SESSION_EXPIRED: &str = "session_expired";
pub const EVENT_LIVE_STATUS: &str = "live_status";
pub const EVENT_PLAY_CHIME: &str = "play_chime";
pub const EVENT_DESKTOP_NOTIFICATION: &str = "desktop_notification";

pub trait Emitter: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}

#[derive(Debug, Clone)]
pub struct HostEvent {
    pub name: String,
    pub payload: Value,
}

/// Fans events out to every host listener. Emitting with nobody listening
/// is not an error.
pub struct BroadcastEmitter {
    tx: broadcast::Sender<HostEvent>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.tx.subscribe()
    }
}

impl Emitter for BroadcastEmitter {
    fn emit(&self, event: &str, payload: Value) {
        trace!(event, "emit");
        let _ = self.tx.send(HostEvent {
            name: event.to_string(),
            payload,
        });
    }
}

/// Emitter that keeps everything it was given, for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingEmitter {
    events: std::sync::Mutex<Vec<HostEvent>>,
}

#[cfg(test)]
impl RecordingEmitter {
    pub fn names(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("events lock")
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn payloads(&self, name: &str) -> Vec<Value> {
        self.events
            .lock()
            .expect("events lock")
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.payload.clone())
            .collect()
    }
}

#[cfg(test)]
impl Emitter for RecordingEmitter {
    fn emit(&self, event: &str, payload: Value) {
        self.events.lock().expect("events lock").push(HostEvent {
            name: event.to_string(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let emitter = BroadcastEmitter::new(8);
        let mut rx = emitter.subscribe();
        emitter.emit(EVENT_TOAST, serde_json::json!({ "message": "hi" }));
        let ev = rx.recv().await.expect("event");
        assert_eq!(ev.name, EVENT_TOAST);
        assert_eq!(ev.payload["message"], "hi");
    }

    #[test]
    fn emit_without_listeners_is_fine() {
        BroadcastEmitter::new(1).emit(EVENT_LIVE_STATUS, Value::Null);
    }
}
