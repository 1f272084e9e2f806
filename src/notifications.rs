//! Toasts, session notification preferences, and order alerts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::events::{self, Emitter};

// ---------------------------------------------------------------------------
// Toasts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub id: String,
    pub kind: ToastKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Transient feedback messages with auto-dismiss.
pub struct ToastCenter {
    toasts: Mutex<Vec<Toast>>,
    ttl: ChronoDuration,
    emitter: Arc<dyn Emitter>,
}

impl ToastCenter {
    pub fn new(ttl: Duration, emitter: Arc<dyn Emitter>) -> Self {
        Self {
            toasts: Mutex::new(Vec::new()),
            ttl: ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(3)),
            emitter,
        }
    }

    pub fn push(&self, kind: ToastKind, message: impl Into<String>) -> String {
        self.push_at(kind, message, Utc::now())
    }

    pub fn success(&self, message: impl Into<String>) -> String {
        self.push(ToastKind::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> String {
        self.push(ToastKind::Error, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> String {
        self.push(ToastKind::Warning, message)
    }

    fn push_at(&self, kind: ToastKind, message: impl Into<String>, now: DateTime<Utc>) -> String {
        let toast = Toast {
            id: Uuid::new_v4().to_string(),
            kind,
            message: message.into(),
            created_at: now,
            expires_at: now + self.ttl,
        };
        debug!(kind = ?toast.kind, message = %toast.message, "toast");
        let id = toast.id.clone();
        self.emitter.emit(
            events::EVENT_TOAST,
            serde_json::to_value(&toast).unwrap_or(Value::Null),
        );
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.push(toast);
        }
        id
    }

    /// Toasts still on screen at `now`; expired ones are dropped.
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Toast> {
        match self.toasts.lock() {
            Ok(mut toasts) => {
                toasts.retain(|t| t.expires_at > now);
                toasts.clone()
            }
            Err(_) => Vec::new(),
        }
    }

    pub fn active(&self) -> Vec<Toast> {
        self.active_at(Utc::now())
    }

    /// Returns `false` when the toast already went away.
    pub fn dismiss(&self, id: &str) -> bool {
        match self.toasts.lock() {
            Ok(mut toasts) => {
                let before = toasts.len();
                toasts.retain(|t| t.id != id);
                toasts.len() != before
            }
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Session preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    #[default]
    Default,
    Granted,
    Denied,
}

impl FromStr for NotificationPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" | "prompt" => Ok(Self::Default),
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            other => Err(format!("Unknown notification permission: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrefsSnapshot {
    pub sound_enabled: bool,
    pub permission: NotificationPermission,
}

/// Per-session alert preferences. Sound stays off until the admin turns
/// it on; nothing here is persisted across sessions.
#[derive(Default)]
pub struct SessionPrefs {
    inner: Mutex<PrefsSnapshot>,
}

impl SessionPrefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PrefsSnapshot {
        self.inner.lock().map(|p| *p).unwrap_or_default()
    }

    pub fn set_sound_enabled(&self, enabled: bool) {
        if let Ok(mut p) = self.inner.lock() {
            p.sound_enabled = enabled;
        }
        info!(enabled, "order sound toggled");
    }

    pub fn set_permission(&self, permission: NotificationPermission) {
        if let Ok(mut p) = self.inner.lock() {
            p.permission = permission;
        }
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// Audible and OS-level alerts. The host owns the speaker and the
/// notification center, so implementations usually forward.
pub trait Notifier: Send + Sync {
    fn chime(&self);
    fn show(&self, title: &str, body: &str);
}

/// Forwards alerts to the host as events.
pub struct HostNotifier {
    emitter: Arc<dyn Emitter>,
}

impl HostNotifier {
    pub fn new(emitter: Arc<dyn Emitter>) -> Self {
        Self { emitter }
    }
}

impl Notifier for HostNotifier {
    fn chime(&self) {
        self.emitter.emit(events::EVENT_PLAY_CHIME, Value::Null);
    }

    fn show(&self, title: &str, body: &str) {
        self.emitter.emit(
            events::EVENT_DESKTOP_NOTIFICATION,
            serde_json::json!({ "title": title, "body": body }),
        );
    }
}

/// Announce a freshly placed order according to the session preferences.
/// Returns `(chimed, notified)`.
pub fn announce_new_order(
    prefs: &PrefsSnapshot,
    notifier: &dyn Notifier,
    customer_name: &str,
    total: f64,
) -> (bool, bool) {
    let chimed = prefs.sound_enabled;
    if chimed {
        notifier.chime();
    }
    let notified = prefs.permission == NotificationPermission::Granted;
    if notified {
        let who = if customer_name.trim().is_empty() {
            "a customer"
        } else {
            customer_name.trim()
        };
        notifier.show("New order", &format!("New order from {who} - ₹{total:.2}"));
    }
    (chimed, notified)
}
