//! Web push registration.
//!
//! The host obtains the browser/OS push subscription against the server's
//! VAPID public key; this module checks the preconditions and registers
//! the subscription with the backend. Delivery is the backend's job.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::api::{unwrap_envelope, ApiClient};
use crate::error::{AdminError, AdminResult};
use crate::notifications::{NotificationPermission, PrefsSnapshot};

/// Uncompressed P-256 point: 0x04 || X || Y.
const VAPID_KEY_LEN: usize = 65;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    pub keys: PushKeys,
}

fn decode_b64url(value: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value.trim().trim_end_matches('='))
        .ok()
}

/// Decode and check the configured application server key.
pub fn validate_vapid_key(key: &str) -> AdminResult<Vec<u8>> {
    let bytes = decode_b64url(key)
        .ok_or_else(|| AdminError::Validation("VAPID public key is not base64url".into()))?;
    if bytes.len() != VAPID_KEY_LEN || bytes[0] != 0x04 {
        return Err(AdminError::Validation(format!(
            "VAPID public key must be a {VAPID_KEY_LEN}-byte uncompressed P-256 point"
        )));
    }
    Ok(bytes)
}

impl PushSubscription {
    pub fn validate(&self) -> AdminResult<()> {
        let url = Url::parse(self.endpoint.trim())
            .map_err(|e| AdminError::Validation(format!("Invalid push endpoint: {e}")))?;
        if url.scheme() != "https" {
            return Err(AdminError::Validation(
                "Push endpoint must use https".into(),
            ));
        }
        for (name, value) in [("p256dh", &self.keys.p256dh), ("auth", &self.keys.auth)] {
            match decode_b64url(value) {
                Some(bytes) if !bytes.is_empty() => {}
                _ => {
                    return Err(AdminError::Validation(format!(
                        "Push subscription key {name} is missing or malformed"
                    )))
                }
            }
        }
        Ok(())
    }
}

fn ensure_ready(prefs: &PrefsSnapshot, vapid_key: Option<&str>) -> AdminResult<String> {
    if prefs.permission != NotificationPermission::Granted {
        return Err(AdminError::Validation(
            "Notification permission has not been granted".into(),
        ));
    }
    let key = vapid_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AdminError::Validation("Push notifications are not configured".into()))?;
    validate_vapid_key(key)?;
    Ok(key.to_string())
}

/// What the host needs to create a subscription, or why it cannot.
pub fn readiness(prefs: &PrefsSnapshot, vapid_key: Option<&str>) -> Value {
    match ensure_ready(prefs, vapid_key) {
        Ok(key) => json!({ "ready": true, "applicationServerKey": key }),
        Err(e) => json!({ "ready": false, "reason": e.to_string(), "permission": prefs.permission }),
    }
}

pub async fn register(
    api: &ApiClient,
    prefs: &PrefsSnapshot,
    vapid_key: Option<&str>,
    subscription: &PushSubscription,
) -> AdminResult<Value> {
    ensure_ready(prefs, vapid_key)?;
    subscription.validate()?;
    let body = json!({ "endpoint": subscription.endpoint, "keys": subscription.keys });
    let resp = api.post("/admin/push/subscribe", &body).await?;
    info!("push subscription registered");
    Ok(unwrap_envelope(resp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vapid() -> String {
        let mut point = vec![0x04u8];
        point.extend(std::iter::repeat(7u8).take(64));
        URL_SAFE_NO_PAD.encode(point)
    }

    fn granted() -> PrefsSnapshot {
        PrefsSnapshot {
            sound_enabled: false,
            permission: NotificationPermission::Granted,
        }
    }

    fn subscription(endpoint: &str) -> PushSubscription {
        PushSubscription {
            endpoint: endpoint.into(),
            expiration_time: None,
            keys: PushKeys {
                p256dh: vapid(),
                auth: URL_SAFE_NO_PAD.encode([1u8; 16]),
            },
        }
    }

    #[test]
    fn vapid_key_must_be_uncompressed_point() {
        assert_eq!(validate_vapid_key(&vapid()).unwrap().len(), 65);
        assert!(validate_vapid_key(&URL_SAFE_NO_PAD.encode([4u8; 33])).is_err());
        assert!(validate_vapid_key("***").is_err());
    }

    #[test]
    fn readiness_requires_permission_and_key() {
        let key = vapid();
        assert_eq!(readiness(&granted(), Some(&key))["ready"], true);
        assert_eq!(readiness(&granted(), None)["ready"], false);
        let denied = PrefsSnapshot {
            sound_enabled: true,
            permission: NotificationPermission::Denied,
        };
        let r = readiness(&denied, Some(&key));
        assert_eq!(r["ready"], false);
        assert_eq!(r["permission"], "denied");
    }

    #[test]
    fn subscription_validation() {
        assert!(subscription("https://fcm.googleapis.com/fcm/send/abc").validate().is_ok());
        assert!(subscription("http://push.example/abc").validate().is_err());
        let mut empty_auth = subscription("https://push.example/abc");
        empty_auth.keys.auth.clear();
        assert!(empty_auth.validate().is_err());
    }

    #[test]
    fn subscription_json_shape() {
        let sub: PushSubscription = serde_json::from_value(json!({
            "endpoint": "https://push.example/x",
            "expirationTime": null,
            "keys": { "p256dh": "BAAA", "auth": "AAAA" }
        }))
        .unwrap();
        assert_eq!(sub.keys.auth, "AAAA");
    }
}
