use serde_json::Value;

use super::{require_session, toast_error};
use crate::push::{self, PushSubscription};
use crate::AppState;

pub fn push_get_status(state: &AppState) -> Result<Value, String> {
    Ok(push::readiness(
        &state.prefs.snapshot(),
        state.config.vapid_public_key.as_deref(),
    ))
}

/// `{subscription: {...}}` or the subscription object itself.
fn parse_subscription_payload(arg0: Option<Value>) -> Result<PushSubscription, String> {
    let raw = match arg0 {
        Some(Value::Object(mut obj)) => match obj.remove("subscription") {
            Some(inner) => inner,
            None => Value::Object(obj),
        },
        Some(Value::String(s)) => serde_json::from_str(&s).map_err(|e| e.to_string())?,
        _ => return Err("Missing push subscription".to_string()),
    };
    serde_json::from_value(raw).map_err(|e| format!("Invalid push subscription: {e}"))
}

pub async fn push_subscribe(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let subscription = parse_subscription_payload(arg0)?;
    require_session(state)?;
    let registered = push::register(
        &state.api,
        &state.prefs.snapshot(),
        state.config.vapid_public_key.as_deref(),
        &subscription,
    )
    .await
    .map_err(|e| toast_error(state, "Push registration failed", e))?;
    state.toasts.success("Push notifications enabled");
    Ok(registered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_subscription_supports_wrapped_and_bare() {
        let sub = json!({
            "endpoint": "https://push.example.com/send/abc",
            "expirationTime": null,
            "keys": { "p256dh": "BAAA", "auth": "AAAA" },
        });
        let bare = parse_subscription_payload(Some(sub.clone())).unwrap();
        let wrapped = parse_subscription_payload(Some(json!({ "subscription": sub }))).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare.keys.auth, "AAAA");
        assert!(parse_subscription_payload(Some(json!({ "endpoint": "x" }))).is_err());
        assert!(parse_subscription_payload(None).is_err());
    }

    #[test]
    fn status_reports_missing_configuration() {
        let (state, _) = crate::test_support::state_with_token(None);
        let status = push_get_status(&state).unwrap();
        assert_eq!(status["ready"], false);
        assert_eq!(status["permission"], "default");
    }
}
