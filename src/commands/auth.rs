use serde_json::{json, Value};
use zeroize::Zeroize;

use super::{command_error, require_session};
use crate::events::EVENT_SESSION_EXPIRED;
use crate::{auth, parse_channel_payload, value_str, AppState};

struct Credentials {
    email: String,
    password: String,
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

/// `{email, password}` as one object, or `(email, password)` as two strings.
fn parse_login_payload(arg0: Option<Value>, arg1: Option<Value>) -> Credentials {
    if let (Some(Value::String(email)), Some(Value::String(password))) = (&arg0, &arg1) {
        return Credentials {
            email: email.trim().to_string(),
            password: password.clone(),
        };
    }
    let mut payload = parse_channel_payload(arg0, arg1);
    let email = value_str(&payload, &["email", "username"]).unwrap_or_default();
    // Passwords are taken verbatim; whitespace may be significant.
    let password = match payload.get_mut("password") {
        Some(Value::String(p)) => std::mem::take(p),
        _ => String::new(),
    };
    Credentials { email, password }
}

/// Sign in and open the live order channel.
pub async fn auth_login(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let mut creds = parse_login_payload(arg0, arg1);
    let password = std::mem::take(&mut creds.password);
    let session = auth::login(&state.api, &state.auth, &creds.email, password)
        .await
        .map_err(|e| e.to_string())?;
    state.start_live();
    Ok(session)
}

/// Leave the order view, close the live channel and forget the token.
pub async fn auth_logout(state: &AppState) -> Result<Value, String> {
    state.unmount_board().await;
    state.stop_live().await;
    auth::logout(state.tokens().as_ref(), &state.auth).map_err(|e| command_error(state, e))?;
    state
        .emitter
        .emit(EVENT_SESSION_EXPIRED, json!({ "reason": "logout" }));
    Ok(json!({ "success": true }))
}

pub fn auth_get_session(state: &AppState) -> Result<Value, String> {
    Ok(auth::session_json(state.tokens().as_ref(), &state.auth))
}

pub fn auth_require_session(state: &AppState) -> Result<Value, String> {
    require_session(state)?;
    Ok(json!({ "authenticated": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_token;

    #[test]
    fn parse_login_payload_supports_object_and_tuple() {
        let creds = parse_login_payload(
            Some(json!({ "email": " admin@freshlaa.in ", "password": " pw " })),
            None,
        );
        assert_eq!(creds.email, "admin@freshlaa.in");
        assert_eq!(creds.password, " pw ");

        let creds = parse_login_payload(Some(json!("a@b.c")), Some(json!("secret")));
        assert_eq!(creds.email, "a@b.c");
        assert_eq!(creds.password, "secret");

        let creds = parse_login_payload(None, None);
        assert!(creds.email.is_empty() && creds.password.is_empty());
    }

    #[tokio::test]
    async fn login_without_credentials_is_rejected_inline() {
        let (state, emitter) = state_with_token(None);
        let err = auth_login(&state, Some(json!({ "email": "" })), None)
            .await
            .unwrap_err();
        assert_eq!(err, "Email and password are required");
        assert!(emitter.names().is_empty());
        assert!(!state.live_running());
    }

    #[tokio::test]
    async fn logout_clears_token_and_notifies_host() {
        let (state, emitter) = state_with_token(Some("tok"));
        assert!(state.mount_board());
        auth_logout(&state).await.unwrap();
        assert!(state.tokens().load().is_none());
        assert!(!state.board_mounted());
        let reasons = emitter.payloads(EVENT_SESSION_EXPIRED);
        assert_eq!(reasons.last().unwrap()["reason"], "logout");
    }

    #[test]
    fn require_session_reports_state() {
        let (state, _) = state_with_token(None);
        assert!(auth_require_session(&state).is_err());
        assert_eq!(auth_get_session(&state).unwrap()["authenticated"], false);
    }
}
