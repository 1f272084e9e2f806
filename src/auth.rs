//! Admin authentication and the route guard.
//!
//! Login exchanges email/password for a bearer token, which is persisted
//! in the token store under `adminToken`. The guard (`require_session`)
//! rejects missing tokens and JWTs whose `exp` claim has passed; the host
//! routes back to the login screen on that error.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Mutex;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::api::{unwrap_envelope, ApiClient};
use crate::error::{AdminError, AdminResult};
use crate::storage::TokenStore;

/// Who is signed in for this process. The token itself stays in the token
/// store; this only remembers what the login response told us.
#[derive(Clone, Debug)]
struct AdminSession {
    email: String,
    login_time: DateTime<Utc>,
}

#[derive(Default)]
pub struct AuthState {
    session: Mutex<Option<AdminSession>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, session: Option<AdminSession>) {
        if let Ok(mut guard) = self.session.lock() {
            *guard = session;
        }
    }

    fn current(&self) -> Option<AdminSession> {
        self.session.lock().ok().and_then(|s| s.clone())
    }
}

// ---------------------------------------------------------------------------
// Token inspection
// ---------------------------------------------------------------------------

/// Expiry of a JWT, read from the unverified `exp` claim. Opaque tokens
/// return `None` and are trusted until the backend rejects them.
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    token_expiry(token).map(|exp| exp <= now).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Route guard: returns the current token, or `Unauthorized` when it is
/// missing or expired. An expired token is cleared on the way out.
pub fn require_session(tokens: &dyn TokenStore) -> AdminResult<String> {
    let token = tokens.load().ok_or(AdminError::Unauthorized)?;
    if is_expired(&token, Utc::now()) {
        info!("admin token expired, clearing session");
        if let Err(e) = tokens.clear() {
            warn!(error = %e, "failed to clear expired admin token");
        }
        return Err(AdminError::Unauthorized);
    }
    Ok(token)
}

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

/// `POST /admin/login {email, password} -> {token}`.
pub async fn login(
    api: &ApiClient,
    auth: &AuthState,
    email: &str,
    mut password: String,
) -> AdminResult<Value> {
    let email = email.trim().to_string();
    if email.is_empty() || password.is_empty() {
        password.zeroize();
        return Err(AdminError::Validation(
            "Email and password are required".into(),
        ));
    }

    let mut body = serde_json::json!({ "email": email, "password": password });
    password.zeroize();
    let result = api.post("/admin/login", &body).await;
    if let Some(Value::String(p)) = body.get_mut("password") {
        p.zeroize();
    }

    let resp = match result {
        Ok(v) => unwrap_envelope(v),
        Err(AdminError::Unauthorized) => {
            warn!(email = %email, "login rejected");
            return Err(AdminError::Validation("Invalid email or password".into()));
        }
        Err(e) => return Err(e),
    };

    let token = resp
        .get("token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AdminError::InvalidResponse("login response has no token".into()))?;

    api.tokens().save(token)?;
    auth.set(Some(AdminSession {
        email: email.clone(),
        login_time: Utc::now(),
    }));
    info!(email = %email, "admin login successful");

    Ok(session_json(api.tokens().as_ref(), auth))
}

/// Drop the stored token and the in-process session.
pub fn logout(tokens: &dyn TokenStore, auth: &AuthState) -> AdminResult<()> {
    tokens.clear()?;
    if let Some(session) = auth.current() {
        info!(email = %session.email, "admin logged out");
    }
    auth.set(None);
    Ok(())
}

/// Session summary for the host: `{ authenticated, email?, loginTime?, expiresAt? }`.
pub fn session_json(tokens: &dyn TokenStore, auth: &AuthState) -> Value {
    let token = match tokens.load() {
        Some(t) if !is_expired(&t, Utc::now()) => t,
        _ => return serde_json::json!({ "authenticated": false }),
    };
    let session = auth.current();
    serde_json::json!({
        "authenticated": true,
        "email": session.as_ref().map(|s| s.email.clone()),
        "loginTime": session.as_ref().map(|s| s.login_time.to_rfc3339()),
        "expiresAt": token_expiry(&token).map(|t| t.to_rfc3339()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryTokenStore;

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let claims = URL_SAFE_NO_PAD.encode(format!(r#"{{"id":"adm1","exp":{exp}}}"#));
        format!("{header}.{claims}.signature")
    }

    #[test]
    fn guard_rejects_missing_token() {
        let store = MemoryTokenStore::default();
        assert!(matches!(
            require_session(&store),
            Err(AdminError::Unauthorized)
        ));
    }

    #[test]
    fn guard_accepts_opaque_and_live_tokens() {
        let store = MemoryTokenStore::with_token("opaque-token");
        assert_eq!(require_session(&store).expect("opaque ok"), "opaque-token");

        let live = jwt_with_exp(Utc::now().timestamp() + 3600);
        let store = MemoryTokenStore::with_token(&live);
        assert_eq!(require_session(&store).expect("live ok"), live);
    }

    #[test]
    fn guard_clears_expired_jwt() {
        let expired = jwt_with_exp(Utc::now().timestamp() - 10);
        let store = MemoryTokenStore::with_token(&expired);
        assert!(matches!(
            require_session(&store),
            Err(AdminError::Unauthorized)
        ));
        assert!(store.load().is_none(), "expired token should be cleared");
    }

    #[test]
    fn token_expiry_reads_exp_claim() {
        let token = jwt_with_exp(1_700_000_000);
        assert_eq!(
            token_expiry(&token).map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
        assert!(token_expiry("not-a-jwt").is_none());
    }

    #[test]
    fn logout_clears_token_and_session_summary() {
        let store = MemoryTokenStore::with_token("tok");
        let auth = AuthState::new();
        assert_eq!(session_json(&store, &auth)["authenticated"], true);

        logout(&store, &auth).expect("logout");
        assert_eq!(session_json(&store, &auth)["authenticated"], false);
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let store: std::sync::Arc<dyn TokenStore> = std::sync::Arc::new(MemoryTokenStore::default());
        let api = ApiClient::new(
            "http://127.0.0.1:9",
            std::time::Duration::from_secs(1),
            store,
        )
        .expect("client");
        let err = login(&api, &AuthState::new(), "  ", "secret".into())
            .await
            .expect_err("missing email");
        assert!(matches!(err, AdminError::Validation(_)));
    }
}
