use serde_json::Value;
use std::sync::atomic::Ordering;

use crate::diagnostics::{self, RuntimeHealth};
use crate::{auth, AppState, APP_START_EPOCH};

pub fn diagnostics_get_about() -> Result<Value, String> {
    Ok(diagnostics::get_about_info())
}

pub fn diagnostics_get_health(state: &AppState) -> Result<Value, String> {
    let runtime = RuntimeHealth {
        authenticated: auth::require_session(state.tokens().as_ref()).is_ok(),
        live_connected: state.live_running(),
        live_listeners: state.hub.listener_count(),
    };
    let mut health = diagnostics::get_system_health(&state.db, runtime).map_err(|e| e.to_string())?;

    let started = APP_START_EPOCH.load(Ordering::Relaxed);
    if started > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(started);
        health["uptimeSeconds"] = Value::from(now.saturating_sub(started));
    }
    Ok(health)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_token;

    #[test]
    fn health_reflects_session() {
        let (state, _) = state_with_token(Some("tok"));
        let health = diagnostics_get_health(&state).unwrap();
        assert_eq!(health["authenticated"], true);
        assert_eq!(health["liveChannel"]["connected"], false);
        assert_eq!(health["schemaVersion"], 2);
    }
}
