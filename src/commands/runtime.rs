use serde_json::{json, Value};
use tracing::info;

use super::require_session;
use crate::AppState;

fn live_status(state: &AppState) -> Value {
    json!({
        "running": state.live_running(),
        "listeners": state.hub.listener_count(),
        "socketUrl": state.config.socket_url,
    })
}

pub fn live_start(state: &AppState) -> Result<Value, String> {
    require_session(state)?;
    if state.start_live() {
        info!("live channel started on request");
    }
    Ok(live_status(state))
}

pub async fn live_stop(state: &AppState) -> Result<Value, String> {
    state.stop_live().await;
    Ok(live_status(state))
}

pub fn live_get_status(state: &AppState) -> Result<Value, String> {
    Ok(live_status(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_token;

    #[tokio::test]
    async fn live_channel_needs_a_session() {
        let (state, _) = state_with_token(None);
        assert!(live_start(&state).is_err());
        assert_eq!(live_get_status(&state).unwrap()["running"], false);
    }

    #[tokio::test]
    async fn live_start_and_stop() {
        let (state, _) = state_with_token(Some("tok"));
        assert_eq!(live_start(&state).unwrap()["running"], true);
        assert_eq!(live_stop(&state).await.unwrap()["running"], false);
    }
}
