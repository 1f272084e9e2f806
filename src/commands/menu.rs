use serde_json::{json, Value};
use tracing::debug;

use super::{require_session, toast_error};
use crate::error::AdminError;
use crate::{payload_arg0_as_string, AppState};

fn parse_restaurant_payload(arg0: Option<Value>) -> Result<String, String> {
    payload_arg0_as_string(arg0, &["restaurantId", "restaurant_id", "id"])
        .ok_or_else(|| "Missing restaurant id".to_string())
}

/// Load a restaurant's menu. A load overtaken by a newer one, or by leaving
/// the page, answers `{discarded: true}` instead of failing.
pub async fn restaurant_menu_load(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let restaurant_id = parse_restaurant_payload(arg0)?;
    require_session(state)?;
    match state.menu.load(&restaurant_id).await {
        Ok(menu) => serde_json::to_value(menu).map_err(|e| e.to_string()),
        Err(AdminError::Cancelled) => {
            debug!(restaurant_id = %restaurant_id, "menu result discarded");
            Ok(json!({ "discarded": true, "restaurantId": restaurant_id }))
        }
        Err(e) => Err(toast_error(state, "Failed to load menu", e)),
    }
}

pub fn restaurant_menu_get(state: &AppState) -> Result<Value, String> {
    Ok(state
        .menu
        .current()
        .and_then(|menu| serde_json::to_value(menu).ok())
        .unwrap_or(Value::Null))
}

pub fn restaurant_menu_mount(state: &AppState) -> Result<Value, String> {
    state.menu.mount();
    Ok(json!({ "mounted": true }))
}

pub fn restaurant_menu_unmount(state: &AppState) -> Result<Value, String> {
    state.menu.unmount();
    Ok(json!({ "mounted": false }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_token;

    #[test]
    fn parse_restaurant_payload_supports_string_and_object() {
        assert_eq!(parse_restaurant_payload(Some(json!("r1"))), Ok("r1".to_string()));
        assert_eq!(
            parse_restaurant_payload(Some(json!({ "restaurantId": "r2" }))),
            Ok("r2".to_string())
        );
        assert!(parse_restaurant_payload(None).is_err());
    }

    #[tokio::test]
    async fn load_after_leaving_page_is_discarded() {
        let (state, emitter) = state_with_token(Some("tok"));
        restaurant_menu_unmount(&state).unwrap();
        let out = restaurant_menu_load(&state, Some(json!("r1"))).await.unwrap();
        assert_eq!(out["discarded"], true);
        assert_eq!(restaurant_menu_get(&state).unwrap(), Value::Null);
        assert!(emitter.names().is_empty());
    }
}
