use serde_json::{json, Value};
use tracing::info;

use super::command_error;
use crate::config::{normalize_base_url, SETTINGS_CATEGORY};
use crate::notifications::NotificationPermission;
use crate::orders::PageSize;
use crate::{db, payload_arg0_as_string, value_bool, value_str, AppState};

// ---------------------------------------------------------------------------
// Notifications and toasts
// ---------------------------------------------------------------------------

pub fn notifications_get_prefs(state: &AppState) -> Result<Value, String> {
    serde_json::to_value(state.prefs.snapshot()).map_err(|e| e.to_string())
}

fn parse_sound_payload(arg0: Option<Value>) -> Result<bool, String> {
    match arg0 {
        Some(Value::Bool(enabled)) => Ok(enabled),
        Some(payload @ Value::Object(_)) => value_bool(&payload, &["enabled", "soundEnabled", "value"])
            .ok_or_else(|| "Missing enabled flag".to_string()),
        Some(other) => value_bool(&json!({ "v": other }), &["v"])
            .ok_or_else(|| "Missing enabled flag".to_string()),
        None => Err("Missing enabled flag".to_string()),
    }
}

pub fn notifications_set_sound(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let enabled = parse_sound_payload(arg0)?;
    state.prefs.set_sound_enabled(enabled);
    notifications_get_prefs(state)
}

/// The host reports the OS notification permission after asking for it.
pub fn notifications_set_permission(
    state: &AppState,
    arg0: Option<Value>,
) -> Result<Value, String> {
    let permission: NotificationPermission =
        payload_arg0_as_string(arg0, &["permission", "value"])
            .ok_or_else(|| "Missing permission".to_string())?
            .parse()?;
    state.prefs.set_permission(permission);
    notifications_get_prefs(state)
}

pub fn toasts_list(state: &AppState) -> Result<Value, String> {
    serde_json::to_value(state.toasts.active()).map_err(|e| e.to_string())
}

pub fn toast_dismiss(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let id = payload_arg0_as_string(arg0, &["id", "toastId"])
        .ok_or_else(|| "Missing toast id".to_string())?;
    Ok(json!({ "dismissed": state.toasts.dismiss(&id) }))
}

// ---------------------------------------------------------------------------
// Local console settings
// ---------------------------------------------------------------------------

/// Keys the console reads from `local_settings` at startup.
const LOCAL_SETTING_KEYS: [&str; 4] = ["api_url", "socket_url", "page_size", "utc_offset_minutes"];

fn normalize_setting(key: &str, value: &Value) -> Result<String, String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => return Err(format!("Invalid value for {key}: {other}")),
    };
    if raw.is_empty() {
        return Err(format!("Missing value for {key}"));
    }
    match key {
        "api_url" | "socket_url" => Ok(normalize_base_url(&raw)),
        "page_size" => raw
            .parse::<PageSize>()
            .map(|size| size.to_string())
            .map_err(|e| e.to_string()),
        "utc_offset_minutes" => match raw.parse::<i32>() {
            Ok(minutes) if (-14 * 60..=14 * 60).contains(&minutes) => Ok(minutes.to_string()),
            _ => Err(format!("utc_offset_minutes must be between -840 and 840 (got {raw})")),
        },
        other => Err(format!("Unknown console setting: {other}")),
    }
}

fn parse_setting_payload(
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<(String, Value), String> {
    let (key, value) = match (arg0, arg1) {
        (Some(Value::String(key)), value) => (Some(key.trim().to_string()), value),
        (Some(payload @ Value::Object(_)), value) => (
            value_str(&payload, &["key", "settingKey"]),
            value.or_else(|| payload.get("value").cloned()),
        ),
        _ => (None, None),
    };
    let key = key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| "Missing setting key".to_string())?;
    if !LOCAL_SETTING_KEYS.contains(&key.as_str()) {
        return Err(format!("Unknown console setting: {key}"));
    }
    Ok((key, value.unwrap_or(Value::Null)))
}

pub fn settings_get_local(state: &AppState) -> Result<Value, String> {
    state
        .db
        .with_conn(|conn| Ok(db::get_category_settings(conn, SETTINGS_CATEGORY)))
        .map_err(|e| command_error(state, e))
}

/// Persist a console override. It applies from the next start.
pub fn settings_set_local(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (key, value) = parse_setting_payload(arg0, arg1)?;
    let normalized = normalize_setting(&key, &value)?;
    state
        .db
        .with_conn(|conn| db::set_setting(conn, SETTINGS_CATEGORY, &key, &normalized))
        .map_err(|e| command_error(state, e))?;
    info!(key = %key, "console setting saved");
    state
        .toasts
        .warning(format!("Saved {key}; restart the console to apply it"));
    Ok(json!({ "key": key, "value": normalized, "restartRequired": true }))
}

pub fn settings_delete_local(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let (key, _) = parse_setting_payload(arg0, None)?;
    state
        .db
        .with_conn(|conn| db::delete_setting(conn, SETTINGS_CATEGORY, &key))
        .map_err(|e| command_error(state, e))?;
    Ok(json!({ "key": key, "restartRequired": true }))
}
