use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use super::command_error;
use crate::asset_cache::{RequestMode, Served, ServedFrom};
use crate::{payload_arg0_as_string, value_str, AppState};

fn parse_urls_payload(arg0: Option<Value>) -> Result<Vec<String>, String> {
    let list = match arg0 {
        Some(Value::Array(list)) => list,
        Some(Value::Object(mut obj)) => match obj.remove("urls") {
            Some(Value::Array(list)) => list,
            _ => return Err("Missing urls list".to_string()),
        },
        None => Vec::new(),
        Some(other) => return Err(format!("Invalid urls payload: {other}")),
    };
    Ok(list
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_serve_payload(
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<(String, RequestMode), String> {
    let mode_raw = match (&arg0, &arg1) {
        (_, Some(Value::String(mode))) => Some(mode.clone()),
        (Some(payload @ Value::Object(_)), _) => value_str(payload, &["mode"]),
        _ => None,
    };
    let url = payload_arg0_as_string(arg0, &["url", "href"])
        .ok_or_else(|| "Missing url".to_string())?;
    let mode = match mode_raw.as_deref() {
        Some("navigate") | Some("navigation") => RequestMode::Navigate,
        Some("asset") | None => RequestMode::Asset,
        Some(other) => return Err(format!("Unknown request mode: {other}")),
    };
    Ok((url, mode))
}

fn served_json(served: &Served) -> Value {
    let source = match served.source {
        ServedFrom::Network => "network",
        ServedFrom::Cache => "cache",
        ServedFrom::Shell => "shell",
    };
    json!({
        "status": served.response.status,
        "contentType": served.response.content_type,
        "body": STANDARD.encode(&served.response.body),
        "source": source,
    })
}

/// Precache the given URLs plus the shell document for this generation.
pub async fn assets_install(state: &AppState, arg0: Option<Value>) -> Result<Value, String> {
    let urls = parse_urls_payload(arg0)?;
    let cached = state
        .assets
        .install(&urls)
        .await
        .map_err(|e| command_error(state, e))?;
    Ok(json!({ "generation": state.assets.generation(), "cached": cached }))
}

pub fn assets_activate(state: &AppState) -> Result<Value, String> {
    let purged = state.assets.activate().map_err(|e| command_error(state, e))?;
    Ok(json!({ "generation": state.assets.generation(), "purged": purged }))
}

/// Body is returned base64-encoded.
pub async fn assets_serve(
    state: &AppState,
    arg0: Option<Value>,
    arg1: Option<Value>,
) -> Result<Value, String> {
    let (url, mode) = parse_serve_payload(arg0, arg1)?;
    let served = state
        .assets
        .serve(&url, mode)
        .await
        .map_err(|e| command_error(state, e))?;
    Ok(served_json(&served))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset_cache::CachedResponse;
    use crate::test_support::state_with_token;

    #[test]
    fn parse_urls_supports_array_and_object() {
        assert_eq!(
            parse_urls_payload(Some(json!(["/app.js", " ", "/app.css"]))).unwrap(),
            vec!["/app.js", "/app.css"]
        );
        assert_eq!(
            parse_urls_payload(Some(json!({ "urls": ["/logo.png"] }))).unwrap(),
            vec!["/logo.png"]
        );
        assert!(parse_urls_payload(None).unwrap().is_empty());
        assert!(parse_urls_payload(Some(json!(3))).is_err());
    }

    #[test]
    fn parse_serve_defaults_to_asset_mode() {
        assert_eq!(
            parse_serve_payload(Some(json!("https://x/app.js")), None).unwrap(),
            ("https://x/app.js".to_string(), RequestMode::Asset)
        );
        assert_eq!(
            parse_serve_payload(Some(json!({ "url": "https://x/", "mode": "navigate" })), None)
                .unwrap()
                .1,
            RequestMode::Navigate
        );
        assert!(parse_serve_payload(Some(json!("https://x/")), Some(json!("prefetch"))).is_err());
    }

    #[test]
    fn served_body_is_base64() {
        let out = served_json(&Served {
            response: CachedResponse {
                status: 200,
                content_type: Some("text/html".into()),
                body: b"<html>".to_vec(),
            },
            source: ServedFrom::Shell,
        });
        assert_eq!(out["body"], "PGh0bWw+");
        assert_eq!(out["source"], "shell");
    }

    #[test]
    fn activate_on_empty_cache_purges_nothing() {
        let (state, _) = state_with_token(None);
        let out = assets_activate(&state).unwrap();
        assert_eq!(out["purged"], 0);
        assert_eq!(out["generation"], "freshlaa-admin-v1");
    }
}
