//! Admin API client.
//!
//! Provides authenticated HTTP communication with the Freshlaa backend.
//! Every request carries `Authorization: Bearer <adminToken>` when a token
//! is stored; a 401 clears the stored token so the next guard check sends
//! the admin back to the login screen.

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::normalize_base_url;
use crate::error::{AdminError, AdminResult};
use crate::storage::TokenStore;

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly error.
fn friendly_error(url: &str, err: &reqwest::Error) -> AdminError {
    if err.is_timeout() {
        return AdminError::Timeout(url.to_string());
    }
    if err.is_connect() {
        return AdminError::Unreachable(url.to_string());
    }
    if err.is_builder() {
        return AdminError::Validation(format!("Invalid admin API URL: {url}"));
    }
    AdminError::Unreachable(format!("{url} ({err})"))
}

/// Fallback message for an HTTP status when the body carries none.
fn status_message(status: StatusCode) -> String {
    match status.as_u16() {
        403 => "Not allowed for this admin account".to_string(),
        404 => "Admin API endpoint not found".to_string(),
        409 => "Conflicts with the current server state".to_string(),
        s if s >= 500 => "Admin API server error".to_string(),
        _ => "Unexpected response from admin API".to_string(),
    }
}

/// Pull the human-readable message out of an error body. The backend
/// answers `{ message }` or `{ error }`, occasionally with `details`.
fn error_detail(status: StatusCode, body_text: &str) -> String {
    let trimmed = body_text.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => {
            let message = json
                .get("message")
                .or_else(|| json.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status_message(status));
            match json.get("details").or_else(|| json.get("errors")) {
                Some(details) => format!("{message}: {details}"),
                None => message,
            }
        }
        Err(_) if !trimmed.is_empty() && trimmed.len() <= 200 => trimmed.to_string(),
        Err(_) => status_message(status),
    }
}

/// Unwrap the `{ data: X }` envelope most endpoints use. Bare payloads are
/// returned unchanged.
pub fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key("data") => {
            obj.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, tokens: Arc<dyn TokenStore>) -> AdminResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdminError::Validation(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url),
            tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Perform a request against the admin API.
    ///
    /// `path` includes the leading slash, e.g. `/admin/orders`. Returns the
    /// JSON body, or `Value::Null` for empty responses.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> AdminResult<Value> {
        let full_url = format!("{}{path}", self.base_url);
        debug!(method = %method, path, "admin api request");

        let mut req = self.http.request(method.clone(), &full_url);
        if let Some(token) = self.tokens.load() {
            req = req.bearer_auth(token);
        }
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| friendly_error(&self.base_url, &e))?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED {
            warn!(path, "admin api rejected the token, clearing it");
            if let Err(e) = self.tokens.clear() {
                warn!(error = %e, "failed to clear admin token");
            }
            return Err(AdminError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AdminError::Http {
                status: status.as_u16(),
                message: error_detail(status, &body_text),
            });
        }

        if body_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body_text).map_err(|e| AdminError::InvalidResponse(e.to_string()))
    }

    pub async fn get(&self, path: &str) -> AdminResult<Value> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> AdminResult<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> AdminResult<Value> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> AdminResult<Value> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> AdminResult<Value> {
        self.request(Method::DELETE, path, None).await
    }

    /// GET and decode the enveloped payload into `T`.
    pub async fn get_data<T: DeserializeOwned>(&self, path: &str) -> AdminResult<T> {
        let value = unwrap_envelope(self.get(path).await?);
        serde_json::from_value(value)
            .map_err(|e| AdminError::InvalidResponse(format!("{path}: {e}")))
    }
}
