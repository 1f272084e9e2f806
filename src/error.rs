//! Error type shared across the console core.
//!
//! Command handlers flatten these into user-facing strings; everything
//! below the command layer propagates `AdminError` with `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Cannot reach admin API at {0}")]
    Unreachable(String),

    #[error("Connection to {0} timed out")]
    Timeout(String),

    #[error("{message} (HTTP {status})")]
    Http { status: u16, message: String },

    #[error("Session expired or missing, please sign in again")]
    Unauthorized,

    #[error("Invalid response from admin API: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Live channel error: {0}")]
    Channel(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Order {0} not found")]
    OrderNotFound(String),
}

impl AdminError {
    /// Failures that should send the admin back to the login screen. A 403
    /// is a refusal for this account, not a dead session: the token stays.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AdminError::Unauthorized)
    }

    /// Transport-level failures: the operation is abandoned and prior
    /// state retained.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AdminError::Unreachable(_) | AdminError::Timeout(_) | AdminError::Http { .. }
        )
    }
}

impl From<rusqlite::Error> for AdminError {
    fn from(e: rusqlite::Error) -> Self {
        AdminError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(e: serde_json::Error) -> Self {
        AdminError::InvalidResponse(e.to_string())
    }
}

pub type AdminResult<T> = Result<T, AdminError>;
