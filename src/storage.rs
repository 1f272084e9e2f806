//! Admin token storage.
//!
//! The bearer token issued at login is kept under the `adminToken` key in
//! the OS credential store (Keychain on macOS, the Windows credential
//! vault, kernel keyutils on Linux). It is read by every outbound request
//! and written only at login/logout.

use keyring::Entry;
use std::sync::Mutex;
use tracing::{info, warn};
use zeroize::Zeroize;

use crate::error::{AdminError, AdminResult};

const SERVICE_NAME: &str = "freshlaa-admin";

/// Credential key the admin token is stored under.
pub const ADMIN_TOKEN_KEY: &str = "adminToken";

/// Where the admin token lives between requests.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn save(&self, token: &str) -> AdminResult<()>;
    fn clear(&self) -> AdminResult<()>;
}

// ---------------------------------------------------------------------------
// OS keyring
// ---------------------------------------------------------------------------

/// Token store backed by the OS keyring.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self) -> AdminResult<Entry> {
        Entry::new(&self.service, ADMIN_TOKEN_KEY).map_err(|e| AdminError::Storage(e.to_string()))
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    /// Returns `None` when the entry does not exist (or the platform
    /// returns a "not found" error).
    fn load(&self) -> Option<String> {
        let entry = match self.entry() {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "keyring: failed to create entry");
                return None;
            }
        };
        match entry.get_password() {
            Ok(token) if !token.trim().is_empty() => Some(token),
            Ok(_) => None,
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "keyring: failed to read admin token");
                None
            }
        }
    }

    fn save(&self, token: &str) -> AdminResult<()> {
        self.entry()?
            .set_password(token)
            .map_err(|e| AdminError::Storage(e.to_string()))?;
        info!("admin token stored");
        Ok(())
    }

    /// Silently succeeds if the entry does not exist.
    fn clear(&self) -> AdminResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AdminError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local token store for headless hosts and tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn save(&self, token: &str) -> AdminResult<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| AdminError::Storage(e.to_string()))?;
        if let Some(old) = guard.as_mut() {
            old.zeroize();
        }
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> AdminResult<()> {
        let mut guard = self
            .token
            .lock()
            .map_err(|e| AdminError::Storage(e.to_string()))?;
        if let Some(mut old) = guard.take() {
            old.zeroize();
        }
        Ok(())
    }
}

/// Pick the token store for this host. `FRESHLAA_TOKEN_STORE=memory`
/// keeps the token out of the OS keyring entirely.
pub fn default_token_store() -> Box<dyn TokenStore> {
    match std::env::var("FRESHLAA_TOKEN_STORE").ok().as_deref() {
        Some("memory") => {
            info!("using in-memory admin token store");
            Box::new(MemoryTokenStore::default())
        }
        _ => Box::new(KeyringTokenStore::new()),
    }
}
