//! Console configuration.
//!
//! Values come from `FRESHLAA_*` environment variables with logged
//! defaults, then local overrides stored in the `console` category of
//! `local_settings` are applied on top.

use chrono::{FixedOffset, Offset, Utc};
use rusqlite::Connection;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::db;
use crate::orders::PageSize;

pub const SETTINGS_CATEGORY: &str = "console";

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_ASSET_GENERATION: &str = "freshlaa-admin-v1";

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub api_url: String,
    pub socket_url: String,
    pub vapid_public_key: Option<String>,
    pub data_dir: PathBuf,
    pub default_page_size: PageSize,
    pub toast_ttl: Duration,
    pub request_timeout: Duration,
    /// Offset used for the start/end-of-day boundaries of the date filter.
    pub utc_offset: FixedOffset,
    pub asset_generation: String,
}

impl AdminConfig {
    pub fn load() -> Self {
        let api_url = normalize_base_url(&try_load("FRESHLAA_API_URL", DEFAULT_API_URL.to_string()));
        let socket_url = var("FRESHLAA_SOCKET_URL")
            .map(|s| normalize_base_url(&s))
            .unwrap_or_else(|_| api_url.clone());
        let offset_minutes: i32 = try_load("FRESHLAA_UTC_OFFSET_MINUTES", 0);

        Self {
            api_url,
            socket_url,
            vapid_public_key: var("FRESHLAA_VAPID_PUBLIC_KEY")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            data_dir: data_dir_from_env(),
            default_page_size: try_load("FRESHLAA_PAGE_SIZE", PageSize::Ten),
            toast_ttl: Duration::from_millis(try_load("FRESHLAA_TOAST_MS", 3000)),
            request_timeout: Duration::from_secs(try_load("FRESHLAA_REQUEST_TIMEOUT_SECS", 30)),
            utc_offset: offset_from_minutes(offset_minutes),
            asset_generation: var("FRESHLAA_ASSET_GENERATION")
                .unwrap_or_else(|_| DEFAULT_ASSET_GENERATION.to_string()),
        }
    }

    /// Apply overrides saved in `local_settings`. Invalid values are logged
    /// and ignored.
    pub fn apply_local_settings(&mut self, conn: &Connection) {
        if let Some(url) = db::get_setting(conn, SETTINGS_CATEGORY, "api_url") {
            self.api_url = normalize_base_url(&url);
        }
        if let Some(url) = db::get_setting(conn, SETTINGS_CATEGORY, "socket_url") {
            self.socket_url = normalize_base_url(&url);
        }
        if let Some(raw) = db::get_setting(conn, SETTINGS_CATEGORY, "page_size") {
            match raw.parse::<PageSize>() {
                Ok(size) => self.default_page_size = size,
                Err(e) => warn!("Ignoring stored page_size: {e}"),
            }
        }
        if let Some(raw) = db::get_setting(conn, SETTINGS_CATEGORY, "utc_offset_minutes") {
            match raw.parse::<i32>() {
                Ok(minutes) => self.utc_offset = offset_from_minutes(minutes),
                Err(e) => warn!("Ignoring stored utc_offset_minutes: {e}"),
            }
        }
    }

    /// Default config for tests and in-process hosts.
    pub fn for_base_url(api_url: &str) -> Self {
        let api_url = normalize_base_url(api_url);
        Self {
            socket_url: api_url.clone(),
            api_url,
            vapid_public_key: None,
            data_dir: env::temp_dir().join("freshlaa-admin"),
            default_page_size: PageSize::Ten,
            toast_ttl: Duration::from_millis(3000),
            request_timeout: Duration::from_secs(30),
            utc_offset: Utc.fix(),
            asset_generation: DEFAULT_ASSET_GENERATION.to_string(),
        }
    }
}

/// Normalise a backend URL:
/// - ensure a scheme is present (https, or http for localhost)
/// - strip trailing slashes
/// - strip a trailing `/api` segment
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }
    while url.ends_with('/') {
        url.pop();
    }

    url
}

fn offset_from_minutes(minutes: i32) -> FixedOffset {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt).unwrap_or_else(|| {
        warn!("UTC offset of {minutes} minutes out of range, using UTC");
        Utc.fix()
    })
}

/// `FRESHLAA_DATA_DIR`, or the per-user application data directory.
pub fn data_dir_from_env() -> PathBuf {
    var("FRESHLAA_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_data_dir())
}

fn default_data_dir() -> PathBuf {
    let base = env::var("LOCALAPPDATA")
        .or_else(|_| env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("com.freshlaa.admin")
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| ())
}

fn try_load<T: FromStr + Display>(key: &str, default: T) -> T
where
    T::Err: Display,
{
    let Ok(raw) = var(key) else {
        info!("{key} not set, using default: {default}");
        return default;
    };
    match raw.parse() {
        Ok(v) => v,
        Err(e) => {
            warn!("Invalid {key} value ({e}), using default: {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbState;

    #[test]
    fn normalize_adds_scheme_and_strips_api_suffix() {
        assert_eq!(
            normalize_base_url("api.freshlaa.com/api/"),
            "https://api.freshlaa.com"
        );
        assert_eq!(
            normalize_base_url("localhost:5000/"),
            "http://localhost:5000"
        );
        assert_eq!(
            normalize_base_url(" https://admin.example.com// "),
            "https://admin.example.com"
        );
    }

    #[test]
    fn out_of_range_offsets_fall_back_to_utc() {
        assert_eq!(offset_from_minutes(330).local_minus_utc(), 19_800);
        assert_eq!(offset_from_minutes(-300).local_minus_utc(), -18_000);
        assert_eq!(offset_from_minutes(40_000_000).local_minus_utc(), 0);
        assert_eq!(offset_from_minutes(i32::MIN).local_minus_utc(), 0);
        assert_eq!(offset_from_minutes(1_500).local_minus_utc(), 0);
    }

    #[test]
    #[serial_test::serial]
    fn env_values_and_defaults() {
        env::set_var("FRESHLAA_API_URL", "backend.local/api");
        env::set_var("FRESHLAA_PAGE_SIZE", "25");
        env::set_var("FRESHLAA_TOAST_MS", "not-a-number");
        env::remove_var("FRESHLAA_SOCKET_URL");

        let cfg = AdminConfig::load();
        assert_eq!(cfg.api_url, "https://backend.local");
        assert_eq!(cfg.socket_url, cfg.api_url);
        assert_eq!(cfg.default_page_size, PageSize::TwentyFive);
        assert_eq!(cfg.toast_ttl, Duration::from_millis(3000));

        env::remove_var("FRESHLAA_API_URL");
        env::remove_var("FRESHLAA_PAGE_SIZE");
        env::remove_var("FRESHLAA_TOAST_MS");
    }

    #[test]
    fn local_settings_override_env() {
        let state = DbState::in_memory().expect("db");
        let conn = state.conn.lock().expect("lock");
        db::set_setting(&conn, SETTINGS_CATEGORY, "page_size", "50").expect("set");
        db::set_setting(&conn, SETTINGS_CATEGORY, "api_url", "https://x.test/").expect("set");
        db::set_setting(&conn, SETTINGS_CATEGORY, "utc_offset_minutes", "330").expect("set");

        let mut cfg = AdminConfig::for_base_url("http://localhost:5000");
        cfg.apply_local_settings(&conn);
        assert_eq!(cfg.default_page_size, PageSize::Fifty);
        assert_eq!(cfg.api_url, "https://x.test");
        assert_eq!(cfg.utc_offset.local_minus_utc(), 330 * 60);
    }

    #[test]
    fn bad_stored_page_size_is_ignored() {
        let state = DbState::in_memory().expect("db");
        let conn = state.conn.lock().expect("lock");
        db::set_setting(&conn, SETTINGS_CATEGORY, "page_size", "13").expect("set");

        let mut cfg = AdminConfig::for_base_url("http://localhost:5000");
        cfg.apply_local_settings(&conn);
        assert_eq!(cfg.default_page_size, PageSize::Ten);
    }
}
