//! Diagnostics for the admin console.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **System health**: schema version, database size, asset cache
//!   generations, session and live channel state
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use rusqlite::params;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::db::DbState;
use crate::error::AdminResult;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// Rolling log file prefix (`admin.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "admin";

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "rustVersion": env!("CARGO_PKG_RUST_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// System health
// ---------------------------------------------------------------------------

/// Runtime facts the database cannot tell us.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeHealth {
    pub authenticated: bool,
    pub live_connected: bool,
    pub live_listeners: usize,
}

pub fn get_system_health(db: &DbState, runtime: RuntimeHealth) -> AdminResult<Value> {
    let (schema_version, generations) = db.with_conn(|conn| {
        let schema_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let mut stmt = conn.prepare(
            "SELECT generation, COUNT(*), COALESCE(SUM(LENGTH(body)), 0)
             FROM asset_cache GROUP BY generation ORDER BY generation",
        )?;
        let generations = stmt
            .query_map(params![], |row| {
                Ok(json!({
                    "generation": row.get::<_, String>(0)?,
                    "entries": row.get::<_, i64>(1)?,
                    "bytes": row.get::<_, i64>(2)?,
                }))
            })?
            .collect::<Result<Vec<Value>, _>>()?;
        Ok((schema_version, generations))
    })?;

    let db_size = fs::metadata(&db.db_path).map(|m| m.len()).unwrap_or(0);

    Ok(json!({
        "schemaVersion": schema_version,
        "dbSizeBytes": db_size,
        "assetCache": generations,
        "authenticated": runtime.authenticated,
        "liveChannel": {
            "connected": runtime.live_connected,
            "listeners": runtime.live_listeners,
        },
    }))
}

// ---------------------------------------------------------------------------
// Log rotation
// ---------------------------------------------------------------------------

/// Log directory under the console data directory.
pub fn get_log_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("logs")
}

/// Prune old log files, keeping only the most recent `MAX_LOG_FILES`.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let prefix = format!("{LOG_FILE_PREFIX}.");
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.starts_with(&prefix) {
                        let modified = entry
                            .metadata()
                            .ok()
                            .and_then(|m| m.modified().ok())
                            .unwrap_or(std::time::UNIX_EPOCH);
                        log_files.push((path, modified));
                    }
                }
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}
