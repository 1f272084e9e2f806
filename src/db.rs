//! Local SQLite database layer for the admin console.
//!
//! Uses rusqlite with WAL mode. Holds console-level settings overrides and
//! the offline asset cache. Provides schema migrations and settings
//! helpers shared across commands.

use rusqlite::{params, Connection};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{AdminError, AdminResult};

/// Shared state holding the database connection.
pub struct DbState {
    pub conn: Mutex<Connection>,
    pub db_path: PathBuf,
}

impl DbState {
    /// In-memory database with all migrations applied. Used by headless
    /// hosts that do not want anything on disk, and by tests.
    pub fn in_memory() -> AdminResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Run `f` with the locked connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> AdminResult<T>) -> AdminResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AdminError::Storage(format!("db lock poisoned: {e}")))?;
        f(&*conn)
    }
}

/// Current schema version. Bump when adding new migrations.
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Initialize the database at `{data_dir}/admin.db`.
///
/// Creates the directory if needed, opens the connection, sets pragmas,
/// and runs any pending migrations. On corruption or open failure,
/// deletes the file and retries once. Nothing in here is authoritative:
/// the backend owns all business data.
pub fn init(data_dir: &Path) -> AdminResult<DbState> {
    fs::create_dir_all(data_dir)
        .map_err(|e| AdminError::Storage(format!("Failed to create data dir: {e}")))?;

    let db_path = data_dir.join("admin.db");
    info!("Opening database at {}", db_path.display());

    let conn = match open_and_configure(&db_path) {
        Ok(c) => c,
        Err(first_err) => {
            warn!(
                "Database open failed ({}), deleting and retrying once",
                first_err
            );
            if db_path.exists() {
                let _ = fs::remove_file(&db_path);
                let _ = fs::remove_file(db_path.with_extension("db-wal"));
                let _ = fs::remove_file(db_path.with_extension("db-shm"));
            }
            open_and_configure(&db_path).map_err(|e| {
                AdminError::Storage(format!("Database open failed after retry: {e}"))
            })?
        }
    };

    run_migrations(&conn)?;

    info!("Database initialized (schema v{CURRENT_SCHEMA_VERSION})");

    Ok(DbState {
        conn: Mutex::new(conn),
        db_path,
    })
}

/// Open the database file and apply pragmas.
fn open_and_configure(path: &Path) -> AdminResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(conn)
}

/// Run all pending migrations up to `CURRENT_SCHEMA_VERSION`.
fn run_migrations(conn: &Connection) -> AdminResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT DEFAULT (datetime('now'))
        );",
    )?;

    let current: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current >= CURRENT_SCHEMA_VERSION {
        info!("Database schema up to date (v{current})");
        return Ok(());
    }

    info!("Migrating database from v{current} to v{CURRENT_SCHEMA_VERSION}");

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }
    Ok(())
}

/// v1: console settings overrides.
fn migrate_v1(conn: &Connection) -> AdminResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_settings (
            setting_category TEXT NOT NULL,
            setting_key TEXT NOT NULL,
            setting_value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (setting_category, setting_key)
        );

        INSERT INTO schema_version (version) VALUES (1);
        ",
    )
    .map_err(|e| {
        error!("Migration v1 failed: {e}");
        AdminError::Storage(format!("migration v1: {e}"))
    })?;

    info!("Applied migration v1 (local_settings)");
    Ok(())
}

/// v2: offline asset cache, one row per (generation, url).
fn migrate_v2(conn: &Connection) -> AdminResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS asset_cache (
            generation TEXT NOT NULL,
            url TEXT NOT NULL,
            status INTEGER NOT NULL,
            content_type TEXT,
            body BLOB NOT NULL,
            cached_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (generation, url)
        );

        INSERT INTO schema_version (version) VALUES (2);
        ",
    )
    .map_err(|e| {
        error!("Migration v2 failed: {e}");
        AdminError::Storage(format!("migration v2: {e}"))
    })?;

    info!("Applied migration v2 (asset_cache)");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings helpers
// ---------------------------------------------------------------------------

/// Get a single setting value.
pub fn get_setting(conn: &Connection, category: &str, key: &str) -> Option<String> {
    conn.query_row(
        "SELECT setting_value FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
        |row| row.get(0),
    )
    .ok()
}

/// Insert or update a setting.
pub fn set_setting(conn: &Connection, category: &str, key: &str, value: &str) -> AdminResult<()> {
    conn.execute(
        "INSERT INTO local_settings (setting_category, setting_key, setting_value, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(setting_category, setting_key) DO UPDATE SET
            setting_value = excluded.setting_value,
            updated_at = excluded.updated_at",
        params![category, key, value],
    )?;
    Ok(())
}

/// Get all settings of one category as a flat JSON object.
pub fn get_category_settings(conn: &Connection, category: &str) -> serde_json::Value {
    let mut stmt = match conn.prepare(
        "SELECT setting_key, setting_value FROM local_settings
         WHERE setting_category = ?1 ORDER BY setting_key",
    ) {
        Ok(s) => s,
        Err(e) => {
            error!("get_category_settings prepare: {e}");
            return serde_json::json!({});
        }
    };

    let rows = match stmt.query_map(params![category], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    }) {
        Ok(r) => r,
        Err(e) => {
            error!("get_category_settings query: {e}");
            return serde_json::json!({});
        }
    };

    let map: serde_json::Map<String, serde_json::Value> = rows
        .flatten()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    serde_json::Value::Object(map)
}

/// Delete a single setting. Silently succeeds when it does not exist.
pub fn delete_setting(conn: &Connection, category: &str, key: &str) -> AdminResult<()> {
    conn.execute(
        "DELETE FROM local_settings WHERE setting_category = ?1 AND setting_key = ?2",
        params![category, key],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("prepare table list");
        stmt.query_map([], |row| row.get(0))
            .expect("query tables")
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrations_v1_to_latest() {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        run_migrations(&conn).expect("run_migrations should succeed");

        let tables = table_names(&conn);
        assert!(tables.contains(&"local_settings".to_string()));
        assert!(tables.contains(&"asset_cache".to_string()));

        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })
            .expect("schema version");
        assert_eq!(version, CURRENT_SCHEMA_VERSION);

        // Running again is a no-op
        run_migrations(&conn).expect("second run is idempotent");
    }

    #[test]
    fn test_settings_crud() {
        let state = DbState::in_memory().expect("db");
        let conn = state.conn.lock().expect("db lock");

        set_setting(&conn, "console", "page_size", "25").expect("set");
        assert_eq!(
            get_setting(&conn, "console", "page_size"),
            Some("25".to_string())
        );

        set_setting(&conn, "console", "page_size", "50").expect("update");
        assert_eq!(
            get_setting(&conn, "console", "page_size"),
            Some("50".to_string())
        );

        let all = get_category_settings(&conn, "console");
        assert_eq!(all["page_size"], "50");

        delete_setting(&conn, "console", "page_size").expect("delete");
        assert!(get_setting(&conn, "console", "page_size").is_none());
    }
}
