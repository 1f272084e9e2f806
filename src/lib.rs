//! Freshlaa Admin - native console core
//!
//! Owns the order board, the admin session and the live order channel, and
//! exposes every console operation as a named command (`auth_login`,
//! `orders_mount`, `order_update_status`, ...). The UI host drives it over
//! the JSON-lines bridge in [`bridge`] and renders whatever it is told.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// App start time for uptime calculation (epoch seconds).
pub(crate) static APP_START_EPOCH: AtomicU64 = AtomicU64::new(0);

pub mod api;
pub mod asset_cache;
pub mod auth;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod menu;
pub mod notifications;
pub mod orders;
pub mod push;
pub mod realtime;
pub mod resources;
pub mod storage;

use crate::api::ApiClient;
use crate::asset_cache::{AssetCache, HttpFetch};
use crate::config::AdminConfig;
use crate::error::AdminResult;
use crate::events::Emitter;
use crate::menu::MenuLoader;
use crate::notifications::{HostNotifier, SessionPrefs, ToastCenter};
use crate::orders::{BoardMount, OrderBoard, OrderListView};
use crate::realtime::{EventHub, LiveHandle};
use crate::resources::HomeLayout;
use crate::storage::TokenStore;

/// Document served as the offline fallback for navigations.
const SHELL_URL_PATH: &str = "/index.html";

// ---------------------------------------------------------------------------
// Payload helpers
// ---------------------------------------------------------------------------

pub(crate) fn parse_channel_payload(arg0: Option<Value>, arg1: Option<Value>) -> Value {
    match (arg0, arg1) {
        (Some(Value::Object(mut obj0)), Some(Value::Object(obj1))) => {
            for (k, v) in obj1 {
                obj0.insert(k, v);
            }
            Value::Object(obj0)
        }
        (Some(v), _) => v,
        (None, Some(v)) => v,
        _ => serde_json::json!({}),
    }
}

pub(crate) fn value_str(v: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

pub(crate) fn value_i64(v: &Value, keys: &[&str]) -> Option<i64> {
    for key in keys {
        let found = v.get(*key).and_then(|x| {
            x.as_i64()
                .or_else(|| x.as_str().and_then(|s| s.trim().parse().ok()))
        });
        if found.is_some() {
            return found;
        }
    }
    None
}

pub(crate) fn value_bool(v: &Value, keys: &[&str]) -> Option<bool> {
    for key in keys {
        match v.get(*key) {
            Some(Value::Bool(b)) => return Some(*b),
            Some(Value::String(s)) => match s.trim() {
                "true" | "1" => return Some(true),
                "false" | "0" => return Some(false),
                _ => {}
            },
            Some(Value::Number(n)) => return Some(n.as_i64().unwrap_or(0) != 0),
            _ => {}
        }
    }
    None
}

/// A bare string argument, or the first non-empty string under `keys`.
pub(crate) fn payload_arg0_as_string(arg0: Option<Value>, keys: &[&str]) -> Option<String> {
    match arg0 {
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        }
        Some(payload @ Value::Object(_)) => value_str(&payload, keys),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// Everything the commands operate on. One per process.
pub struct AppState {
    pub config: AdminConfig,
    pub db: Arc<db::DbState>,
    pub api: ApiClient,
    pub auth: auth::AuthState,
    pub emitter: Arc<dyn Emitter>,
    pub toasts: Arc<ToastCenter>,
    pub prefs: Arc<SessionPrefs>,
    pub hub: EventHub,
    pub board: Arc<OrderBoard>,
    pub menu: MenuLoader,
    pub assets: AssetCache,
    live: Mutex<Option<LiveHandle>>,
    board_mount: Mutex<Option<BoardMount>>,
    home_layout: Mutex<HomeLayout>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    pub fn new(
        config: AdminConfig,
        db: db::DbState,
        tokens: Arc<dyn TokenStore>,
        emitter: Arc<dyn Emitter>,
    ) -> AdminResult<Self> {
        let db = Arc::new(db);
        let api = ApiClient::new(&config.api_url, config.request_timeout, tokens)?;
        let toasts = Arc::new(ToastCenter::new(config.toast_ttl, emitter.clone()));
        let prefs = Arc::new(SessionPrefs::new());
        let board = Arc::new(OrderBoard::new(
            OrderListView::new(config.default_page_size, config.utc_offset),
            Arc::new(api.clone()),
            toasts.clone(),
            prefs.clone(),
            Arc::new(HostNotifier::new(emitter.clone())),
            emitter.clone(),
        ));
        let assets = AssetCache::new(
            db.clone(),
            &config.asset_generation,
            &format!("{}{SHELL_URL_PATH}", config.api_url),
            Arc::new(HttpFetch::new(config.request_timeout)?),
        );
        let menu = MenuLoader::new(Arc::new(api.clone()));

        Ok(Self {
            config,
            db,
            api,
            auth: auth::AuthState::new(),
            emitter,
            toasts,
            prefs,
            hub: EventHub::new(),
            board,
            menu,
            assets,
            live: Mutex::new(None),
            board_mount: Mutex::new(None),
            home_layout: Mutex::new(HomeLayout::default()),
        })
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        self.api.tokens()
    }

    pub fn live_running(&self) -> bool {
        lock(&self.live).as_ref().is_some_and(LiveHandle::is_running)
    }

    /// Start the live channel unless it is already running. Must be called
    /// from within the tokio runtime.
    pub fn start_live(&self) -> bool {
        let mut live = lock(&self.live);
        if live.as_ref().is_some_and(LiveHandle::is_running) {
            return false;
        }
        *live = Some(realtime::start(
            &self.config.socket_url,
            self.tokens().clone(),
            self.hub.clone(),
            self.emitter.clone(),
        ));
        true
    }

    pub async fn stop_live(&self) {
        let handle = lock(&self.live).take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    pub fn board_mounted(&self) -> bool {
        lock(&self.board_mount).is_some()
    }

    /// Enter the order view. Returns `false` when it was already mounted.
    pub fn mount_board(&self) -> bool {
        let mut mount = lock(&self.board_mount);
        if mount.is_some() {
            return false;
        }
        *mount = Some(self.board.mount(&self.hub));
        true
    }

    pub async fn unmount_board(&self) -> bool {
        let mount = lock(&self.board_mount).take();
        match mount {
            Some(mount) => {
                mount.unmount().await;
                true
            }
            None => false,
        }
    }

    pub(crate) fn home_layout(&self) -> MutexGuard<'_, HomeLayout> {
        lock(&self.home_layout)
    }
}

// ============================================================================
// App entry point
// ============================================================================

/// Set up logging, open the local database and serve the host bridge on
/// stdin/stdout until the host closes stdin.
pub fn run() -> AdminResult<()> {
    let epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    APP_START_EPOCH.store(epoch, Ordering::Relaxed);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,freshlaa_admin_lib=debug"));

    // Prune old log files before setting up the appender
    let log_dir = diagnostics::get_log_dir(&config::data_dir_from_env());
    diagnostics::prune_old_logs(&log_dir);
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, diagnostics::LOG_FILE_PREFIX);
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    // stdout carries the bridge protocol
    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Starting Freshlaa Admin v{}", env!("CARGO_PKG_VERSION"));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| error::AdminError::Storage(format!("Failed to start runtime: {e}")))?;

    runtime.block_on(async {
        let mut config = AdminConfig::load();
        let db_state = db::init(&config.data_dir)?;
        db_state.with_conn(|conn| {
            config.apply_local_settings(conn);
            Ok(())
        })?;
        info!(api = %config.api_url, socket = %config.socket_url, "console configured");

        let emitter = Arc::new(events::BroadcastEmitter::new(256));
        let host_events = emitter.subscribe();
        let tokens: Arc<dyn TokenStore> = Arc::from(storage::default_token_store());
        let state = Arc::new(AppState::new(config, db_state, tokens, emitter)?);

        if let Err(e) = state.assets.activate() {
            warn!(error = %e, "asset cache activation failed");
        }

        let served = bridge::serve(state.clone(), host_events).await;
        state.unmount_board().await;
        state.stop_live().await;
        info!("Freshlaa Admin shutting down");
        served.map_err(|e| error::AdminError::Storage(format!("bridge I/O failed: {e}")))
    })
}
