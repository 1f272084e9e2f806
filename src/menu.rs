//! Restaurant menu loader for the restaurant detail page.
//!
//! Switching restaurants quickly must never show the wrong menu: starting a
//! load cancels the one in flight, and a result that arrives after a newer
//! load started (or after the page was left) is dropped without being
//! written.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{unwrap_envelope, ApiClient};
use crate::error::{AdminError, AdminResult};

#[async_trait]
pub trait MenuSource: Send + Sync {
    async fn fetch_menu(&self, restaurant_id: &str) -> AdminResult<Value>;
}

#[async_trait]
impl MenuSource for ApiClient {
    async fn fetch_menu(&self, restaurant_id: &str) -> AdminResult<Value> {
        let id = restaurant_id.trim();
        if id.is_empty() || id.contains('/') || id.contains('?') {
            return Err(AdminError::Validation(format!(
                "Invalid restaurant id: {restaurant_id:?}"
            )));
        }
        self.get(&format!("/admin/restaurants/{id}/menu")).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantMenu {
    pub restaurant_id: String,
    pub categories: Vec<Value>,
    pub items: Vec<Value>,
    /// Content digest; unchanged menus keep the same version.
    pub version: String,
}

fn section(data: &Value, keys: &[&str]) -> Vec<Value> {
    keys.iter()
        .find_map(|k| data.get(*k).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

fn digest(categories: &[Value], items: &[Value]) -> String {
    let snapshot = serde_json::json!({ "categories": categories, "items": items });
    let serialized = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
    let mut hasher = DefaultHasher::new();
    serialized.hash(&mut hasher);
    format!("digest:{:016x}", hasher.finish())
}

/// Accepts a bare item list or `{categories, items|products|menu}`, with or
/// without the `data` envelope.
pub fn decode_menu(restaurant_id: &str, raw: Value) -> AdminResult<RestaurantMenu> {
    let data = unwrap_envelope(raw);
    let (categories, items) = match &data {
        Value::Array(items) => (Vec::new(), items.clone()),
        Value::Object(_) => (
            section(&data, &["categories"]),
            section(&data, &["items", "products", "menu"]),
        ),
        Value::Null => (Vec::new(), Vec::new()),
        _ => {
            return Err(AdminError::InvalidResponse(
                "menu payload is neither a list nor an object".into(),
            ))
        }
    };
    let version = digest(&categories, &items);
    Ok(RestaurantMenu {
        restaurant_id: restaurant_id.to_string(),
        categories,
        items,
        version,
    })
}

#[derive(Default)]
struct LoaderState {
    generation: u64,
    in_flight: Option<CancellationToken>,
    mounted: bool,
    current: Option<RestaurantMenu>,
}

pub struct MenuLoader {
    source: Arc<dyn MenuSource>,
    state: Mutex<LoaderState>,
}

impl MenuLoader {
    /// A loader starts mounted.
    pub fn new(source: Arc<dyn MenuSource>) -> Self {
        Self {
            source,
            state: Mutex::new(LoaderState {
                mounted: true,
                ..LoaderState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mount(&self) {
        self.state().mounted = true;
    }

    /// Leave the page: cancel the in-flight load and forget the menu.
    pub fn unmount(&self) {
        let mut state = self.state();
        state.mounted = false;
        state.generation += 1;
        state.current = None;
        if let Some(token) = state.in_flight.take() {
            token.cancel();
        }
    }

    pub fn current(&self) -> Option<RestaurantMenu> {
        self.state().current.clone()
    }

    /// Load `restaurant_id`'s menu. Fails with `Cancelled` when superseded
    /// or unmounted before the response arrives.
    pub async fn load(&self, restaurant_id: &str) -> AdminResult<RestaurantMenu> {
        let (generation, token) = {
            let mut state = self.state();
            if !state.mounted {
                return Err(AdminError::Cancelled);
            }
            if let Some(previous) = state.in_flight.take() {
                previous.cancel();
            }
            state.generation += 1;
            let token = CancellationToken::new();
            state.in_flight = Some(token.clone());
            (state.generation, token)
        };

        let raw = tokio::select! {
            _ = token.cancelled() => {
                debug!(restaurant_id, "menu load cancelled");
                return Err(AdminError::Cancelled);
            }
            raw = self.source.fetch_menu(restaurant_id) => raw?,
        };
        let menu = decode_menu(restaurant_id, raw)?;

        let mut state = self.state();
        if state.generation != generation || !state.mounted {
            debug!(restaurant_id, "discarding stale menu");
            return Err(AdminError::Cancelled);
        }
        state.in_flight = None;
        state.current = Some(menu.clone());
        info!(
            restaurant_id,
            categories = menu.categories.len(),
            items = menu.items.len(),
            "restaurant menu loaded"
        );
        Ok(menu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    /// Ids starting with "slow" take a while to answer.
    struct DelayedSource;

    #[async_trait]
    impl MenuSource for DelayedSource {
        async fn fetch_menu(&self, restaurant_id: &str) -> AdminResult<Value> {
            if restaurant_id.starts_with("slow") {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(json!({ "data": { "items": [{ "name": restaurant_id }] } }))
        }
    }

    fn loader() -> Arc<MenuLoader> {
        Arc::new(MenuLoader::new(Arc::new(DelayedSource)))
    }

    #[tokio::test]
    async fn newer_load_supersedes_older() {
        let loader = loader();
        let slow = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load("slow-r1").await })
        };
        tokio::task::yield_now().await;

        let fast = loader.load("r2").await.expect("fast load");
        assert_eq!(fast.items[0]["name"], "r2");

        let stale = slow.await.expect("task joins");
        assert!(matches!(stale, Err(AdminError::Cancelled)));
        assert_eq!(loader.current().unwrap().restaurant_id, "r2");
    }

    #[tokio::test]
    async fn unmount_discards_in_flight_load() {
        let loader = loader();
        let pending = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.load("slow-r1").await })
        };
        tokio::task::yield_now().await;
        loader.unmount();

        assert!(matches!(pending.await.unwrap(), Err(AdminError::Cancelled)));
        assert!(loader.current().is_none());
        assert!(matches!(loader.load("r2").await, Err(AdminError::Cancelled)));

        loader.mount();
        assert!(loader.load("r2").await.is_ok());
    }

    #[test]
    fn menu_shapes_and_versions() {
        let a = decode_menu("r", json!([{ "name": "Dosa" }])).unwrap();
        assert!(a.categories.is_empty());
        assert_eq!(a.items.len(), 1);

        let b = decode_menu(
            "r",
            json!({ "categories": [{ "name": "South" }], "products": [{ "name": "Dosa" }] }),
        )
        .unwrap();
        assert_eq!(b.categories.len(), 1);
        assert_ne!(a.version, b.version);
        assert_eq!(b.version, decode_menu("r", json!({ "categories": [{ "name": "South" }], "products": [{ "name": "Dosa" }] })).unwrap().version);
        assert!(decode_menu("r", json!(3)).is_err());
    }
}
