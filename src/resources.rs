//! Catalog and account resources managed from the console.
//!
//! Every resource follows the same REST shape under `/admin/<resource>`;
//! the only client-side rule is the required-field check before a submit.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::api::{unwrap_envelope, ApiClient};
use crate::error::{AdminError, AdminResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Categories,
    Products,
    Restaurants,
    Coupons,
    Users,
    HomeSections,
    Banners,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        Self::Categories,
        Self::Products,
        Self::Restaurants,
        Self::Coupons,
        Self::Users,
        Self::HomeSections,
        Self::Banners,
    ];

    pub fn segment(self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Products => "products",
            Self::Restaurants => "restaurants",
            Self::Coupons => "coupons",
            Self::Users => "users",
            Self::HomeSections => "home-sections",
            Self::Banners => "banners",
        }
    }

    /// Fields a create or update form must fill in.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Categories => &["name"],
            Self::Products => &["name", "price", "category"],
            Self::Restaurants => &["name", "address"],
            Self::Coupons => &["code", "discount"],
            Self::Users => &["name", "phone"],
            Self::HomeSections => &["title", "type"],
            Self::Banners => &["image"],
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            Self::Categories => "Category",
            Self::Products => "Product",
            Self::Restaurants => "Restaurant",
            Self::Coupons => "Coupon",
            Self::Users => "User",
            Self::HomeSections => "Home section",
            Self::Banners => "Banner",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.segment())
    }
}

impl FromStr for ResourceKind {
    type Err = AdminError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', "-").to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.segment() == wanted)
            .ok_or_else(|| AdminError::Validation(format!("Unknown resource: {s}")))
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    }
}

/// Required-field check. Nothing is sent when this fails.
pub fn validate(kind: ResourceKind, payload: &Value) -> AdminResult<()> {
    if !payload.is_object() {
        return Err(AdminError::Validation(format!(
            "{} details must be an object",
            kind.singular()
        )));
    }
    let missing: Vec<&str> = kind
        .required_fields()
        .iter()
        .copied()
        .filter(|field| is_blank(payload.get(*field)))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AdminError::Validation(format!(
            "Please fill in: {}",
            missing.join(", ")
        )))
    }
}

fn check_id(id: &str) -> AdminResult<&str> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') || id.contains('?') {
        return Err(AdminError::Validation(format!("Invalid id: {id:?}")));
    }
    Ok(id)
}

fn collection_path(kind: ResourceKind) -> String {
    format!("/admin/{}", kind.segment())
}

fn item_path(kind: ResourceKind, id: &str) -> AdminResult<String> {
    Ok(format!("/admin/{}/{}", kind.segment(), check_id(id)?))
}

pub async fn list(api: &ApiClient, kind: ResourceKind) -> AdminResult<Vec<Value>> {
    match unwrap_envelope(api.get(&collection_path(kind)).await?) {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        Value::Object(mut obj) => match obj.remove(kind.segment()) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(AdminError::InvalidResponse(format!(
                "expected a {kind} list"
            ))),
        },
        _ => Err(AdminError::InvalidResponse(format!("expected a {kind} list"))),
    }
}

pub async fn create(api: &ApiClient, kind: ResourceKind, payload: &Value) -> AdminResult<Value> {
    validate(kind, payload)?;
    let created = unwrap_envelope(api.post(&collection_path(kind), payload).await?);
    info!(resource = %kind, "resource created");
    Ok(created)
}

pub async fn update(
    api: &ApiClient,
    kind: ResourceKind,
    id: &str,
    payload: &Value,
) -> AdminResult<Value> {
    validate(kind, payload)?;
    let updated = unwrap_envelope(api.put(&item_path(kind, id)?, payload).await?);
    info!(resource = %kind, id, "resource updated");
    Ok(updated)
}

/// Flip the active flag. Returns the value that was sent.
pub async fn toggle_status(
    api: &ApiClient,
    kind: ResourceKind,
    id: &str,
    current: bool,
) -> AdminResult<bool> {
    let path = format!("{}/status", item_path(kind, id)?);
    let next = !current;
    api.patch(&path, &json!({ "isActive": next })).await?;
    info!(resource = %kind, id, active = next, "resource status toggled");
    Ok(next)
}

pub async fn delete(api: &ApiClient, kind: ResourceKind, id: &str) -> AdminResult<()> {
    api.delete(&item_path(kind, id)?).await?;
    info!(resource = %kind, id, "resource deleted");
    Ok(())
}

// ---------------------------------------------------------------------------
// Home layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomeSection {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Home page section order as edited by drag and drop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HomeLayout {
    sections: Vec<HomeSection>,
}

impl HomeLayout {
    /// Sections sorted by their stored position; unpositioned ones last,
    /// in backend order.
    pub fn new(mut sections: Vec<HomeSection>) -> Self {
        sections.sort_by_key(|s| s.position.unwrap_or(i64::MAX));
        Self { sections }
    }

    pub fn from_values(values: Vec<Value>) -> AdminResult<Self> {
        let sections = values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<HomeSection>, _>>()
            .map_err(|e| AdminError::InvalidResponse(format!("home sections: {e}")))?;
        Ok(Self::new(sections))
    }

    pub fn sections(&self) -> &[HomeSection] {
        &self.sections
    }

    /// Drop the section at `from` onto index `to`.
    pub fn move_section(&mut self, from: usize, to: usize) -> AdminResult<()> {
        let len = self.sections.len();
        if from >= len || to >= len {
            return Err(AdminError::Validation(format!(
                "Cannot move section {from} to {to}: layout has {len} sections"
            )));
        }
        let section = self.sections.remove(from);
        self.sections.insert(to, section);
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.position = Some(index as i64);
        }
        Ok(())
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> bool {
        match self.sections.iter_mut().find(|s| s.id == id) {
            Some(section) => {
                section.is_active = active;
                true
            }
            None => false,
        }
    }

    /// `{sections: [{id, position}]}` with an explicit index per item.
    pub fn reorder_payload(&self) -> Value {
        let sections: Vec<Value> = self
            .sections
            .iter()
            .enumerate()
            .map(|(position, s)| json!({ "id": s.id, "position": position }))
            .collect();
        json!({ "sections": sections })
    }
}

pub async fn load_layout(api: &ApiClient) -> AdminResult<HomeLayout> {
    HomeLayout::from_values(list(api, ResourceKind::HomeSections).await?)
}

pub async fn commit_layout(api: &ApiClient, layout: &HomeLayout) -> AdminResult<()> {
    api.put("/admin/home-sections/reorder", &layout.reorder_payload())
        .await?;
    info!(sections = layout.sections().len(), "home layout saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_server::TestServer;
    use crate::storage::MemoryTokenStore;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn toggling_twice_restores_the_original_flag() {
        let active = Arc::new(Mutex::new(true));
        let server_flag = Arc::clone(&active);
        let server = TestServer::start(move |req| {
            if let Some(next) = req.json().get("isActive").and_then(Value::as_bool) {
                *server_flag.lock().unwrap() = next;
            }
            (200, r#"{"success":true}"#.to_string())
        })
        .await;
        let api = ApiClient::new(
            &server.base_url,
            Duration::from_secs(5),
            Arc::new(MemoryTokenStore::with_token("tok")),
        )
        .unwrap();

        let first = toggle_status(&api, ResourceKind::Products, "p1", true).await.unwrap();
        assert!(!first);
        assert!(!*active.lock().unwrap());
        let second = toggle_status(&api, ResourceKind::Products, "p1", first).await.unwrap();
        assert!(second);
        assert!(*active.lock().unwrap());

        let seen = server.requests();
        assert_eq!(seen.len(), 2);
        for req in &seen {
            assert_eq!(req.method, "PATCH");
            assert_eq!(req.path, "/admin/products/p1/status");
            assert_eq!(req.authorization.as_deref(), Some("Bearer tok"));
        }
        assert_eq!(seen[0].json(), json!({ "isActive": false }));
        assert_eq!(seen[1].json(), json!({ "isActive": true }));
    }

    #[test]
    fn kinds_parse_from_segments() {
        assert_eq!(
            "home_sections".parse::<ResourceKind>().unwrap(),
            ResourceKind::HomeSections
        );
        assert_eq!("Products".parse::<ResourceKind>().unwrap(), ResourceKind::Products);
        assert!("orders".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn missing_required_fields_are_listed() {
        let err = validate(
            ResourceKind::Products,
            &json!({ "name": "Milk", "price": null, "category": "  " }),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Please fill in: price, category");

        assert!(validate(ResourceKind::Coupons, &json!({ "code": "FRESH10", "discount": 10 })).is_ok());
        assert!(validate(ResourceKind::Banners, &json!("image.png")).is_err());
    }

    #[test]
    fn item_paths_reject_bad_ids() {
        assert_eq!(
            item_path(ResourceKind::Coupons, " c1 ").unwrap(),
            "/admin/coupons/c1"
        );
        assert!(item_path(ResourceKind::Coupons, "").is_err());
        assert!(item_path(ResourceKind::Coupons, "../x").is_err());
    }

    fn section(id: &str, position: Option<i64>) -> HomeSection {
        HomeSection {
            id: id.into(),
            title: id.to_uppercase(),
            is_active: true,
            position,
            extra: Map::new(),
        }
    }

    #[test]
    fn layout_orders_by_position_and_reindexes_on_move() {
        let mut layout = HomeLayout::new(vec![
            section("c", None),
            section("b", Some(1)),
            section("a", Some(0)),
        ]);
        let ids: Vec<&str> = layout.sections().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);

        layout.move_section(2, 0).unwrap();
        assert_eq!(
            layout.reorder_payload(),
            json!({ "sections": [
                { "id": "c", "position": 0 },
                { "id": "a", "position": 1 },
                { "id": "b", "position": 2 }
            ]})
        );
        assert!(layout.move_section(0, 3).is_err());
    }

    #[test]
    fn section_flags_toggle_independently() {
        let mut layout = HomeLayout::new(vec![section("a", Some(0)), section("b", Some(1))]);
        assert!(layout.set_active("a", false));
        assert!(!layout.sections()[0].is_active);
        assert!(layout.sections()[1].is_active);
        assert!(!layout.set_active("zz", false));
    }

    #[test]
    fn sections_keep_unknown_fields() {
        let layout = HomeLayout::from_values(vec![json!({
            "_id": "s1", "title": "Deals", "isActive": true, "position": 0, "type": "carousel"
        })])
        .unwrap();
        assert_eq!(layout.sections()[0].extra["type"], "carousel");
    }
}
