//! Filtering, sorting and paging of the order collection.
//!
//! Everything here is a pure function of (collection, query). The view
//! never stores a filtered or sorted copy; it re-derives on every read.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::model::{Order, OrderStatus};

// ---------------------------------------------------------------------------
// Query inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Only(OrderStatus),
}

impl StatusFilter {
    /// `"All"` (or empty) means no filter; anything else is a status code.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::Only(OrderStatus::parse(trimmed))
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => "All",
            Self::Only(status) => status.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Total,
    Status,
    CreatedAt,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "total" => Ok(Self::Total),
            "status" => Ok(Self::Status),
            "createdAt" | "created_at" | "date" => Ok(Self::CreatedAt),
            other => Err(format!("Unsupported sort field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl SortSpec {
    /// Header-click semantics: same field flips direction, a new field
    /// starts descending.
    pub fn toggled(self, field: SortField) -> Self {
        if self.field == field {
            Self {
                field,
                direction: self.direction.flipped(),
            }
        } else {
            Self {
                field,
                direction: SortDirection::Desc,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    Ten,
    TwentyFive,
    Fifty,
}

impl PageSize {
    pub const CHOICES: [PageSize; 3] = [PageSize::Ten, PageSize::TwentyFive, PageSize::Fifty];

    pub fn get(self) -> usize {
        match self {
            Self::Ten => 10,
            Self::TwentyFive => 25,
            Self::Fifty => 50,
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl TryFrom<u64> for PageSize {
    type Error = PageSizeError;

    fn try_from(n: u64) -> Result<Self, Self::Error> {
        match n {
            10 => Ok(Self::Ten),
            25 => Ok(Self::TwentyFive),
            50 => Ok(Self::Fifty),
            other => Err(PageSizeError(other.to_string())),
        }
    }
}

impl FromStr for PageSize {
    type Err = PageSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map_err(|_| PageSizeError(s.to_string()))
            .and_then(PageSize::try_from)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSizeError(String);

impl fmt::Display for PageSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page size must be 10, 25 or 50 (got {})", self.0)
    }
}

impl std::error::Error for PageSizeError {}

/// Everything the admin can tweak on the order table.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuery {
    pub search: String,
    pub status: StatusFilter,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub sort: SortSpec,
    /// 1-based; clamped on derivation.
    pub page: usize,
    pub page_size: PageSize,
}

impl Default for OrderQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            status: StatusFilter::All,
            date_from: None,
            date_to: None,
            sort: SortSpec::default(),
            page: 1,
            page_size: PageSize::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Start of `date` in the console's timezone, as UTC.
fn start_of_day(date: NaiveDate, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// 23:59:59 of `date` in the console's timezone, as UTC.
fn end_of_day(date: NaiveDate, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let naive = date.and_hms_opt(23, 59, 59)?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn matches_search(order: &Order, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return true;
    }
    order.id.to_lowercase().contains(needle_lower)
        || order.customer.name.to_lowercase().contains(needle_lower)
        || order.customer.phone.to_lowercase().contains(needle_lower)
}

/// Precomputed predicate for one query, so the per-order check does not
/// re-lowercase the needle or recompute day boundaries.
pub struct OrderFilter {
    needle: String,
    status: StatusFilter,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn new(query: &OrderQuery, offset: &FixedOffset) -> Self {
        Self {
            needle: query.search.trim().to_lowercase(),
            status: query.status.clone(),
            from: query.date_from.and_then(|d| start_of_day(d, offset)),
            to: query.date_to.and_then(|d| end_of_day(d, offset)),
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        if !matches_search(order, &self.needle) {
            return false;
        }
        if let StatusFilter::Only(wanted) = &self.status {
            if order.status.as_str() != wanted.as_str() {
                return false;
            }
        }
        if let Some(from) = self.from {
            if order.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if order.created_at > to {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Sort
// ---------------------------------------------------------------------------

fn compare(a: &Order, b: &Order, field: SortField) -> Ordering {
    match field {
        SortField::Total => a.total.total_cmp(&b.total),
        SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

/// Stable sort: equal keys keep collection order in both directions.
pub fn sort_orders(orders: &mut [&Order], spec: SortSpec) {
    orders.sort_by(|a, b| match spec.direction {
        SortDirection::Asc => compare(a, b, spec.field),
        SortDirection::Desc => compare(b, a, spec.field),
    });
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: usize,
    pub total_pages: usize,
    pub start: usize,
    pub end: usize,
}

/// Window over `len` items. `total_pages` is at least 1 and `page` is
/// clamped into `[1, total_pages]`.
pub fn paginate(len: usize, page: usize, page_size: PageSize) -> PageWindow {
    let size = page_size.get();
    let total_pages = len.div_ceil(size).max(1);
    let page = page.clamp(1, total_pages);
    let start = ((page - 1) * size).min(len);
    let end = (start + size).min(len);
    PageWindow {
        page,
        total_pages,
        start,
        end,
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub page: usize,
    pub total_pages: usize,
    pub page_size: usize,
    pub total_matching: usize,
    pub total_loaded: usize,
    pub sort: SortSpec,
}

/// Filter, sort and page `orders` for display.
pub fn derive(orders: &[Order], query: &OrderQuery, offset: &FixedOffset) -> OrderPage {
    let filter = OrderFilter::new(query, offset);
    let mut matching: Vec<&Order> = orders.iter().filter(|o| filter.matches(o)).collect();
    sort_orders(&mut matching, query.sort);

    let window = paginate(matching.len(), query.page, query.page_size);
    OrderPage {
        orders: matching[window.start..window.end]
            .iter()
            .map(|o| (*o).clone())
            .collect(),
        page: window.page,
        total_pages: window.total_pages,
        page_size: query.page_size.get(),
        total_matching: matching.len(),
        total_loaded: orders.len(),
        sort: query.sort,
    }
}
