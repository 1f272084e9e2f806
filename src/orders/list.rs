//! Order list state and its live board.
//!
//! `OrderListView` is plain synchronous state: the raw collection plus the
//! admin's query inputs. `OrderBoard` wraps it with the backend, toasts and
//! session preferences, and runs the live-event loop while mounted.

use chrono::{FixedOffset, NaiveDate};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backend::OrderBackend;
use super::model::{Order, OrderStatus, StatusChange};
use super::query::{derive, OrderPage, OrderQuery, PageSize, SortField, StatusFilter};
use crate::error::{AdminError, AdminResult};
use crate::events::{self, Emitter};
use crate::notifications::{announce_new_order, Notifier, SessionPrefs, ToastCenter};
use crate::realtime::{EventHub, LiveEvent};

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

/// Local optimistic change awaiting server confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingStatus {
    pub order_id: String,
    pub previous: OrderStatus,
    pub requested: OrderStatus,
}

pub struct OrderListView {
    orders: Vec<Order>,
    query: OrderQuery,
    offset: FixedOffset,
    loading: bool,
    loaded: bool,
}

impl OrderListView {
    pub fn new(page_size: PageSize, offset: FixedOffset) -> Self {
        Self {
            orders: Vec::new(),
            query: OrderQuery {
                page_size,
                ..OrderQuery::default()
            },
            offset,
            loading: false,
            loaded: false,
        }
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn query(&self) -> &OrderQuery {
        &self.query
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn has_loaded(&self) -> bool {
        self.loaded
    }

    pub fn replace(&mut self, orders: Vec<Order>) {
        self.orders = orders;
        self.loaded = true;
        self.loading = false;
    }

    pub fn set_search(&mut self, search: &str) {
        self.query.search = search.to_string();
        self.query.page = 1;
    }

    pub fn set_status_filter(&mut self, status: StatusFilter) {
        self.query.status = status;
        self.query.page = 1;
    }

    pub fn set_date_from(&mut self, date: Option<NaiveDate>) {
        self.query.date_from = date;
        self.query.page = 1;
    }

    pub fn set_date_to(&mut self, date: Option<NaiveDate>) {
        self.query.date_to = date;
        self.query.page = 1;
    }

    pub fn set_page_size(&mut self, size: PageSize) {
        self.query.page_size = size;
        self.query.page = 1;
    }

    /// Header click on `field`.
    pub fn sort_by(&mut self, field: SortField) {
        self.query.sort = self.query.sort.toggled(field);
        self.query.page = 1;
    }

    /// Jump to `page`, clamped to the current result.
    pub fn set_page(&mut self, page: usize) -> usize {
        self.query.page = page;
        let clamped = self.page().page;
        self.query.page = clamped;
        clamped
    }

    pub fn page(&self) -> OrderPage {
        derive(&self.orders, &self.query, &self.offset)
    }

    /// Patch only the status of the matching order. Returns whether
    /// anything changed, so replaying an event is a no-op.
    pub fn apply_status_change(&mut self, change: &StatusChange) -> bool {
        match self.orders.iter_mut().find(|o| o.id == change.order_id) {
            Some(order) if order.status != change.status => {
                order.status = change.status.clone();
                true
            }
            Some(_) => false,
            None => {
                debug!(order_id = %change.order_id, "status change for an order not loaded");
                false
            }
        }
    }

    /// Insert `order`, or replace the entry with the same id. Returns
    /// `true` when the collection grew.
    pub fn upsert(&mut self, order: Order) -> bool {
        match self.orders.iter_mut().find(|o| o.id == order.id) {
            Some(existing) => {
                *existing = order;
                false
            }
            None => {
                self.orders.insert(0, order);
                true
            }
        }
    }

    /// Apply `status` locally before the server confirms it.
    pub fn begin_status_update(
        &mut self,
        order_id: &str,
        status: &OrderStatus,
    ) -> AdminResult<PendingStatus> {
        let order = self
            .orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| AdminError::OrderNotFound(order_id.to_string()))?;
        let previous = std::mem::replace(&mut order.status, status.clone());
        Ok(PendingStatus {
            order_id: order_id.to_string(),
            previous,
            requested: status.clone(),
        })
    }

    /// Undo a failed optimistic update. A newer value (for instance from a
    /// live event) is left alone.
    pub fn rollback(&mut self, pending: &PendingStatus) -> bool {
        match self.orders.iter_mut().find(|o| o.id == pending.order_id) {
            Some(order) if order.status == pending.requested => {
                order.status = pending.previous.clone();
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> Value {
        json!({
            "loading": self.loading,
            "loaded": self.loaded,
            "query": {
                "search": self.query.search,
                "status": self.query.status.as_str(),
                "dateFrom": self.query.date_from.map(|d| d.to_string()),
                "dateTo": self.query.date_to.map(|d| d.to_string()),
                "sort": self.query.sort,
                "page": self.query.page,
                "pageSize": self.query.page_size.get(),
            },
            "page": self.page(),
        })
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

pub struct OrderBoard {
    view: Mutex<OrderListView>,
    backend: Arc<dyn OrderBackend>,
    toasts: Arc<ToastCenter>,
    prefs: Arc<SessionPrefs>,
    notifier: Arc<dyn Notifier>,
    emitter: Arc<dyn Emitter>,
    fetch_seq: AtomicU64,
}

impl OrderBoard {
    pub fn new(
        view: OrderListView,
        backend: Arc<dyn OrderBackend>,
        toasts: Arc<ToastCenter>,
        prefs: Arc<SessionPrefs>,
        notifier: Arc<dyn Notifier>,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        Self {
            view: Mutex::new(view),
            backend,
            toasts,
            prefs,
            notifier,
            emitter,
            fetch_seq: AtomicU64::new(0),
        }
    }

    fn view(&self) -> MutexGuard<'_, OrderListView> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the view and broadcast the new state.
    pub fn update<T>(&self, f: impl FnOnce(&mut OrderListView) -> T) -> T {
        let out = {
            let mut view = self.view();
            f(&mut view)
        };
        self.publish_state();
        out
    }

    pub fn snapshot(&self) -> Value {
        self.view().snapshot()
    }

    pub fn page(&self) -> OrderPage {
        self.view().page()
    }

    fn publish_state(&self) {
        let snapshot = self.snapshot();
        self.emitter.emit(events::EVENT_ORDERS_CHANGED, snapshot);
    }

    fn report_failure(&self, context: &str, err: &AdminError) {
        if err.is_auth_failure() {
            self.emitter
                .emit(events::EVENT_SESSION_EXPIRED, json!({ "reason": err.to_string() }));
        }
        self.toasts.error(format!("{context}: {err}"));
    }

    /// Fetch the full collection. Only the first fetch shows the loading
    /// indicator; a response overtaken by a newer fetch is discarded.
    /// Returns `false` when the result was discarded.
    pub async fn load(&self) -> AdminResult<bool> {
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let show_spinner = {
            let mut view = self.view();
            if !view.loaded {
                view.loading = true;
            }
            view.loading
        };
        if show_spinner {
            self.publish_state();
        }

        let result = self.backend.fetch_orders().await;
        if self.fetch_seq.load(Ordering::SeqCst) != seq {
            debug!(seq, "discarding superseded order fetch");
            return Ok(false);
        }

        match result {
            Ok(orders) => {
                info!(count = orders.len(), "orders loaded");
                self.view().replace(orders);
                self.publish_state();
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "order fetch failed");
                self.view().loading = false;
                self.publish_state();
                self.report_failure("Failed to load orders", &e);
                Err(e)
            }
        }
    }

    /// Optimistically set `status` on `order_id` and persist it. On failure
    /// the previous status is restored unless something newer landed.
    pub async fn change_status(&self, order_id: &str, status: OrderStatus) -> AdminResult<()> {
        if !status.is_known() {
            return Err(AdminError::Validation(format!(
                "Unsupported order status: {status}"
            )));
        }
        let pending = self.view().begin_status_update(order_id, &status)?;
        self.publish_state();

        match self.backend.update_status(order_id, &status).await {
            Ok(()) => {
                info!(order_id, status = %status, "order status updated");
                self.toasts
                    .success(format!("Order status updated to {}", status.label()));
                Ok(())
            }
            Err(e) => {
                warn!(order_id, error = %e, "order status update failed");
                let reverted = self.view().rollback(&pending);
                if reverted {
                    self.publish_state();
                }
                self.report_failure("Failed to update order status", &e);
                Err(e)
            }
        }
    }

    pub async fn handle_live_event(&self, event: LiveEvent) {
        match event {
            LiveEvent::OrderUpdated(change) => {
                let changed = self.view().apply_status_change(&change);
                if changed {
                    debug!(order_id = %change.order_id, status = %change.status, "live status applied");
                    self.publish_state();
                }
            }
            LiveEvent::NewOrder(payload) => self.on_new_order(payload).await,
            LiveEvent::Reconnected => {
                info!("live channel reconnected, resyncing orders");
                let _ = self.load().await;
            }
            LiveEvent::Connected | LiveEvent::Disconnected => {}
        }
    }

    async fn on_new_order(&self, payload: Value) {
        let name = payload
            .pointer("/user/name")
            .or_else(|| payload.get("customerName"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let total = payload.get("total").and_then(Value::as_f64).unwrap_or(0.0);
        info!(order_id = ?payload.get("_id"), "new order received");
        announce_new_order(&self.prefs.snapshot(), self.notifier.as_ref(), &name, total);

        if self.load().await.is_err() {
            match serde_json::from_value::<Order>(payload) {
                Ok(order) => {
                    self.view().upsert(order);
                    self.publish_state();
                }
                Err(e) => warn!(error = %e, "new-order payload could not be merged"),
            }
        }
    }

    /// Enter the order view: subscribe to live events, load, then process
    /// events until the returned guard is dropped.
    pub fn mount(self: &Arc<Self>, hub: &EventHub) -> BoardMount {
        let mut subscription = hub.subscribe();
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let board = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = board.load() => {}
            }
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    event = subscription.recv() => match event {
                        Some(event) => board.handle_live_event(event).await,
                        None => break,
                    },
                }
            }
            debug!("order board unmounted");
        });
        BoardMount {
            cancel,
            task: Some(task),
        }
    }
}

/// Live order view. Dropping it stops event handling and releases the
/// subscription.
pub struct BoardMount {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BoardMount {
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for BoardMount {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
