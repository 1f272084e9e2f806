//! Orders: wire model, query derivation, live board and histories.

pub mod backend;
pub mod history;
pub mod list;
pub mod model;
pub mod query;

pub use backend::OrderBackend;
pub use list::{BoardMount, OrderBoard, OrderListView, PendingStatus};
pub use model::{Customer, Order, OrderItem, OrderStatus, StatusChange};
pub use query::{
    derive, OrderPage, OrderQuery, PageSize, SortDirection, SortField, SortSpec, StatusFilter,
};
