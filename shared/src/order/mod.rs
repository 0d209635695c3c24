//! Order record and status vocabulary
//!
//! - **types**: status enum, actors and roles, cancellation/return metadata
//! - **snapshot**: the canonical order record with its append-only history

pub mod snapshot;
pub mod types;

pub use snapshot::{LineItem, Order, OrderTotals, StatusEntry};
pub use types::{
    Actor, ActorRole, Cancellation, OrderSource, OrderStatus, ReturnRequest, ReturnStatus,
};
