//! Shared types for the order fulfillment platform
//!
//! Common types used by the orchestrator and by any transport layer built on
//! top of it: the order record, payments, stock, rewards, notifications and
//! the unified error codes.

pub mod error;
pub mod models;
pub mod order;
pub mod util;

// Re-exports
pub use rust_decimal::Decimal;
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, AppResult, ErrorCategory, ErrorCode};
pub use order::{Actor, ActorRole, LineItem, Order, OrderStatus, StatusEntry};
