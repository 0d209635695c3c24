//! Order state machine
//!
//! - **transitions**: role-keyed transition table
//! - **money**: totals, tax and points arithmetic
//! - **storage**: redb persistence with single-writer updates
//! - **manager**: placement, transitions, cancellation, returns

pub mod manager;
pub mod money;
pub mod storage;
pub mod transitions;

pub use manager::{OrderPolicy, OrdersManager, PlaceOrder, PlaceOrderItem, Transition};
pub use storage::OrderStorage;
