//! Restaurant order fulfillment orchestrator
//!
//! Owns the canonical order record and drives the four components that hang
//! off its transitions.
//!
//! # Module layout
//!
//! ```text
//! fulfillment/src/
//! ├── core/           # configuration
//! ├── utils/          # logger, clock
//! ├── db.rs           # shared redb handle and storage errors
//! ├── orders/         # state machine, money, order storage
//! ├── payment/        # gateway contract and reconciliation
//! ├── inventory/      # recipe-driven stock deduction
//! ├── rewards/        # points ledger and balance projection
//! ├── notifications/  # templates, transports, in-app feed
//! ├── audit/          # activity log with hash chain
//! ├── services/       # catalog and profile collaborators
//! ├── effects.rs      # post-commit side-effect runner
//! └── orchestrator/   # wiring and public operations
//! ```

pub mod audit;
pub mod core;
pub mod db;
pub mod effects;
pub mod error;
pub mod inventory;
pub mod notifications;
pub mod orchestrator;
pub mod orders;
pub mod payment;
pub mod rewards;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use core::Config;
pub use error::{ErrorKind, FulfillmentError, FulfillmentResult};
pub use orchestrator::{Collaborators, Orchestrator};
pub use orders::{OrderStorage, OrdersManager, PlaceOrder, PlaceOrderItem};
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};
pub use utils::time::{Clock, ManualClock, SystemClock};
