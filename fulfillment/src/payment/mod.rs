//! Payment reconciliation
//!
//! Keeps each order's Payment record in lockstep with what the gateway
//! reports, through checkout verification polls and asynchronous callbacks,
//! and performs refunds.

pub mod gateway;
pub mod reconciler;
pub mod storage;

pub use gateway::{CheckoutLine, GatewayError, PaymentGateway, RefundReceipt, Verification};
pub use reconciler::{PaymentReconciler, PaymentSettings, PaymentUpdate, ReconcileOutcome, RefundOutcome};
pub use storage::PaymentStorage;
