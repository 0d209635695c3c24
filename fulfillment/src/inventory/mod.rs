//! Inventory ledger
//!
//! Deducts ingredient stock through the recipe mapping when an order is
//! accepted. Deduction is best-effort: low or exhausted stock is logged and
//! the order goes ahead.

pub mod ledger;
pub mod storage;

pub use ledger::InventoryLedger;
pub use storage::InventoryStorage;
