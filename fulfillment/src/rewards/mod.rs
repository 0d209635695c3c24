//! Rewards ledger
//!
//! Append-only points entries per user with a balance and tier projection
//! that is recomputed on every write.

pub mod ledger;
pub mod storage;

pub use ledger::{AwardOutcome, Redemption, RewardsLedger};
pub use storage::RewardsStorage;
