//! Activity audit log
//!
//! # Architecture
//!
//! ```text
//! transition / refund / award
//!   └─ AuditService::log() → mpsc → AuditWorker → ActivitySink (AuditStorage)
//!
//! SHA-256 hash chain: genesis → entry₁ → entry₂ → ... → entryₙ
//! ```
//!
//! The orchestrator only writes here. [`AuditStorage::verify_chain`] and
//! [`AuditStorage::query`] exist for operators.

pub mod service;
pub mod storage;
pub mod types;
pub mod worker;

pub use service::{ActivitySink, AuditService};
pub use storage::AuditStorage;
pub use types::{
    Activity, AuditAction, AuditChainBreak, AuditChainVerification, AuditEntry, AuditQuery,
    ChainBreakKind,
};
pub use worker::AuditWorker;
