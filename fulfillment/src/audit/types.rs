//! Activity log types
//!
//! Entries are immutable and chained with SHA-256 hashes.

use serde::{Deserialize, Serialize};
use shared::order::{Actor, ActorRole};

/// Audited action (closed set, never free text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // ═══ Orders ═══
    OrderPlaced,
    /// Any status change other than cancellation
    OrderTransitioned,
    OrderCancelled,
    ReturnRequested,
    ReturnResolved,

    // ═══ Payments ═══
    CheckoutStarted,
    PaymentReconciled,
    PaymentRefunded,

    // ═══ Rewards ═══
    PointsAwarded,
    PointsRedeemed,
    ReferralCredited,

    // ═══ Inventory ═══
    StockDeducted,
    StockAdjusted,

    // ═══ Notifications ═══
    PromotionSent,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One activity handed to the audit log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub action: AuditAction,
    /// e.g. "order", "payment", "rewards"
    pub resource_type: String,
    pub resource_id: String,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub details: serde_json::Value,
    pub timestamp: i64,
}

impl Activity {
    pub fn new(
        action: AuditAction,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        actor: &Actor,
        timestamp: i64,
    ) -> Self {
        Self {
            action,
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            details: serde_json::Value::Null,
            timestamp,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Stored audit entry
///
/// - `prev_hash`: hash of the previous entry (`genesis` for the first)
/// - `curr_hash`: hash over `prev_hash` and every stored field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Global sequence number, starting at 1
    pub id: u64,
    pub timestamp: i64,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub actor_id: String,
    pub actor_role: ActorRole,
    pub details: serde_json::Value,
    pub prev_hash: String,
    pub curr_hash: String,
}

/// Audit query filters
#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    /// Inclusive lower bound (Unix millis)
    pub from: Option<i64>,
    /// Inclusive upper bound (Unix millis)
    pub to: Option<i64>,
    pub action: Option<AuditAction>,
    pub actor_id: Option<String>,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            action: None,
            actor_id: None,
            resource_id: None,
            offset: 0,
            limit: default_limit(),
        }
    }
}

/// Result of walking the hash chain
#[derive(Debug, Serialize)]
pub struct AuditChainVerification {
    pub total_entries: u64,
    pub chain_intact: bool,
    pub breaks: Vec<AuditChainBreak>,
}

/// Which link of an entry failed verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainBreakKind {
    /// `prev_hash` does not match the previous entry's `curr_hash`
    PrevHashMismatch,
    /// Stored fields no longer hash to `curr_hash`
    ContentModified,
}

#[derive(Debug, Serialize)]
pub struct AuditChainBreak {
    pub entry_id: u64,
    pub kind: ChainBreakKind,
    pub expected_hash: String,
    pub actual_hash: String,
}
