//! Audit log storage (redb)
//!
//! Append-only: there is no update or delete path. Each entry carries the
//! previous entry's hash, so any edit breaks the chain from that point on.
//! redb's single writer serializes appends, which keeps sequence numbers
//! and the chain gap-free.

use super::types::{
    Activity, AuditAction, AuditChainBreak, AuditChainVerification, AuditEntry, AuditQuery,
    ChainBreakKind,
};
use crate::db::{self, StorageResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use sha2::{Digest, Sha256};
use shared::order::ActorRole;
use std::sync::Arc;

const AUDIT_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_log");

/// Hash of the (virtual) entry before the first one
pub const GENESIS_HASH: &str = "genesis";

#[derive(Clone)]
pub struct AuditStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for AuditStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStorage").finish_non_exhaustive()
    }
}

impl AuditStorage {
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(AUDIT_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    /// Append one entry
    ///
    /// 1. Read the last sequence number and hash
    /// 2. Hash the new entry over the previous hash and its fields
    /// 3. Write and commit
    pub fn append(&self, activity: Activity) -> StorageResult<AuditEntry> {
        let txn = self.db.begin_write()?;
        let entry = {
            let mut table = txn.open_table(AUDIT_TABLE)?;
            let last: Option<AuditEntry> = match table.last()? {
                Some((_, value)) => Some(db::decode(value.value())?),
                None => None,
            };
            let (id, prev_hash) = match last {
                Some(last) => (last.id + 1, last.curr_hash),
                None => (1, GENESIS_HASH.to_string()),
            };

            let curr_hash = compute_audit_hash(
                &prev_hash,
                id,
                activity.timestamp,
                &activity.action,
                &activity.resource_type,
                &activity.resource_id,
                &activity.actor_id,
                activity.actor_role,
                &activity.details,
            );
            let entry = AuditEntry {
                id,
                timestamp: activity.timestamp,
                action: activity.action,
                resource_type: activity.resource_type,
                resource_id: activity.resource_id,
                actor_id: activity.actor_id,
                actor_role: activity.actor_role,
                details: activity.details,
                prev_hash,
                curr_hash,
            };
            let bytes = db::encode(&entry)?;
            table.insert(id, bytes.as_slice())?;
            entry
        };
        txn.commit()?;
        Ok(entry)
    }

    /// Matching entries newest first, plus the total match count
    pub fn query(&self, q: &AuditQuery) -> StorageResult<(Vec<AuditEntry>, u64)> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(AUDIT_TABLE)?;

        let mut total = 0u64;
        let mut items = Vec::new();
        for row in table.iter()?.rev() {
            let (_, value) = row?;
            let entry: AuditEntry = db::decode(value.value())?;
            if !matches_query(&entry, q) {
                continue;
            }
            if total as usize >= q.offset && items.len() < q.limit {
                items.push(entry);
            }
            total += 1;
        }
        Ok((items, total))
    }

    /// Walk the whole chain, re-hashing every entry
    pub fn verify_chain(&self) -> StorageResult<AuditChainVerification> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(AUDIT_TABLE)?;

        let mut expected_prev = GENESIS_HASH.to_string();
        let mut total_entries = 0u64;
        let mut breaks = Vec::new();
        for row in table.iter()? {
            let (_, value) = row?;
            let entry: AuditEntry = db::decode(value.value())?;
            total_entries += 1;

            if entry.prev_hash != expected_prev {
                breaks.push(AuditChainBreak {
                    entry_id: entry.id,
                    kind: ChainBreakKind::PrevHashMismatch,
                    expected_hash: expected_prev.clone(),
                    actual_hash: entry.prev_hash.clone(),
                });
            }
            let recomputed = compute_audit_hash(
                &entry.prev_hash,
                entry.id,
                entry.timestamp,
                &entry.action,
                &entry.resource_type,
                &entry.resource_id,
                &entry.actor_id,
                entry.actor_role,
                &entry.details,
            );
            if recomputed != entry.curr_hash {
                breaks.push(AuditChainBreak {
                    entry_id: entry.id,
                    kind: ChainBreakKind::ContentModified,
                    expected_hash: recomputed,
                    actual_hash: entry.curr_hash.clone(),
                });
            }
            expected_prev = entry.curr_hash;
        }

        Ok(AuditChainVerification {
            total_entries,
            chain_intact: breaks.is_empty(),
            breaks,
        })
    }

    #[cfg(test)]
    pub(crate) fn overwrite_for_test(&self, entry: &AuditEntry) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let bytes = db::encode(entry)?;
            let mut table = txn.open_table(AUDIT_TABLE)?;
            table.insert(entry.id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }
}

fn matches_query(entry: &AuditEntry, q: &AuditQuery) -> bool {
    q.from.is_none_or(|from| entry.timestamp >= from)
        && q.to.is_none_or(|to| entry.timestamp <= to)
        && q.action.is_none_or(|action| entry.action == action)
        && q.actor_id.as_deref().is_none_or(|id| entry.actor_id == id)
        && q.resource_id.as_deref().is_none_or(|id| entry.resource_id == id)
}

/// SHA-256 over the previous hash and every stored field
///
/// - variable-length fields are separated by `\x00`
/// - integers are hashed as little-endian bytes
/// - enums are hashed through their serde names, which are stable
#[allow(clippy::too_many_arguments)]
fn compute_audit_hash(
    prev_hash: &str,
    id: u64,
    timestamp: i64,
    action: &AuditAction,
    resource_type: &str,
    resource_id: &str,
    actor_id: &str,
    actor_role: ActorRole,
    details: &serde_json::Value,
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(prev_hash.as_bytes());
    hasher.update(b"\x00");

    hasher.update(id.to_le_bytes());
    hasher.update(timestamp.to_le_bytes());

    let action_str = serde_json::to_string(action).unwrap_or_default();
    hasher.update(action_str.as_bytes());
    hasher.update(b"\x00");

    hasher.update(resource_type.as_bytes());
    hasher.update(b"\x00");
    hasher.update(resource_id.as_bytes());
    hasher.update(b"\x00");
    hasher.update(actor_id.as_bytes());
    hasher.update(b"\x00");

    let role_str = serde_json::to_string(&actor_role).unwrap_or_default();
    hasher.update(role_str.as_bytes());
    hasher.update(b"\x00");

    let details_json = serde_json::to_string(details).unwrap_or_default();
    hasher.update(details_json.as_bytes());

    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::order::Actor;

    fn storage() -> AuditStorage {
        AuditStorage::new(db::open_in_memory().unwrap()).unwrap()
    }

    fn activity(action: AuditAction, resource_id: &str, ts: i64) -> Activity {
        Activity::new(action, "order", resource_id, &Actor::staff("staff-1"), ts)
            .with_details(serde_json::json!({ "to": "READY" }))
    }

    #[test]
    fn test_chain_links_entries() {
        let storage = storage();
        let first = storage.append(activity(AuditAction::OrderPlaced, "o-1", 1)).unwrap();
        let second = storage
            .append(activity(AuditAction::OrderTransitioned, "o-1", 2))
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.curr_hash);
        assert_eq!(first.curr_hash.len(), 64);

        let verification = storage.verify_chain().unwrap();
        assert!(verification.chain_intact);
        assert_eq!(verification.total_entries, 2);
    }

    #[test]
    fn test_tampering_is_detected() {
        let storage = storage();
        storage.append(activity(AuditAction::OrderPlaced, "o-1", 1)).unwrap();
        let mut second = storage
            .append(activity(AuditAction::PaymentRefunded, "p-1", 2))
            .unwrap();
        storage.append(activity(AuditAction::OrderCancelled, "o-1", 3)).unwrap();

        second.details = serde_json::json!({ "amount": "0.01" });
        storage.overwrite_for_test(&second).unwrap();

        let verification = storage.verify_chain().unwrap();
        assert!(!verification.chain_intact);
        assert_eq!(verification.breaks.len(), 1);
        assert_eq!(verification.breaks[0].entry_id, 2);
        assert_eq!(verification.breaks[0].kind, ChainBreakKind::ContentModified);
    }

    #[test]
    fn test_query_filters_and_pages() {
        let storage = storage();
        for ts in 1..=5 {
            storage
                .append(activity(AuditAction::OrderTransitioned, "o-1", ts))
                .unwrap();
        }
        storage.append(activity(AuditAction::PointsAwarded, "cust-1", 6)).unwrap();

        let (items, total) = storage
            .query(&AuditQuery {
                resource_id: Some("o-1".to_string()),
                offset: 1,
                limit: 2,
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![4, 3]);

        let (items, total) = storage
            .query(&AuditQuery {
                action: Some(AuditAction::PointsAwarded),
                ..AuditQuery::default()
            })
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].resource_id, "cust-1");
    }
}
