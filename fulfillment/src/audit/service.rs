//! Audit service
//!
//! Producers hand [`Activity`] records to [`AuditService::log`]; they travel
//! over an mpsc channel to the [`AuditWorker`](super::AuditWorker), which
//! appends them to an [`ActivitySink`]. Every record is also mirrored to the
//! `audit` tracing target.

use super::storage::AuditStorage;
use super::types::{Activity, AuditEntry};
use crate::db::StorageResult;
use tokio::sync::mpsc;

/// Append-only destination of audit records
pub trait ActivitySink: Send + Sync {
    fn record(&self, activity: Activity) -> StorageResult<AuditEntry>;
}

impl ActivitySink for AuditStorage {
    fn record(&self, activity: Activity) -> StorageResult<AuditEntry> {
        self.append(activity)
    }
}

#[derive(Debug, Clone)]
pub struct AuditService {
    tx: mpsc::Sender<Activity>,
}

impl AuditService {
    /// Create the service and the receiver its worker consumes
    pub fn new(buffer_size: usize) -> (Self, mpsc::Receiver<Activity>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        (Self { tx }, rx)
    }

    /// Queue an activity
    ///
    /// Waits when the channel is full; audit records are never dropped
    /// while the worker is alive.
    pub async fn log(&self, activity: Activity) {
        crate::audit_log!(
            activity.actor_id,
            activity.action,
            format!("{}:{}", activity.resource_type, activity.resource_id),
            activity.details
        );
        if self.tx.send(activity).await.is_err() {
            tracing::error!("Audit channel closed, audit entry lost");
        }
    }
}
