//! redb storage for in-app notifications
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `notifications` | `notification_id` | `Notification` | Record |
//! | `user_notifications` | `(user_id, seq)` | `notification_id` | Per-user feed order |

use crate::db::{self, StorageError, StorageResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use shared::models::Notification;
use std::sync::Arc;

const NOTIFICATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("notifications");

const USER_FEED_TABLE: TableDefinition<(&str, u64), &str> =
    TableDefinition::new("user_notifications");

#[derive(Clone)]
pub struct NotificationStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for NotificationStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStorage").finish_non_exhaustive()
    }
}

impl NotificationStorage {
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(NOTIFICATIONS_TABLE)?;
            let _ = txn.open_table(USER_FEED_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    /// Store a new record at the head of its user's feed
    pub fn insert(&self, notification: &Notification) -> StorageResult<()> {
        let user_id = notification.user_id.as_str();
        let txn = self.db.begin_write()?;
        {
            let bytes = db::encode(notification)?;
            let mut table = txn.open_table(NOTIFICATIONS_TABLE)?;
            table.insert(notification.notification_id.as_str(), bytes.as_slice())?;
        }
        {
            let mut feed = txn.open_table(USER_FEED_TABLE)?;
            let seq = feed
                .range((user_id, 0)..=(user_id, u64::MAX))?
                .next_back()
                .transpose()?
                .map_or(1, |(key, _)| key.value().1 + 1);
            feed.insert((user_id, seq), notification.notification_id.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, notification_id: &str) -> StorageResult<Option<Notification>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(NOTIFICATIONS_TABLE)?;
        match table.get(notification_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Apply a flag change; `None` when the record does not exist
    pub fn update<F>(&self, notification_id: &str, mutate: F) -> StorageResult<Option<Notification>>
    where
        F: FnOnce(&mut Notification),
    {
        db::with_write(&self.db, |txn| -> StorageResult<Option<Notification>> {
            let mut table = txn.open_table(NOTIFICATIONS_TABLE)?;
            let current: Option<Notification> = match table.get(notification_id)? {
                Some(guard) => Some(db::decode(guard.value())?),
                None => None,
            };
            let Some(mut notification) = current else {
                return Ok(None);
            };
            mutate(&mut notification);
            let bytes = db::encode(&notification)?;
            table.insert(notification_id, bytes.as_slice())?;
            Ok(Some(notification))
        })
    }

    /// Newest first, at most `limit` records
    pub fn list_for_user(&self, user_id: &str, limit: usize) -> StorageResult<Vec<Notification>> {
        let txn = self.db.begin_read()?;
        let feed = txn.open_table(USER_FEED_TABLE)?;
        let table = txn.open_table(NOTIFICATIONS_TABLE)?;
        let mut out = Vec::new();
        for row in feed.range((user_id, 0)..=(user_id, u64::MAX))?.rev() {
            if out.len() >= limit {
                break;
            }
            let (_, id) = row?;
            match table.get(id.value())? {
                Some(guard) => out.push(db::decode(guard.value())?),
                None => {
                    return Err(StorageError::NotFound(format!(
                        "notification {} indexed but missing",
                        id.value()
                    )));
                }
            }
        }
        Ok(out)
    }

    pub fn unread_count(&self, user_id: &str) -> StorageResult<usize> {
        let txn = self.db.begin_read()?;
        let feed = txn.open_table(USER_FEED_TABLE)?;
        let table = txn.open_table(NOTIFICATIONS_TABLE)?;
        let mut count = 0;
        for row in feed.range((user_id, 0)..=(user_id, u64::MAX))? {
            let (_, id) = row?;
            if let Some(guard) = table.get(id.value())? {
                let notification: Notification = db::decode(guard.value())?;
                if !notification.read && !notification.dismissed {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}
