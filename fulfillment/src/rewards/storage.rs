//! redb storage for the rewards ledger
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `reward_ledger` | `(user_id, seq)` | `LedgerEntry` | Append-only ledger |
//! | `reward_accounts` | `user_id` | `RewardAccount` | Balance projection |
//! | `reward_order_awards` | `order_id` | `entry_id` | One earn per order |
//! | `reward_referrals` | `referee_id` | `entry_id` | One referral per referee |
//!
//! The account row is recomputed from the ledger on every append and is
//! never written on its own.

use crate::db::{self, StorageError, StorageResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::models::{LedgerEntry, RewardAccount};
use std::sync::Arc;

const LEDGER_TABLE: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("reward_ledger");

const ACCOUNTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("reward_accounts");

const ORDER_AWARDS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("reward_order_awards");

const REFERRALS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("reward_referrals");

#[derive(Clone)]
pub struct RewardsStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for RewardsStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardsStorage").finish_non_exhaustive()
    }
}

impl RewardsStorage {
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(LEDGER_TABLE)?;
            let _ = txn.open_table(ACCOUNTS_TABLE)?;
            let _ = txn.open_table(ORDER_AWARDS_TABLE)?;
            let _ = txn.open_table(REFERRALS_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&WriteTransaction) -> Result<T, E>,
    {
        db::with_write(&self.db, f)
    }

    // ========== Transaction-scoped helpers ==========

    /// Ledger of one user in append order
    pub fn entries_in(&self, txn: &WriteTransaction, user_id: &str) -> StorageResult<Vec<LedgerEntry>> {
        let table = txn.open_table(LEDGER_TABLE)?;
        let mut entries = Vec::new();
        for row in table.range((user_id, 0)..=(user_id, u64::MAX))? {
            let (_, value) = row?;
            entries.push(db::decode(value.value())?);
        }
        Ok(entries)
    }

    /// Append an entry and rewrite the user's projection
    pub fn append_in(
        &self,
        txn: &WriteTransaction,
        entry: &LedgerEntry,
        now: i64,
    ) -> StorageResult<RewardAccount> {
        let seq = {
            let table = txn.open_table(LEDGER_TABLE)?;
            let last = table
                .range((entry.user_id.as_str(), 0)..=(entry.user_id.as_str(), u64::MAX))?
                .next_back()
                .transpose()?
                .map(|(key, _)| key.value().1);
            last.map_or(1, |seq| seq + 1)
        };
        {
            let bytes = db::encode(entry)?;
            let mut table = txn.open_table(LEDGER_TABLE)?;
            table.insert((entry.user_id.as_str(), seq), bytes.as_slice())?;
        }

        let entries = self.entries_in(txn, &entry.user_id)?;
        let account = RewardAccount::from_entries(&entry.user_id, &entries, now);
        let bytes = db::encode(&account)?;
        let mut table = txn.open_table(ACCOUNTS_TABLE)?;
        table.insert(entry.user_id.as_str(), bytes.as_slice())?;
        Ok(account)
    }

    pub fn order_awarded_in(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<bool> {
        let table = txn.open_table(ORDER_AWARDS_TABLE)?;
        Ok(table.get(order_id)?.is_some())
    }

    pub fn mark_order_awarded_in(&self, txn: &WriteTransaction, order_id: &str, entry_id: &str) -> StorageResult<()> {
        let mut table = txn.open_table(ORDER_AWARDS_TABLE)?;
        table.insert(order_id, entry_id)?;
        Ok(())
    }

    pub fn referral_credited_in(&self, txn: &WriteTransaction, referee_id: &str) -> StorageResult<bool> {
        let table = txn.open_table(REFERRALS_TABLE)?;
        Ok(table.get(referee_id)?.is_some())
    }

    pub fn mark_referral_credited_in(
        &self,
        txn: &WriteTransaction,
        referee_id: &str,
        entry_id: &str,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(REFERRALS_TABLE)?;
        table.insert(referee_id, entry_id)?;
        Ok(())
    }

    // ========== Reads ==========

    pub fn account(&self, user_id: &str) -> StorageResult<Option<RewardAccount>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ACCOUNTS_TABLE)?;
        match table.get(user_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn entries(&self, user_id: &str) -> StorageResult<Vec<LedgerEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(LEDGER_TABLE)?;
        let mut entries = Vec::new();
        for row in table.range((user_id, 0)..=(user_id, u64::MAX))? {
            let (_, value) = row?;
            entries.push(db::decode(value.value())?);
        }
        Ok(entries)
    }
}
