//! redb storage for payment records
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `payments` | `payment_id` | `Payment` | Payment record |
//! | `order_payments` | `order_id` | `payment_id` | Latest attempt per order |
//! | `payment_sessions` | `session_ref` | `payment_id` | Checkout session lookup |
//! | `payment_gateway_refs` | `gateway_ref` | `payment_id` | Callback lookup |
//! | `processed_gateway_events` | `event_id` | processed at | Callback dedupe |

use crate::db::{self, StorageError, StorageResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::models::Payment;
use std::sync::Arc;

const PAYMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("payments");

const ORDER_PAYMENTS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("order_payments");

const SESSIONS_TABLE: TableDefinition<&str, &str> = TableDefinition::new("payment_sessions");

const GATEWAY_REFS_TABLE: TableDefinition<&str, &str> =
    TableDefinition::new("payment_gateway_refs");

const PROCESSED_EVENTS_TABLE: TableDefinition<&str, i64> =
    TableDefinition::new("processed_gateway_events");

#[derive(Clone)]
pub struct PaymentStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for PaymentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentStorage").finish_non_exhaustive()
    }
}

impl PaymentStorage {
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(PAYMENTS_TABLE)?;
            let _ = txn.open_table(ORDER_PAYMENTS_TABLE)?;
            let _ = txn.open_table(SESSIONS_TABLE)?;
            let _ = txn.open_table(GATEWAY_REFS_TABLE)?;
            let _ = txn.open_table(PROCESSED_EVENTS_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    /// Run `f` in one write transaction shared with other storages
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StorageError>,
        F: FnOnce(&WriteTransaction) -> Result<T, E>,
    {
        db::with_write(&self.db, f)
    }

    // ========== Transaction-scoped helpers ==========

    pub fn load_in(&self, txn: &WriteTransaction, payment_id: &str) -> StorageResult<Option<Payment>> {
        let table = txn.open_table(PAYMENTS_TABLE)?;
        match table.get(payment_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn require_in(&self, txn: &WriteTransaction, payment_id: &str) -> StorageResult<Payment> {
        self.load_in(txn, payment_id)?
            .ok_or_else(|| StorageError::PaymentNotFound(payment_id.to_string()))
    }

    /// Write the record and its lookup indexes
    pub fn store_in(&self, txn: &WriteTransaction, payment: &Payment) -> StorageResult<()> {
        let bytes = db::encode(payment)?;
        let id = payment.payment_id.as_str();
        {
            let mut table = txn.open_table(PAYMENTS_TABLE)?;
            table.insert(id, bytes.as_slice())?;
        }
        {
            let mut table = txn.open_table(ORDER_PAYMENTS_TABLE)?;
            table.insert(payment.order_id.as_str(), id)?;
        }
        {
            let mut table = txn.open_table(SESSIONS_TABLE)?;
            table.insert(payment.session_ref.as_str(), id)?;
        }
        if let Some(gateway_ref) = payment.gateway_ref.as_deref() {
            let mut table = txn.open_table(GATEWAY_REFS_TABLE)?;
            table.insert(gateway_ref, id)?;
        }
        Ok(())
    }

    pub fn for_order_in(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<Option<Payment>> {
        let payment_id = {
            let table = txn.open_table(ORDER_PAYMENTS_TABLE)?;
            table.get(order_id)?.map(|g| g.value().to_string())
        };
        match payment_id {
            Some(id) => self.load_in(txn, &id),
            None => Ok(None),
        }
    }

    /// Resolve a callback target: charge reference first, then session
    pub fn find_in(
        &self,
        txn: &WriteTransaction,
        gateway_ref: Option<&str>,
        session_ref: Option<&str>,
    ) -> StorageResult<Option<Payment>> {
        let mut payment_id = None;
        if let Some(gateway_ref) = gateway_ref {
            let table = txn.open_table(GATEWAY_REFS_TABLE)?;
            payment_id = table.get(gateway_ref)?.map(|g| g.value().to_string());
        }
        if payment_id.is_none()
            && let Some(session_ref) = session_ref
        {
            let table = txn.open_table(SESSIONS_TABLE)?;
            payment_id = table.get(session_ref)?.map(|g| g.value().to_string());
        }
        match payment_id {
            Some(id) => self.load_in(txn, &id),
            None => Ok(None),
        }
    }

    pub fn event_processed_in(&self, txn: &WriteTransaction, event_id: &str) -> StorageResult<bool> {
        let table = txn.open_table(PROCESSED_EVENTS_TABLE)?;
        Ok(table.get(event_id)?.is_some())
    }

    pub fn mark_event_processed_in(
        &self,
        txn: &WriteTransaction,
        event_id: &str,
        now: i64,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(PROCESSED_EVENTS_TABLE)?;
        table.insert(event_id, now)?;
        Ok(())
    }

    // ========== Reads ==========

    pub fn get(&self, payment_id: &str) -> StorageResult<Option<Payment>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(PAYMENTS_TABLE)?;
        match table.get(payment_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn require(&self, payment_id: &str) -> StorageResult<Payment> {
        self.get(payment_id)?
            .ok_or_else(|| StorageError::PaymentNotFound(payment_id.to_string()))
    }

    /// Latest payment attempt for an order
    pub fn for_order(&self, order_id: &str) -> StorageResult<Option<Payment>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(ORDER_PAYMENTS_TABLE)?;
        let Some(payment_id) = index.get(order_id)?.map(|g| g.value().to_string()) else {
            return Ok(None);
        };
        let table = txn.open_table(PAYMENTS_TABLE)?;
        match table.get(payment_id.as_str())? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn by_session(&self, session_ref: &str) -> StorageResult<Option<Payment>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(SESSIONS_TABLE)?;
        let Some(payment_id) = index.get(session_ref)?.map(|g| g.value().to_string()) else {
            return Ok(None);
        };
        let table = txn.open_table(PAYMENTS_TABLE)?;
        match table.get(payment_id.as_str())? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use shared::models::PaymentStatus;

    fn payment(id: &str, order_id: &str, session: &str) -> Payment {
        Payment {
            payment_id: id.into(),
            order_id: order_id.into(),
            customer_id: "c-1".into(),
            status: PaymentStatus::Pending,
            amount: Decimal::new(550, 0),
            currency: "EUR".into(),
            session_ref: session.into(),
            gateway_ref: None,
            failure_reason: None,
            paid_at: None,
            refund_amount: None,
            refund_reason: None,
            refund_ref: None,
            refunded_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn storage() -> PaymentStorage {
        PaymentStorage::new(db::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_indexes_resolve_payment() {
        let storage = storage();
        let mut p = payment("p-1", "o-1", "sess-1");

        let txn = storage.begin_write().unwrap();
        storage.store_in(&txn, &p).unwrap();
        txn.commit().unwrap();

        assert_eq!(storage.for_order("o-1").unwrap().unwrap().payment_id, "p-1");
        assert_eq!(storage.by_session("sess-1").unwrap().unwrap().payment_id, "p-1");

        p.gateway_ref = Some("ch-1".into());
        let txn = storage.begin_write().unwrap();
        storage.store_in(&txn, &p).unwrap();
        let found = storage.find_in(&txn, Some("ch-1"), None).unwrap();
        assert_eq!(found.map(|p| p.payment_id), Some("p-1".to_string()));
        let by_session = storage.find_in(&txn, Some("unknown"), Some("sess-1")).unwrap();
        assert!(by_session.is_some());
        assert!(storage.find_in(&txn, Some("x"), Some("y")).unwrap().is_none());
        txn.commit().unwrap();
    }

    #[test]
    fn test_processed_events() {
        let storage = storage();
        let txn = storage.begin_write().unwrap();
        assert!(!storage.event_processed_in(&txn, "evt-1").unwrap());
        storage.mark_event_processed_in(&txn, "evt-1", 10).unwrap();
        assert!(storage.event_processed_in(&txn, "evt-1").unwrap());
        txn.commit().unwrap();
    }

    #[test]
    fn test_missing_payment() {
        let storage = storage();
        assert!(matches!(
            storage.require("ghost"),
            Err(StorageError::PaymentNotFound(_))
        ));
        assert!(storage.for_order("o-x").unwrap().is_none());
    }
}
