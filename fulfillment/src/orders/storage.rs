//! redb storage for order records
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `orders` | `order_id` | `Order` | Canonical order record |
//! | `customer_orders` | `(customer_id, order_id)` | `()` | Per-customer index |
//! | `scheduled_orders` | `order_id` | `scheduled_for` | Orders waiting for release |
//!
//! Every mutation goes through [`OrderStorage::update`], which reads,
//! validates and writes inside one write transaction. redb admits a single
//! writer, so two updates of the same order are serialized and the second
//! one validates against the first one's result.

use crate::db::{self, StorageError, StorageResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::order::{Order, OrderStatus};
use std::sync::Arc;

const ORDERS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("orders");

const CUSTOMER_ORDERS_TABLE: TableDefinition<(&str, &str), ()> =
    TableDefinition::new("customer_orders");

const SCHEDULED_TABLE: TableDefinition<&str, i64> = TableDefinition::new("scheduled_orders");

/// Order storage backed by redb
#[derive(Clone)]
pub struct OrderStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for OrderStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderStorage").finish_non_exhaustive()
    }
}

impl OrderStorage {
    /// Attach to a database, creating tables if needed
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(ORDERS_TABLE)?;
            let _ = txn.open_table(CUSTOMER_ORDERS_TABLE)?;
            let _ = txn.open_table(SCHEDULED_TABLE)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::new(db::open_in_memory()?)
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Transaction-scoped helpers ==========

    pub fn load_in(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<Option<Order>> {
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn require_in(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<Order> {
        self.load_in(txn, order_id)?
            .ok_or_else(|| StorageError::OrderNotFound(order_id.to_string()))
    }

    /// Write the record and keep both indexes in step with it
    pub fn store_in(&self, txn: &WriteTransaction, order: &Order) -> StorageResult<()> {
        let bytes = db::encode(order)?;
        {
            let mut table = txn.open_table(ORDERS_TABLE)?;
            table.insert(order.order_id.as_str(), bytes.as_slice())?;
        }
        {
            let mut index = txn.open_table(CUSTOMER_ORDERS_TABLE)?;
            index.insert((order.customer_id.as_str(), order.order_id.as_str()), ())?;
        }
        let mut scheduled = txn.open_table(SCHEDULED_TABLE)?;
        match (order.status, order.scheduled_for) {
            (OrderStatus::Scheduled, Some(at)) => {
                scheduled.insert(order.order_id.as_str(), at)?;
            }
            _ => {
                scheduled.remove(order.order_id.as_str())?;
            }
        }
        Ok(())
    }

    // ========== Single-record operations ==========

    pub fn insert(&self, order: &Order) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        self.store_in(&txn, order)?;
        txn.commit()?;
        Ok(())
    }

    /// Read, mutate and write one order atomically
    ///
    /// If `mutate` fails nothing is written and its error is returned.
    pub fn update<T, E, F>(&self, order_id: &str, mutate: F) -> Result<(Order, T), E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut Order) -> Result<T, E>,
    {
        db::with_write(&self.db, |txn| {
            let mut order = self.require_in(txn, order_id)?;
            let out = mutate(&mut order)?;
            self.store_in(txn, &order)?;
            Ok((order, out))
        })
    }

    pub fn get(&self, order_id: &str) -> StorageResult<Option<Order>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ORDERS_TABLE)?;
        match table.get(order_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn require(&self, order_id: &str) -> StorageResult<Order> {
        self.get(order_id)?
            .ok_or_else(|| StorageError::OrderNotFound(order_id.to_string()))
    }

    // ========== Queries ==========

    /// A customer's orders, newest first
    pub fn list_for_customer(&self, customer_id: &str) -> StorageResult<Vec<Order>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_table(CUSTOMER_ORDERS_TABLE)?;
        let orders = txn.open_table(ORDERS_TABLE)?;

        let mut result = Vec::new();
        for entry in index.range((customer_id, "")..)? {
            let (key, _) = entry?;
            let (owner, order_id) = key.value();
            if owner != customer_id {
                break;
            }
            if let Some(guard) = orders.get(order_id)? {
                result.push(db::decode::<Order>(guard.value())?);
            }
        }
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    /// IDs of scheduled orders whose time has come, earliest first
    pub fn due_scheduled(&self, now: i64) -> StorageResult<Vec<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SCHEDULED_TABLE)?;

        let mut due = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let at = value.value();
            if at <= now {
                due.push((at, key.value().to_string()));
            }
        }
        due.sort();
        Ok(due.into_iter().map(|(_, id)| id).collect())
    }
}
