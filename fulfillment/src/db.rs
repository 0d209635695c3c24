//! Shared redb handle
//!
//! One [`Database`] backs every per-domain storage struct. Each storage owns
//! its `TableDefinition`s and exposes `*_in(txn, ..)` helpers so a caller can
//! touch several domains inside one write transaction.
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate` by default: once `commit()`
//! returns the write survives a crash.

use redb::{Database, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Open or create the database file, creating parent directories
pub fn open(path: impl AsRef<Path>) -> StorageResult<Arc<Database>> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Arc::new(Database::create(path)?))
}

/// In-memory database (tests and dry runs)
pub fn open_in_memory() -> StorageResult<Arc<Database>> {
    let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
    Ok(Arc::new(db))
}

/// Run `f` inside one write transaction
///
/// Commits when `f` succeeds; aborts and returns its error otherwise.
pub fn with_write<T, E, F>(db: &Database, f: F) -> Result<T, E>
where
    E: From<StorageError>,
    F: FnOnce(&WriteTransaction) -> Result<T, E>,
{
    let txn = db.begin_write().map_err(StorageError::from)?;
    match f(&txn) {
        Ok(value) => {
            txn.commit().map_err(StorageError::from)?;
            Ok(value)
        }
        Err(e) => {
            txn.abort().map_err(StorageError::from)?;
            Err(e)
        }
    }
}

pub(crate) fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::{ReadableDatabase, ReadableTable, TableDefinition};

    const SCRATCH: TableDefinition<&str, &[u8]> = TableDefinition::new("scratch");

    #[test]
    fn test_file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("f.redb");

        {
            let db = open(&path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut table = txn.open_table(SCRATCH).unwrap();
                table.insert("k", encode(&42u32).unwrap().as_slice()).unwrap();
            }
            txn.commit().unwrap();
        }

        let db = open(&path).unwrap();
        let txn = db.begin_read().unwrap();
        let table = txn.open_table(SCRATCH).unwrap();
        let value: u32 = decode(table.get("k").unwrap().unwrap().value()).unwrap();
        assert_eq!(value, 42);
    }
}
