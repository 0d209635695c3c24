//! redb storage for stock and recipes
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `ingredient_stock` | `ingredient_id` | `IngredientStock` | Current stock |
//! | `recipes` | `item_id` | `Vec<RecipeIngredient>` | Ingredients per sellable item |
//! | `inventory_deductions` | `order_id` | deducted at | One deduction per order |

use crate::db::{self, StorageError, StorageResult};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use shared::models::{IngredientStock, RecipeIngredient};
use std::sync::Arc;

const STOCK_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("ingredient_stock");

const RECIPES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("recipes");

const DEDUCTIONS_TABLE: TableDefinition<&str, i64> = TableDefinition::new("inventory_deductions");

#[derive(Clone)]
pub struct InventoryStorage {
    db: Arc<Database>,
}

impl std::fmt::Debug for InventoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryStorage").finish_non_exhaustive()
    }
}

impl InventoryStorage {
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(STOCK_TABLE)?;
            let _ = txn.open_table(RECIPES_TABLE)?;
            let _ = txn.open_table(DEDUCTIONS_TABLE)?;
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

    pub fn stock_in(&self, txn: &WriteTransaction, ingredient_id: &str) -> StorageResult<Option<IngredientStock>> {
        let table = txn.open_table(STOCK_TABLE)?;
        match table.get(ingredient_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn store_stock_in(&self, txn: &WriteTransaction, stock: &IngredientStock) -> StorageResult<()> {
        let bytes = db::encode(stock)?;
        let mut table = txn.open_table(STOCK_TABLE)?;
        table.insert(stock.ingredient_id.as_str(), bytes.as_slice())?;
        Ok(())
    }

    pub fn recipe_in(&self, txn: &WriteTransaction, item_id: &str) -> StorageResult<Option<Vec<RecipeIngredient>>> {
        let table = txn.open_table(RECIPES_TABLE)?;
        match table.get(item_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Store a recipe; an empty list removes it
    pub fn store_recipe_in(
        &self,
        txn: &WriteTransaction,
        item_id: &str,
        ingredients: &[RecipeIngredient],
    ) -> StorageResult<()> {
        let mut table = txn.open_table(RECIPES_TABLE)?;
        if ingredients.is_empty() {
            table.remove(item_id)?;
        } else {
            let bytes = db::encode(&ingredients)?;
            table.insert(item_id, bytes.as_slice())?;
        }
        Ok(())
    }

    pub fn deducted_in(&self, txn: &WriteTransaction, order_id: &str) -> StorageResult<bool> {
        let table = txn.open_table(DEDUCTIONS_TABLE)?;
        Ok(table.get(order_id)?.is_some())
    }

    pub fn mark_deducted_in(&self, txn: &WriteTransaction, order_id: &str, now: i64) -> StorageResult<()> {
        let mut table = txn.open_table(DEDUCTIONS_TABLE)?;
        table.insert(order_id, now)?;
        Ok(())
    }

    // ========== Reads ==========

    pub fn stock(&self, ingredient_id: &str) -> StorageResult<Option<IngredientStock>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STOCK_TABLE)?;
        match table.get(ingredient_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn all_stock(&self) -> StorageResult<Vec<IngredientStock>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(STOCK_TABLE)?;
        let mut stock = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            stock.push(db::decode(value.value())?);
        }
        Ok(stock)
    }

    pub fn recipe(&self, item_id: &str) -> StorageResult<Option<Vec<RecipeIngredient>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(RECIPES_TABLE)?;
        match table.get(item_id)? {
            Some(guard) => Ok(Some(db::decode(guard.value())?)),
            None => Ok(None),
        }
    }

    pub fn is_deducted(&self, order_id: &str) -> StorageResult<bool> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DEDUCTIONS_TABLE)?;
        Ok(table.get(order_id)?.is_some())
    }
}
