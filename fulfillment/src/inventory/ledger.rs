use super::storage::InventoryStorage;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::utils::Clock;
use rust_decimal::Decimal;
use shared::models::{IngredientStock, RecipeIngredient, StockDeduction};
use shared::order::Order;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Recipe-driven stock bookkeeping
#[derive(Clone)]
pub struct InventoryLedger {
    storage: InventoryStorage,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InventoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryLedger").finish_non_exhaustive()
    }
}

impl InventoryLedger {
    pub fn new(storage: InventoryStorage, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    pub fn storage(&self) -> &InventoryStorage {
        &self.storage
    }

    /// Deduct the ingredients consumed by an accepted order
    ///
    /// Runs once per order; a repeated call returns an empty list. Items
    /// without a recipe and ingredients without a stock record are skipped.
    /// Stock is floored at zero and the order is never rejected here.
    pub fn deduct_for_order(&self, order: &Order) -> FulfillmentResult<Vec<StockDeduction>> {
        let now = self.clock.now_millis();
        let deductions = self.storage.write(|txn| -> FulfillmentResult<Vec<StockDeduction>> {
            if self.storage.deducted_in(txn, &order.order_id)? {
                tracing::debug!(order_id = %order.order_id, "Stock already deducted");
                return Ok(Vec::new());
            }

            let mut required: BTreeMap<String, Decimal> = BTreeMap::new();
            for item in &order.items {
                let Some(recipe) = self.storage.recipe_in(txn, &item.item_id)? else {
                    tracing::debug!(item_id = %item.item_id, "No recipe tracked, skipping");
                    continue;
                };
                let quantity = Decimal::from(item.quantity);
                for ingredient in recipe {
                    // Saturates; anything past the stock floors at zero anyway
                    let needed = ingredient.quantity_per_unit.saturating_mul(quantity);
                    let total = required.entry(ingredient.ingredient_id).or_default();
                    *total = total.saturating_add(needed);
                }
            }

            let mut deductions = Vec::with_capacity(required.len());
            for (ingredient_id, amount) in required {
                let Some(mut stock) = self.storage.stock_in(txn, &ingredient_id)? else {
                    tracing::warn!(
                        order_id = %order.order_id,
                        ingredient_id = %ingredient_id,
                        "Recipe references an ingredient without a stock record"
                    );
                    continue;
                };

                let mut remaining = stock.current_stock - amount;
                if remaining < Decimal::ZERO {
                    tracing::warn!(
                        order_id = %order.order_id,
                        ingredient_id = %ingredient_id,
                        current = %stock.current_stock,
                        required = %amount,
                        "Stock exhausted, flooring at zero"
                    );
                    remaining = Decimal::ZERO;
                }
                stock.current_stock = remaining;
                stock.updated_at = now;
                self.storage.store_stock_in(txn, &stock)?;

                let low_stock = stock.is_low();
                if low_stock {
                    tracing::warn!(
                        ingredient_id = %ingredient_id,
                        name = %stock.name,
                        remaining = %remaining,
                        min_stock = %stock.min_stock,
                        "Low stock"
                    );
                }
                deductions.push(StockDeduction {
                    ingredient_id,
                    deducted: amount,
                    remaining,
                    low_stock,
                });
            }

            self.storage.mark_deducted_in(txn, &order.order_id, now)?;
            Ok(deductions)
        })?;

        tracing::info!(
            order_id = %order.order_id,
            ingredients = deductions.len(),
            "Stock deducted for order"
        );
        Ok(deductions)
    }

    /// Create or replace an ingredient record
    pub fn upsert_ingredient(&self, mut stock: IngredientStock) -> FulfillmentResult<IngredientStock> {
        if stock.current_stock < Decimal::ZERO || stock.min_stock < Decimal::ZERO {
            return Err(FulfillmentError::InvalidAmount(format!(
                "stock levels for {} must not be negative",
                stock.ingredient_id
            )));
        }
        stock.updated_at = self.clock.now_millis();
        self.storage.write(|txn| -> FulfillmentResult<()> {
            self.storage.store_stock_in(txn, &stock)?;
            Ok(())
        })?;
        Ok(stock)
    }

    /// Add delivered stock to an ingredient
    pub fn restock(&self, ingredient_id: &str, quantity: Decimal) -> FulfillmentResult<IngredientStock> {
        if quantity <= Decimal::ZERO {
            return Err(FulfillmentError::InvalidAmount(format!(
                "restock quantity must be positive, got {quantity}"
            )));
        }
        let now = self.clock.now_millis();
        let stock = self.storage.write(|txn| -> FulfillmentResult<IngredientStock> {
            let mut stock = self
                .storage
                .stock_in(txn, ingredient_id)?
                .ok_or_else(|| FulfillmentError::IngredientNotFound(ingredient_id.to_string()))?;
            stock.current_stock = stock.current_stock.checked_add(quantity).ok_or_else(|| {
                FulfillmentError::InvalidAmount(format!(
                    "restock of {quantity} overflows stock for {ingredient_id}"
                ))
            })?;
            stock.updated_at = now;
            self.storage.store_stock_in(txn, &stock)?;
            Ok(stock)
        })?;

        if let Some(max) = stock.max_stock
            && stock.current_stock > max
        {
            tracing::warn!(
                ingredient_id,
                current = %stock.current_stock,
                max_stock = %max,
                "Stock above maximum after restock"
            );
        }
        Ok(stock)
    }

    /// Replace the ingredient mapping of a sellable item
    pub fn set_recipe(&self, item_id: &str, ingredients: Vec<RecipeIngredient>) -> FulfillmentResult<()> {
        if let Some(bad) = ingredients
            .iter()
            .find(|i| i.quantity_per_unit <= Decimal::ZERO)
        {
            return Err(FulfillmentError::InvalidAmount(format!(
                "quantity per unit for {} must be positive",
                bad.ingredient_id
            )));
        }
        self.storage.write(|txn| -> FulfillmentResult<()> {
            self.storage.store_recipe_in(txn, item_id, &ingredients)?;
            Ok(())
        })
    }

    pub fn stock(&self, ingredient_id: &str) -> FulfillmentResult<IngredientStock> {
        self.storage
            .stock(ingredient_id)?
            .ok_or_else(|| FulfillmentError::IngredientNotFound(ingredient_id.to_string()))
    }

    /// Ingredients currently under their minimum
    pub fn low_stock(&self) -> FulfillmentResult<Vec<IngredientStock>> {
        Ok(self
            .storage
            .all_stock()?
            .into_iter()
            .filter(IngredientStock::is_low)
            .collect())
    }
}
