//! Inventory Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ingredient stock record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngredientStock {
    pub ingredient_id: String,
    pub name: String,
    /// Unit of measure (g, ml, pcs)
    pub unit: String,
    pub current_stock: Decimal,
    pub min_stock: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_stock: Option<Decimal>,
    pub updated_at: i64,
}

impl IngredientStock {
    pub fn is_low(&self) -> bool {
        self.current_stock < self.min_stock
    }
}

/// One ingredient requirement of a sellable item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeIngredient {
    pub ingredient_id: String,
    /// Amount consumed per unit of the sellable item
    pub quantity_per_unit: Decimal,
}

/// Result of deducting one ingredient for an order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockDeduction {
    pub ingredient_id: String,
    pub deducted: Decimal,
    pub remaining: Decimal,
    /// Remaining stock fell under `min_stock`
    pub low_stock: bool,
}
