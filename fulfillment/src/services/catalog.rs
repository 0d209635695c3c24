//! Catalog lookup
//!
//! Placement snapshots name and price from here; later catalog edits never
//! reach an existing order.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sellable item as the catalog reports it right now
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub item_id: String,
    pub name: String,
    pub price: Decimal,
    pub is_available: bool,
}

impl CatalogItem {
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            price,
            is_available: true,
        }
    }
}

pub trait Catalog: Send + Sync {
    fn lookup_item(&self, item_id: &str) -> Option<CatalogItem>;
}

/// Process-local catalog cache
///
/// The host loads it at startup and pushes edits as they happen.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<HashMap<String, CatalogItem>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = CatalogItem>) -> Self {
        let catalog = Self::new();
        for item in items {
            catalog.upsert(item);
        }
        catalog
    }

    pub fn upsert(&self, item: CatalogItem) {
        self.items.write().insert(item.item_id.clone(), item);
    }

    /// Returns false when the item is unknown
    pub fn set_available(&self, item_id: &str, available: bool) -> bool {
        match self.items.write().get_mut(item_id) {
            Some(item) => {
                item.is_available = available;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, item_id: &str) -> Option<CatalogItem> {
        self.items.write().remove(item_id)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl Catalog for InMemoryCatalog {
    fn lookup_item(&self, item_id: &str) -> Option<CatalogItem> {
        self.items.read().get(item_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_availability() {
        let catalog = InMemoryCatalog::with_items([CatalogItem::new(
            "pizza",
            "Margherita",
            Decimal::new(900, 2),
        )]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.lookup_item("pizza").unwrap().is_available);

        assert!(catalog.set_available("pizza", false));
        assert!(!catalog.lookup_item("pizza").unwrap().is_available);
        assert!(!catalog.set_available("ghost", false));

        catalog.remove("pizza");
        assert!(catalog.lookup_item("pizza").is_none());
        assert!(catalog.is_empty());
    }
}
