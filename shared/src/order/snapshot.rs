//! Order record
//!
//! The canonical order: line items snapshotted at placement, money totals,
//! current status plus an append-only status history, payment linkage and
//! cancellation/return metadata.

use super::types::{Actor, ActorRole, Cancellation, OrderSource, OrderStatus, ReturnRequest};
use crate::models::PaymentStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Line item snapshot - name and price are frozen at placement time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    /// Catalog item ID
    pub item_id: String,
    /// Item name at placement
    pub name: String,
    /// Unit price at placement
    pub unit_price: Decimal,
    /// Quantity ordered
    pub quantity: u32,
    /// unit_price × quantity
    pub line_total: Decimal,
}

/// One entry of the status history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub timestamp: i64,
    pub actor_id: String,
    pub actor_role: ActorRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Money breakdown of an order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Order record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub source: OrderSource,
    pub items: Vec<LineItem>,

    // === Money ===
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,

    // === Status ===
    pub status: OrderStatus,
    /// Append-only; the last entry always equals `status`
    pub status_history: Vec<StatusEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<i64>,

    // === Payment linkage ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    /// Denormalized copy of the linked payment's status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_request: Option<ReturnRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
    /// Bumped on every committed write
    pub version: u64,
}

impl Order {
    /// Create a new order in its initial status with the first history entry
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: String,
        customer_id: String,
        source: OrderSource,
        items: Vec<LineItem>,
        totals: OrderTotals,
        status: OrderStatus,
        scheduled_for: Option<i64>,
        actor: &Actor,
        now: i64,
    ) -> Self {
        Self {
            order_id,
            customer_id,
            source,
            items,
            subtotal: totals.subtotal,
            delivery_fee: totals.delivery_fee,
            discount: totals.discount,
            tax: totals.tax,
            total: totals.total,
            status,
            status_history: vec![StatusEntry {
                status,
                timestamp: now,
                actor_id: actor.id.clone(),
                actor_role: actor.role,
                note: None,
            }],
            scheduled_for,
            payment_id: None,
            payment_status: None,
            cancellation: None,
            return_request: None,
            note: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Set a new status and append the matching history entry
    pub fn push_status(
        &mut self,
        status: OrderStatus,
        actor: &Actor,
        now: i64,
        note: Option<String>,
    ) {
        self.status = status;
        self.status_history.push(StatusEntry {
            status,
            timestamp: now,
            actor_id: actor.id.clone(),
            actor_role: actor.role,
            note,
        });
        self.touch(now);
    }

    /// Record a non-status mutation
    pub fn touch(&mut self, now: i64) {
        self.updated_at = now;
        self.version += 1;
    }

    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal: self.subtotal,
            delivery_fee: self.delivery_fee,
            discount: self.discount,
            tax: self.tax,
            total: self.total,
        }
    }

    /// `total == subtotal − discount + tax + delivery_fee`
    pub fn totals_consistent(&self) -> bool {
        self.total == self.subtotal - self.discount + self.tax + self.delivery_fee
    }

    /// Timestamp at which the order entered `Delivered`
    pub fn delivered_at(&self) -> Option<i64> {
        self.status_history
            .iter()
            .rev()
            .find(|e| e.status == OrderStatus::Delivered)
            .map(|e| e.timestamp)
    }

    /// History is non-empty and its last entry matches the current status
    pub fn history_consistent(&self) -> bool {
        self.status_history
            .last()
            .is_some_and(|e| e.status == self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        let totals = OrderTotals {
            subtotal: Decimal::new(500, 0),
            delivery_fee: Decimal::new(50, 0),
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::new(550, 0),
        };
        Order::new(
            "order-1".to_string(),
            "cust-1".to_string(),
            OrderSource::App,
            vec![],
            totals,
            OrderStatus::Placed,
            None,
            &Actor::customer("cust-1"),
            1_000,
        )
    }

    #[test]
    fn test_new_order_has_initial_history() {
        let order = sample_order();
        assert_eq!(order.status_history.len(), 1);
        assert!(order.history_consistent());
        assert!(order.totals_consistent());
        assert_eq!(order.version, 1);
    }

    #[test]
    fn test_push_status_appends_and_bumps_version() {
        let mut order = sample_order();
        order.push_status(OrderStatus::Processing, &Actor::staff("s-1"), 2_000, None);
        order.push_status(OrderStatus::Ready, &Actor::staff("s-1"), 3_000, None);
        order.push_status(OrderStatus::Delivered, &Actor::staff("s-1"), 4_000, None);

        assert_eq!(order.status_history.len(), 4);
        assert!(order.history_consistent());
        assert_eq!(order.version, 4);
        assert_eq!(order.updated_at, 4_000);
        assert_eq!(order.delivered_at(), Some(4_000));
    }

    #[test]
    fn test_inconsistent_totals_detected() {
        let mut order = sample_order();
        order.total = Decimal::new(551, 0);
        assert!(!order.totals_consistent());
    }
}
