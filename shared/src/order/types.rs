//! Shared types for the order state machine

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Order Status
// ============================================================================

/// Order status
///
/// `Scheduled → Placed → Processing → Ready → OutForDelivery → Delivered → Completed`,
/// with `Cancelled` reachable from the first three.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted for a future time slot
    Scheduled,
    /// Accepted and waiting for the kitchen
    Placed,
    /// Kitchen is preparing the order
    Processing,
    /// Ready for pickup or dispatch
    Ready,
    /// Courier is on the way
    OutForDelivery,
    /// Handed to the customer
    Delivered,
    /// Closed after delivery
    Completed,
    /// Cancelled before preparation finished
    Cancelled,
}

impl OrderStatus {
    /// Statuses from which an order may still be cancelled
    pub const CANCELLABLE: [OrderStatus; 3] = [
        OrderStatus::Scheduled,
        OrderStatus::Placed,
        OrderStatus::Processing,
    ];

    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn is_cancellable(&self) -> bool {
        Self::CANCELLABLE.contains(self)
    }

    /// The order has reached the customer (return requests are allowed)
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Scheduled => "SCHEDULED",
            OrderStatus::Placed => "PLACED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Ready => "READY",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Actors
// ============================================================================

/// Role of whoever triggers an operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Customer,
    Staff,
    Admin,
    /// Internal triggers: payment callbacks, schedulers, forced cancellation
    System,
}

impl ActorRole {
    /// Staff, admin and system actors bypass customer-only time bounds
    pub fn is_privileged(&self) -> bool {
        !matches!(self, ActorRole::Customer)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActorRole::Customer => "customer",
            ActorRole::Staff => "staff",
            ActorRole::Admin => "admin",
            ActorRole::System => "system",
        };
        f.write_str(s)
    }
}

/// Identity attached to every operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: ActorRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }

    pub fn customer(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            role: ActorRole::Customer,
        }
    }

    pub fn staff(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            role: ActorRole::Staff,
        }
    }

    /// The orchestrator itself (gateway callbacks, schedulers)
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            name: "System".to_string(),
            role: ActorRole::System,
        }
    }
}

// ============================================================================
// Order metadata
// ============================================================================

/// Where the order was created
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSource {
    /// Placed by the customer from the app
    #[default]
    App,
    /// Entered by staff at the counter
    PointOfSale,
}

/// Cancellation metadata, set once when the order enters `Cancelled`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_by: String,
    pub cancelled_by_role: ActorRole,
    pub cancelled_at: i64,
}

/// State of a return request
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    Open,
    Approved,
    Rejected,
}

/// Return request attached to a delivered/completed order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnRequest {
    pub reason: String,
    pub requested_by: String,
    pub requested_at: i64,
    pub status: ReturnStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
}
