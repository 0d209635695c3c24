//! Payment Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Checkout session created, customer has not paid yet
    Pending,
    /// Customer returned from checkout, gateway has not confirmed yet
    Processing,
    Completed,
    Failed,
    Refunded,
    /// Order was cancelled before the payment completed
    Cancelled,
}

impl PaymentStatus {
    /// Still waiting for a gateway outcome
    pub fn is_open(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Processing)
    }
}

/// Payment record, one per checkout attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub payment_id: String,
    pub order_id: String,
    pub customer_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,

    // === Gateway references (opaque) ===
    /// Checkout session reference returned by `create_checkout`
    pub session_ref: String,
    /// Charge reference, known once the gateway confirms payment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<i64>,

    // === Refund ===
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refunded_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,
}

impl Payment {
    /// `refund_amount ≤ amount`, and `refunded` only after a completed charge
    pub fn invariants_hold(&self) -> bool {
        let refund_ok = self.refund_amount.is_none_or(|r| r <= self.amount);
        let refunded_ok = self.status != PaymentStatus::Refunded || self.paid_at.is_some();
        refund_ok && refunded_ok
    }
}

/// Kind of asynchronous gateway event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEventKind {
    PaymentSucceeded,
    PaymentFailed { reason: String },
}

/// Asynchronous gateway callback (webhook)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayEvent {
    /// Gateway-assigned event ID, the dedupe key
    pub event_id: String,
    /// Checkout session the event belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_ref: Option<String>,
    /// Charge reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_ref: Option<String>,
    #[serde(flatten)]
    pub kind: GatewayEventKind,
}
