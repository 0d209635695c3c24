//! Payment gateway contract

use crate::utils::CallError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Line shown on the hosted checkout page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Result of polling a checkout session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Verification {
    pub paid: bool,
    pub gateway_ref: Option<String>,
    /// Set when the gateway reports a definitive failure
    pub failure_reason: Option<String>,
}

/// A refund the gateway has on record
#[derive(Debug, Clone, PartialEq)]
pub struct RefundReceipt {
    pub refund_ref: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Unavailable(String),

    #[error("gateway timed out after {0:?}")]
    Timeout(Duration),

    /// Definitive refusal; retrying will not help
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl CallError for GatewayError {
    fn timed_out(after: Duration) -> Self {
        GatewayError::Timeout(after)
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, GatewayError::Rejected(_))
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start a hosted checkout, returning its session reference
    async fn create_checkout(
        &self,
        amount: Decimal,
        currency: &str,
        lines: &[CheckoutLine],
    ) -> Result<String, GatewayError>;

    async fn verify(&self, session_ref: &str) -> Result<Verification, GatewayError>;

    /// Refund against a captured payment
    ///
    /// `idempotency_key` lets the gateway collapse a retried request.
    async fn refund(
        &self,
        gateway_ref: &str,
        amount: Decimal,
        idempotency_key: &str,
    ) -> Result<String, GatewayError>;

    /// Refund already issued for this payment, if any
    async fn find_refund(&self, gateway_ref: &str) -> Result<Option<RefundReceipt>, GatewayError>;
}
