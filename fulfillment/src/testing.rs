//! Test doubles for the external collaborators

use crate::notifications::{RenderedMessage, Transport, TransportError};
use crate::payment::{CheckoutLine, GatewayError, PaymentGateway, RefundReceipt, Verification};
use crate::services::ProfileStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::models::{Contact, NotificationPreferences};
use std::collections::HashMap;
use std::time::Duration;

// ============================================================================
// Payment gateway
// ============================================================================

#[derive(Debug, Default)]
struct GatewayState {
    next_session: u32,
    sessions: HashMap<String, Verification>,
    /// (charge ref, amount)
    refund_calls: Vec<(String, Decimal)>,
    issued_refunds: HashMap<String, RefundReceipt>,
    checkout_failures: usize,
    refund_failures: usize,
    checkout_delay: Option<Duration>,
}

/// Scriptable in-memory gateway
#[derive(Debug, Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` checkout calls fail as unreachable
    pub fn fail_checkouts(&self, n: usize) {
        self.state.lock().checkout_failures = n;
    }

    /// Make the next `n` refund calls fail as unreachable
    pub fn fail_refunds(&self, n: usize) {
        self.state.lock().refund_failures = n;
    }

    /// Hold every checkout call open for `delay`
    pub fn delay_checkouts(&self, delay: Duration) {
        self.state.lock().checkout_delay = Some(delay);
    }

    pub fn mark_paid(&self, session_ref: &str, gateway_ref: &str) {
        self.state.lock().sessions.insert(
            session_ref.to_string(),
            Verification {
                paid: true,
                gateway_ref: Some(gateway_ref.to_string()),
                failure_reason: None,
            },
        );
    }

    /// Simulate a refund the gateway issued without the caller hearing back
    pub fn record_refund(&self, gateway_ref: &str, refund_ref: &str, amount: Decimal) {
        self.state.lock().issued_refunds.insert(
            gateway_ref.to_string(),
            RefundReceipt {
                refund_ref: refund_ref.to_string(),
                amount,
            },
        );
    }

    pub fn checkout_count(&self) -> usize {
        self.state.lock().next_session as usize
    }

    pub fn refund_calls(&self) -> Vec<(String, Decimal)> {
        self.state.lock().refund_calls.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout(
        &self,
        _amount: Decimal,
        _currency: &str,
        _lines: &[CheckoutLine],
    ) -> Result<String, GatewayError> {
        let delay = self.state.lock().checkout_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.checkout_failures > 0 {
            state.checkout_failures -= 1;
            return Err(GatewayError::Unavailable("connection refused".to_string()));
        }
        state.next_session += 1;
        let session_ref = format!("cs-{}", state.next_session);
        state
            .sessions
            .insert(session_ref.clone(), Verification::default());
        Ok(session_ref)
    }

    async fn verify(&self, session_ref: &str) -> Result<Verification, GatewayError> {
        self.state
            .lock()
            .sessions
            .get(session_ref)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("unknown session {session_ref}")))
    }

    async fn refund(
        &self,
        gateway_ref: &str,
        amount: Decimal,
        _idempotency_key: &str,
    ) -> Result<String, GatewayError> {
        let mut state = self.state.lock();
        if state.refund_failures > 0 {
            state.refund_failures -= 1;
            return Err(GatewayError::Unavailable("connection reset".to_string()));
        }
        state.refund_calls.push((gateway_ref.to_string(), amount));
        let refund_ref = format!("re-{}", state.refund_calls.len());
        state.issued_refunds.insert(
            gateway_ref.to_string(),
            RefundReceipt {
                refund_ref: refund_ref.clone(),
                amount,
            },
        );
        Ok(refund_ref)
    }

    async fn find_refund(&self, gateway_ref: &str) -> Result<Option<RefundReceipt>, GatewayError> {
        Ok(self.state.lock().issued_refunds.get(gateway_ref).cloned())
    }
}

// ============================================================================
// Channel transport
// ============================================================================

/// Transport that records what it was asked to send
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, RenderedMessage)>>,
    failing: Mutex<bool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn sent(&self) -> Vec<(String, RenderedMessage)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, recipient: &str, message: &RenderedMessage) -> Result<(), TransportError> {
        if *self.failing.lock() {
            return Err(TransportError::Unavailable("smtp down".to_string()));
        }
        self.sent
            .lock()
            .push((recipient.to_string(), message.clone()));
        Ok(())
    }
}

// ============================================================================
// Profile store
// ============================================================================

/// Profile store that never answers
#[derive(Debug, Default)]
pub struct StalledProfileStore;

#[async_trait]
impl ProfileStore for StalledProfileStore {
    async fn preferences(&self, _user_id: &str) -> Option<NotificationPreferences> {
        std::future::pending().await
    }

    async fn contact(&self, _user_id: &str) -> Option<Contact> {
        std::future::pending().await
    }

    async fn referrer_of(&self, _user_id: &str) -> Option<String> {
        std::future::pending().await
    }
}
