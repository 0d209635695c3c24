//! Payment reconciliation
//!
//! Gateway calls run outside any write transaction. Their outcome is then
//! applied in one transaction that covers both the payment record and the
//! order it belongs to, so `order.payment_status` never drifts from the
//! payment itself.

use super::gateway::{CheckoutLine, PaymentGateway};
use super::storage::PaymentStorage;
use crate::core::Config;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::orders::manager::{apply_forced_cancel, authorize};
use crate::orders::{OrderStorage, Transition, transitions};
use crate::utils::{Clock, call_with_retry};
use redb::WriteTransaction;
use rust_decimal::Decimal;
use shared::models::{GatewayEvent, GatewayEventKind, Payment, PaymentStatus};
use shared::order::{Actor, ActorRole, Order, OrderStatus};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub currency: String,
    pub gateway_timeout: Duration,
    /// Move a `Placed` order to `Processing` once its payment completes
    pub auto_accept_paid_orders: bool,
}

impl PaymentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            currency: config.currency.clone(),
            gateway_timeout: config.gateway_timeout,
            auto_accept_paid_orders: config.auto_accept_paid_orders,
        }
    }
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What a reconciliation step did to the payment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed,
    Failed,
    /// Still waiting on the gateway
    Processing,
    /// Nothing to apply, the payment already reflects this outcome
    Unchanged,
    /// Gateway event already processed
    Duplicate,
}

#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub payment: Payment,
    pub outcome: ReconcileOutcome,
    /// Order status change triggered by the payment (auto-accept)
    pub transition: Option<Transition>,
}

impl PaymentUpdate {
    fn without_transition(payment: Payment, outcome: ReconcileOutcome) -> Self {
        Self {
            payment,
            outcome,
            transition: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub payment: Payment,
    /// False when the payment had already been refunded
    pub applied: bool,
    /// Forced cancellation of the order, when one happened
    pub transition: Option<Transition>,
}

#[derive(Clone)]
pub struct PaymentReconciler {
    payments: PaymentStorage,
    orders: OrderStorage,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    settings: PaymentSettings,
}

impl std::fmt::Debug for PaymentReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentReconciler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl PaymentReconciler {
    pub fn new(
        payments: PaymentStorage,
        orders: OrderStorage,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            payments,
            orders,
            gateway,
            clock,
            settings,
        }
    }

    pub fn storage(&self) -> &PaymentStorage {
        &self.payments
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    /// Open a checkout session for the order
    ///
    /// An open payment for the order is returned as-is. A failed or
    /// cancelled previous attempt is replaced by a new one.
    pub async fn start_checkout(&self, order_id: &str, actor: &Actor) -> FulfillmentResult<Payment> {
        let order = self.orders.require(order_id)?;
        authorize(&order, actor)?;
        ensure_payable(&order)?;

        if let Some(existing) = reusable_payment(order_id, self.payments.for_order(order_id)?)? {
            return Ok(existing);
        }

        let lines: Vec<CheckoutLine> = order
            .items
            .iter()
            .map(|item| CheckoutLine {
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();
        let currency = self.settings.currency.as_str();
        let session_ref = call_with_retry("gateway.create_checkout", self.settings.gateway_timeout, || {
            self.gateway.create_checkout(order.total, currency, &lines)
        })
        .await
        .map_err(|e| FulfillmentError::CheckoutFailed(e.to_string()))?;

        let now = self.clock.now_millis();
        let (payment, created) = self.payments.write(|txn| -> FulfillmentResult<(Payment, bool)> {
            let mut order = self.orders.require_in(txn, order_id)?;
            ensure_payable(&order)?;
            // A concurrent checkout may have linked a payment meanwhile
            if let Some(existing) = reusable_payment(order_id, self.payments.for_order_in(txn, order_id)?)? {
                return Ok((existing, false));
            }

            let payment = Payment {
                payment_id: uuid::Uuid::new_v4().to_string(),
                order_id: order.order_id.clone(),
                customer_id: order.customer_id.clone(),
                status: PaymentStatus::Pending,
                amount: order.total,
                currency: self.settings.currency.clone(),
                session_ref,
                gateway_ref: None,
                failure_reason: None,
                paid_at: None,
                refund_amount: None,
                refund_reason: None,
                refund_ref: None,
                refunded_at: None,
                created_at: now,
                updated_at: now,
            };
            self.payments.store_in(txn, &payment)?;

            order.payment_id = Some(payment.payment_id.clone());
            order.payment_status = Some(payment.status);
            order.touch(now);
            self.orders.store_in(txn, &order)?;
            Ok((payment, true))
        })?;

        if created {
            tracing::info!(
                order_id = %payment.order_id,
                payment_id = %payment.payment_id,
                amount = %payment.amount,
                "Checkout session created"
            );
        } else {
            tracing::warn!(
                order_id = %payment.order_id,
                payment_id = %payment.payment_id,
                "Concurrent checkout already linked a payment, session discarded"
            );
        }
        Ok(payment)
    }

    /// Poll the gateway for a session the customer returned from
    pub async fn verify_checkout(&self, session_ref: &str) -> FulfillmentResult<PaymentUpdate> {
        let payment = self
            .payments
            .by_session(session_ref)?
            .ok_or_else(|| FulfillmentError::PaymentNotFound(session_ref.to_string()))?;
        if !payment.status.is_open() {
            return Ok(PaymentUpdate::without_transition(payment, ReconcileOutcome::Unchanged));
        }

        let verification = call_with_retry("gateway.verify", self.settings.gateway_timeout, || {
            self.gateway.verify(session_ref)
        })
        .await
        .map_err(|e| FulfillmentError::GatewayUnavailable(e.to_string()))?;

        let now = self.clock.now_millis();
        self.payments.write(|txn| -> FulfillmentResult<PaymentUpdate> {
            let payment = self.payments.require_in(txn, &payment.payment_id)?;
            if verification.paid {
                self.apply_success(txn, payment, verification.gateway_ref.clone(), now)
            } else if let Some(reason) = verification.failure_reason.clone() {
                self.apply_failure(txn, payment, reason, now)
            } else {
                self.apply_processing(txn, payment, now)
            }
        })
    }

    // ========================================================================
    // Gateway callbacks
    // ========================================================================

    /// Apply an asynchronous gateway event exactly once
    ///
    /// The event ID is recorded in the same transaction that applies it, so
    /// a redelivered event reports `Duplicate` and changes nothing.
    pub fn handle_event(&self, event: &GatewayEvent) -> FulfillmentResult<PaymentUpdate> {
        let now = self.clock.now_millis();
        let update = self.payments.write(|txn| -> FulfillmentResult<PaymentUpdate> {
            let payment = self
                .payments
                .find_in(txn, event.gateway_ref.as_deref(), event.session_ref.as_deref())?
                .ok_or_else(|| {
                    let reference = event
                        .gateway_ref
                        .clone()
                        .or_else(|| event.session_ref.clone())
                        .unwrap_or_else(|| event.event_id.clone());
                    FulfillmentError::PaymentNotFound(reference)
                })?;

            if self.payments.event_processed_in(txn, &event.event_id)? {
                return Ok(PaymentUpdate::without_transition(payment, ReconcileOutcome::Duplicate));
            }

            let update = match &event.kind {
                GatewayEventKind::PaymentSucceeded => {
                    self.apply_success(txn, payment, event.gateway_ref.clone(), now)?
                }
                GatewayEventKind::PaymentFailed { reason } => {
                    self.apply_failure(txn, payment, reason.clone(), now)?
                }
            };
            self.payments.mark_event_processed_in(txn, &event.event_id, now)?;
            Ok(update)
        })?;

        tracing::info!(
            event_id = %event.event_id,
            payment_id = %update.payment.payment_id,
            outcome = ?update.outcome,
            "Gateway event handled"
        );
        Ok(update)
    }

    fn apply_success(
        &self,
        txn: &WriteTransaction,
        mut payment: Payment,
        gateway_ref: Option<String>,
        now: i64,
    ) -> FulfillmentResult<PaymentUpdate> {
        if matches!(payment.status, PaymentStatus::Completed | PaymentStatus::Refunded) {
            return Ok(PaymentUpdate::without_transition(payment, ReconcileOutcome::Unchanged));
        }
        if payment.status == PaymentStatus::Cancelled {
            tracing::warn!(
                payment_id = %payment.payment_id,
                order_id = %payment.order_id,
                "Payment succeeded after its order was cancelled"
            );
        }

        payment.status = PaymentStatus::Completed;
        if payment.gateway_ref.is_none() {
            payment.gateway_ref = gateway_ref;
        }
        if payment.paid_at.is_none() {
            payment.paid_at = Some(now);
        }
        payment.failure_reason = None;
        payment.updated_at = now;
        self.payments.store_in(txn, &payment)?;

        let transition = self.sync_order(txn, &payment, now, true)?;
        Ok(PaymentUpdate {
            payment,
            outcome: ReconcileOutcome::Completed,
            transition,
        })
    }

    fn apply_failure(
        &self,
        txn: &WriteTransaction,
        mut payment: Payment,
        reason: String,
        now: i64,
    ) -> FulfillmentResult<PaymentUpdate> {
        if !payment.status.is_open() {
            tracing::debug!(
                payment_id = %payment.payment_id,
                status = ?payment.status,
                "Ignoring failure for settled payment"
            );
            return Ok(PaymentUpdate::without_transition(payment, ReconcileOutcome::Unchanged));
        }

        payment.status = PaymentStatus::Failed;
        payment.failure_reason = Some(reason);
        payment.updated_at = now;
        self.payments.store_in(txn, &payment)?;
        self.sync_order(txn, &payment, now, false)?;

        Ok(PaymentUpdate::without_transition(payment, ReconcileOutcome::Failed))
    }

    fn apply_processing(
        &self,
        txn: &WriteTransaction,
        mut payment: Payment,
        now: i64,
    ) -> FulfillmentResult<PaymentUpdate> {
        if payment.status != PaymentStatus::Pending {
            return Ok(PaymentUpdate::without_transition(payment, ReconcileOutcome::Processing));
        }
        payment.status = PaymentStatus::Processing;
        payment.updated_at = now;
        self.payments.store_in(txn, &payment)?;
        self.sync_order(txn, &payment, now, false)?;
        Ok(PaymentUpdate::without_transition(payment, ReconcileOutcome::Processing))
    }

    /// Copy the payment status onto its order
    ///
    /// Only the order's current payment is mirrored; an older attempt that
    /// settles late does not overwrite the newer one.
    fn sync_order(
        &self,
        txn: &WriteTransaction,
        payment: &Payment,
        now: i64,
        allow_accept: bool,
    ) -> FulfillmentResult<Option<Transition>> {
        let Some(mut order) = self.orders.load_in(txn, &payment.order_id)? else {
            tracing::warn!(
                payment_id = %payment.payment_id,
                order_id = %payment.order_id,
                "Payment references a missing order"
            );
            return Ok(None);
        };
        if order.payment_id.as_deref() != Some(payment.payment_id.as_str()) {
            return Ok(None);
        }

        order.payment_status = Some(payment.status);
        let accept = allow_accept
            && self.settings.auto_accept_paid_orders
            && payment.status == PaymentStatus::Completed
            && order.status == OrderStatus::Placed
            && transitions::is_allowed(OrderStatus::Placed, OrderStatus::Processing, ActorRole::System);

        let transition = if accept {
            let system = Actor::system();
            order.push_status(
                OrderStatus::Processing,
                &system,
                now,
                Some("payment confirmed".to_string()),
            );
            Some(Transition {
                order: order.clone(),
                from: OrderStatus::Placed,
                to: OrderStatus::Processing,
                actor: system,
            })
        } else {
            order.touch(now);
            None
        };
        self.orders.store_in(txn, &order)?;
        Ok(transition)
    }

    // ========================================================================
    // Refunds
    // ========================================================================

    /// Refund a completed payment, fully when `amount` is `None`
    ///
    /// The gateway is called first; nothing changes locally if it fails.
    /// On success the payment becomes `Refunded` and, in the same
    /// transaction, the order is cancelled unless it was already delivered.
    pub async fn refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        reason: &str,
        actor: &Actor,
    ) -> FulfillmentResult<RefundOutcome> {
        if !actor.role.is_privileged() {
            return Err(FulfillmentError::NotAuthorized(format!(
                "{} may not issue refunds",
                actor.id
            )));
        }

        let payment = self.payments.require(payment_id)?;
        if payment.status != PaymentStatus::Completed {
            return Err(FulfillmentError::PaymentNotRefundable {
                payment_id: payment_id.to_string(),
                status: payment.status,
            });
        }
        let amount = amount.unwrap_or(payment.amount);
        if amount <= Decimal::ZERO {
            return Err(FulfillmentError::InvalidAmount(format!(
                "refund amount must be positive, got {amount}"
            )));
        }
        if amount > payment.amount {
            return Err(FulfillmentError::RefundExceedsPayment {
                requested: amount,
                paid: payment.amount,
            });
        }

        let target = charge_reference(&payment);
        let refund_ref = call_with_retry("gateway.refund", self.settings.gateway_timeout, || {
            self.gateway.refund(target, amount, &payment.payment_id)
        })
        .await
        .map_err(|e| FulfillmentError::RefundFailed(e.to_string()))?;

        let now = self.clock.now_millis();
        let outcome = self.payments.write(|txn| {
            self.apply_refund(txn, payment_id, amount, &refund_ref, reason, now)
        })?;
        tracing::info!(
            payment_id,
            order_id = %outcome.payment.order_id,
            amount = %amount,
            refund_ref = %refund_ref,
            actor = %actor.id,
            "Payment refunded"
        );
        Ok(outcome)
    }

    /// Pick up a refund the gateway issued but this side never recorded
    ///
    /// Covers a crash between the gateway call and the local write.
    pub async fn recover_refund(&self, payment_id: &str) -> FulfillmentResult<Option<RefundOutcome>> {
        let payment = self.payments.require(payment_id)?;
        if payment.status != PaymentStatus::Completed {
            return Ok(None);
        }

        let target = charge_reference(&payment);
        let receipt = call_with_retry("gateway.find_refund", self.settings.gateway_timeout, || {
            self.gateway.find_refund(target)
        })
        .await
        .map_err(|e| FulfillmentError::GatewayUnavailable(e.to_string()))?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        if receipt.amount > payment.amount {
            return Err(FulfillmentError::RefundExceedsPayment {
                requested: receipt.amount,
                paid: payment.amount,
            });
        }

        let now = self.clock.now_millis();
        let outcome = self.payments.write(|txn| {
            self.apply_refund(
                txn,
                payment_id,
                receipt.amount,
                &receipt.refund_ref,
                "refund recovered from gateway",
                now,
            )
        })?;
        tracing::warn!(payment_id, refund_ref = %receipt.refund_ref, "Recovered unrecorded refund");
        Ok(Some(outcome))
    }

    fn apply_refund(
        &self,
        txn: &WriteTransaction,
        payment_id: &str,
        amount: Decimal,
        refund_ref: &str,
        reason: &str,
        now: i64,
    ) -> FulfillmentResult<RefundOutcome> {
        let mut payment = self.payments.require_in(txn, payment_id)?;
        match payment.status {
            PaymentStatus::Refunded => {
                return Ok(RefundOutcome {
                    payment,
                    applied: false,
                    transition: None,
                });
            }
            PaymentStatus::Completed => {}
            status => {
                tracing::error!(payment_id, ?status, refund_ref, "Gateway refunded a payment that is not completed");
                return Err(FulfillmentError::PaymentNotRefundable {
                    payment_id: payment_id.to_string(),
                    status,
                });
            }
        }

        payment.status = PaymentStatus::Refunded;
        payment.refund_amount = Some(amount);
        payment.refund_reason = Some(reason.to_string());
        payment.refund_ref = Some(refund_ref.to_string());
        payment.refunded_at = Some(now);
        payment.updated_at = now;
        self.payments.store_in(txn, &payment)?;

        let mut transition = None;
        if let Some(mut order) = self.orders.load_in(txn, &payment.order_id)? {
            let system = Actor::system();
            let from = apply_forced_cancel(&mut order, &system, reason, now);
            if order.payment_id.as_deref() == Some(payment_id) {
                order.payment_status = Some(PaymentStatus::Refunded);
            }
            if from.is_none() {
                order.touch(now);
            }
            self.orders.store_in(txn, &order)?;
            transition = from.map(|from| Transition {
                order: order.clone(),
                from,
                to: OrderStatus::Cancelled,
                actor: system,
            });
        }

        Ok(RefundOutcome {
            payment,
            applied: true,
            transition,
        })
    }

    /// Mark the order's open payment cancelled
    ///
    /// Returns the payment when one was open.
    pub fn cancel_open_payment(&self, order_id: &str) -> FulfillmentResult<Option<Payment>> {
        let now = self.clock.now_millis();
        self.payments.write(|txn| -> FulfillmentResult<Option<Payment>> {
            let Some(mut payment) = self.payments.for_order_in(txn, order_id)? else {
                return Ok(None);
            };
            if !payment.status.is_open() {
                return Ok(None);
            }
            payment.status = PaymentStatus::Cancelled;
            payment.updated_at = now;
            self.payments.store_in(txn, &payment)?;
            self.sync_order(txn, &payment, now, false)?;
            Ok(Some(payment))
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_payment(&self, payment_id: &str) -> FulfillmentResult<Payment> {
        Ok(self.payments.require(payment_id)?)
    }

    /// Latest payment attempt of an order
    pub fn payment_for_order(&self, order_id: &str) -> FulfillmentResult<Option<Payment>> {
        Ok(self.payments.for_order(order_id)?)
    }
}

/// An open attempt is handed back, a settled one blocks a new checkout
fn reusable_payment(order_id: &str, existing: Option<Payment>) -> FulfillmentResult<Option<Payment>> {
    let Some(existing) = existing else {
        return Ok(None);
    };
    match existing.status {
        status if status.is_open() => Ok(Some(existing)),
        PaymentStatus::Completed | PaymentStatus::Refunded => Err(FulfillmentError::CheckoutNotAllowed {
            order_id: order_id.to_string(),
            reason: format!("payment already {:?}", existing.status).to_lowercase(),
        }),
        _ => Ok(None),
    }
}

/// Orders that are cancelled or completed cannot start a checkout
fn ensure_payable(order: &Order) -> FulfillmentResult<()> {
    if order.status.is_terminal() {
        return Err(FulfillmentError::CheckoutNotAllowed {
            order_id: order.order_id.clone(),
            reason: format!("order is {}", order.status.as_str()),
        });
    }
    Ok(())
}

/// Charge reference when known, checkout session otherwise
fn charge_reference(payment: &Payment) -> &str {
    payment
        .gateway_ref
        .as_deref()
        .unwrap_or(payment.session_ref.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::testing::FakeGateway;
    use crate::utils::ManualClock;
    use shared::order::{LineItem, OrderSource, OrderTotals};

    const START: i64 = 1_700_000_000_000;

    struct Fixture {
        reconciler: PaymentReconciler,
        orders: OrderStorage,
        gateway: Arc<FakeGateway>,
        clock: Arc<ManualClock>,
    }

    fn fixture_with(settings: PaymentSettings) -> Fixture {
        let db = db::open_in_memory().unwrap();
        let orders = OrderStorage::new(db.clone()).unwrap();
        let payments = PaymentStorage::new(db).unwrap();
        let gateway = Arc::new(FakeGateway::new());
        let clock = Arc::new(ManualClock::new(START));
        let reconciler = PaymentReconciler::new(
            payments,
            orders.clone(),
            gateway.clone(),
            clock.clone(),
            settings,
        );
        Fixture {
            reconciler,
            orders,
            gateway,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(PaymentSettings::default())
    }

    fn seed_order(f: &Fixture, order_id: &str) -> Order {
        let item = LineItem {
            item_id: "burger".to_string(),
            name: "Smash Burger".to_string(),
            unit_price: Decimal::new(500, 0),
            quantity: 1,
            line_total: Decimal::new(500, 0),
        };
        let totals = OrderTotals {
            subtotal: Decimal::new(500, 0),
            delivery_fee: Decimal::new(50, 0),
            discount: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::new(550, 0),
        };
        let order = Order::new(
            order_id.to_string(),
            "cust-1".to_string(),
            OrderSource::App,
            vec![item],
            totals,
            OrderStatus::Placed,
            None,
            &Actor::customer("cust-1"),
            START,
        );
        f.orders.insert(&order).unwrap();
        order
    }

    fn set_status(f: &Fixture, order_id: &str, status: OrderStatus) {
        f.orders
            .update(order_id, |order: &mut Order| -> FulfillmentResult<()> {
                order.push_status(status, &Actor::staff("staff-1"), START, None);
                Ok(())
            })
            .unwrap();
    }

    fn succeeded(event_id: &str, session_ref: &str) -> GatewayEvent {
        GatewayEvent {
            event_id: event_id.to_string(),
            session_ref: Some(session_ref.to_string()),
            gateway_ref: Some(format!("ch-{session_ref}")),
            kind: GatewayEventKind::PaymentSucceeded,
        }
    }

    async fn paid_order(f: &Fixture, order_id: &str) -> Payment {
        seed_order(f, order_id);
        let payment = f
            .reconciler
            .start_checkout(order_id, &Actor::customer("cust-1"))
            .await
            .unwrap();
        f.reconciler
            .handle_event(&succeeded(&format!("evt-{order_id}"), &payment.session_ref))
            .unwrap()
            .payment
    }

    #[tokio::test]
    async fn test_checkout_links_pending_payment() {
        let f = fixture();
        seed_order(&f, "o-1");
        let payment = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.amount, Decimal::new(550, 0));

        let order = f.orders.require("o-1").unwrap();
        assert_eq!(order.payment_id.as_deref(), Some(payment.payment_id.as_str()));
        assert_eq!(order.payment_status, Some(PaymentStatus::Pending));

        // An open attempt is reused
        let again = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();
        assert_eq!(again.payment_id, payment.payment_id);
        assert_eq!(f.gateway.checkout_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_checkouts_link_one_payment() {
        let f = fixture();
        seed_order(&f, "o-1");
        f.gateway.delay_checkouts(std::time::Duration::from_millis(50));

        let first = {
            let reconciler = f.reconciler.clone();
            tokio::spawn(async move {
                reconciler
                    .start_checkout("o-1", &Actor::customer("cust-1"))
                    .await
            })
        };
        let second = {
            let reconciler = f.reconciler.clone();
            tokio::spawn(async move {
                reconciler
                    .start_checkout("o-1", &Actor::customer("cust-1"))
                    .await
            })
        };
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert_eq!(first.payment_id, second.payment_id);
        assert_eq!(first.session_ref, second.session_ref);
        let order = f.orders.require("o-1").unwrap();
        assert_eq!(order.payment_id.as_deref(), Some(first.payment_id.as_str()));
        let linked = f.reconciler.payment_for_order("o-1").unwrap().unwrap();
        assert_eq!(linked.payment_id, first.payment_id);

        // The surviving session settles the order
        let update = f
            .reconciler
            .handle_event(&succeeded("evt-1", &first.session_ref))
            .unwrap();
        assert_eq!(update.outcome, ReconcileOutcome::Completed);
        let order = f.orders.require("o-1").unwrap();
        assert_eq!(order.payment_status, Some(PaymentStatus::Completed));
    }

    #[tokio::test]
    async fn test_checkout_rejected_for_other_customer_and_cancelled_order() {
        let f = fixture();
        seed_order(&f, "o-1");
        let err = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotAuthorized(_)));

        set_status(&f, "o-1", OrderStatus::Cancelled);
        let err = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::CheckoutNotAllowed { .. }));
    }

    #[tokio::test]
    async fn test_checkout_gateway_failure_leaves_no_payment() {
        let f = fixture();
        seed_order(&f, "o-1");
        f.gateway.fail_checkouts(2);
        let err = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::CheckoutFailed(_)));
        assert!(err.is_retryable());
        assert!(f.reconciler.payment_for_order("o-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_success_event_is_idempotent() {
        let f = fixture();
        seed_order(&f, "o-1");
        let payment = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();

        let first = f
            .reconciler
            .handle_event(&succeeded("evt-1", &payment.session_ref))
            .unwrap();
        assert_eq!(first.outcome, ReconcileOutcome::Completed);
        assert_eq!(first.payment.paid_at, Some(START));

        f.clock.advance(60_000);
        let replay = f
            .reconciler
            .handle_event(&succeeded("evt-1", &payment.session_ref))
            .unwrap();
        assert_eq!(replay.outcome, ReconcileOutcome::Duplicate);

        // Same outcome under a new event ID changes nothing either
        let second = f
            .reconciler
            .handle_event(&succeeded("evt-2", &payment.session_ref))
            .unwrap();
        assert_eq!(second.outcome, ReconcileOutcome::Unchanged);
        assert_eq!(second.payment.paid_at, Some(START));

        let order = f.orders.require("o-1").unwrap();
        assert_eq!(order.payment_status, Some(PaymentStatus::Completed));
        assert_eq!(order.status, OrderStatus::Placed);
    }

    #[tokio::test]
    async fn test_failure_event_keeps_order_open() {
        let f = fixture();
        seed_order(&f, "o-1");
        let payment = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();
        let event = GatewayEvent {
            event_id: "evt-f".to_string(),
            session_ref: Some(payment.session_ref.clone()),
            gateway_ref: None,
            kind: GatewayEventKind::PaymentFailed {
                reason: "card_declined".to_string(),
            },
        };
        let update = f.reconciler.handle_event(&event).unwrap();
        assert_eq!(update.outcome, ReconcileOutcome::Failed);
        assert_eq!(update.payment.failure_reason.as_deref(), Some("card_declined"));

        let order = f.orders.require("o-1").unwrap();
        assert_eq!(order.status, OrderStatus::Placed);
        assert_eq!(order.payment_status, Some(PaymentStatus::Failed));

        // A fresh checkout replaces the failed attempt
        let retry = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();
        assert_ne!(retry.payment_id, payment.payment_id);
    }

    #[tokio::test]
    async fn test_failure_after_success_is_ignored() {
        let f = fixture();
        let payment = paid_order(&f, "o-1").await;
        let event = GatewayEvent {
            event_id: "evt-late".to_string(),
            session_ref: Some(payment.session_ref.clone()),
            gateway_ref: None,
            kind: GatewayEventKind::PaymentFailed {
                reason: "expired".to_string(),
            },
        };
        let update = f.reconciler.handle_event(&event).unwrap();
        assert_eq!(update.outcome, ReconcileOutcome::Unchanged);
        assert_eq!(update.payment.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_unknown_event_reference() {
        let f = fixture();
        let err = f.reconciler.handle_event(&succeeded("evt-x", "nope")).unwrap_err();
        assert!(matches!(err, FulfillmentError::PaymentNotFound(_)));
    }

    #[tokio::test]
    async fn test_verify_checkout() {
        let f = fixture();
        seed_order(&f, "o-1");
        let payment = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();

        let pending = f.reconciler.verify_checkout(&payment.session_ref).await.unwrap();
        assert_eq!(pending.outcome, ReconcileOutcome::Processing);
        assert_eq!(pending.payment.status, PaymentStatus::Processing);

        f.gateway.mark_paid(&payment.session_ref, "ch-1");
        let paid = f.reconciler.verify_checkout(&payment.session_ref).await.unwrap();
        assert_eq!(paid.outcome, ReconcileOutcome::Completed);
        assert_eq!(paid.payment.gateway_ref.as_deref(), Some("ch-1"));

        let err = f.reconciler.verify_checkout("missing").await.unwrap_err();
        assert!(matches!(err, FulfillmentError::PaymentNotFound(_)));
    }

    #[tokio::test]
    async fn test_auto_accept_moves_order_to_processing() {
        let settings = PaymentSettings {
            auto_accept_paid_orders: true,
            ..PaymentSettings::default()
        };
        let f = fixture_with(settings);
        seed_order(&f, "o-1");
        let payment = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();
        let update = f
            .reconciler
            .handle_event(&succeeded("evt-1", &payment.session_ref))
            .unwrap();
        let transition = update.transition.unwrap();
        assert_eq!(transition.from, OrderStatus::Placed);
        assert_eq!(transition.to, OrderStatus::Processing);
        assert_eq!(f.orders.require("o-1").unwrap().status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_refund_validation() {
        let f = fixture();
        seed_order(&f, "o-1");
        let pending = f
            .reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();
        let staff = Actor::staff("staff-1");

        let err = f
            .reconciler
            .refund(&pending.payment_id, None, "nope", &staff)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::PaymentNotRefundable { .. }));

        let paid = paid_order(&f, "o-2").await;
        let err = f
            .reconciler
            .refund(&paid.payment_id, Some(Decimal::new(600, 0)), "too much", &staff)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::RefundExceedsPayment { .. }));

        let err = f
            .reconciler
            .refund(&paid.payment_id, Some(Decimal::ZERO), "zero", &staff)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::InvalidAmount(_)));

        let err = f
            .reconciler
            .refund(&paid.payment_id, None, "mine", &Actor::customer("cust-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotAuthorized(_)));
        assert!(f.gateway.refund_calls().is_empty());
    }

    #[tokio::test]
    async fn test_refund_cancels_undelivered_order() {
        let f = fixture();
        let payment = paid_order(&f, "o-1").await;
        let outcome = f
            .reconciler
            .refund(&payment.payment_id, None, "kitchen closed", &Actor::staff("staff-1"))
            .await
            .unwrap();

        assert!(outcome.applied);
        assert_eq!(outcome.payment.status, PaymentStatus::Refunded);
        assert_eq!(outcome.payment.refund_amount, Some(Decimal::new(550, 0)));
        assert!(outcome.payment.invariants_hold());

        let transition = outcome.transition.unwrap();
        assert_eq!(transition.from, OrderStatus::Placed);
        let order = f.orders.require("o-1").unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment_status, Some(PaymentStatus::Refunded));
        assert_eq!(
            order.cancellation.as_ref().map(|c| c.reason.as_str()),
            Some("kitchen closed")
        );
        assert!(order.history_consistent());
        assert_eq!(
            f.gateway.refund_calls(),
            vec![(format!("ch-{}", payment.session_ref), Decimal::new(550, 0))]
        );
    }

    #[tokio::test]
    async fn test_partial_refund_of_delivered_order_keeps_status() {
        let f = fixture();
        let payment = paid_order(&f, "o-1").await;
        set_status(&f, "o-1", OrderStatus::Delivered);

        let outcome = f
            .reconciler
            .refund(
                &payment.payment_id,
                Some(Decimal::new(100, 0)),
                "cold fries",
                &Actor::staff("staff-1"),
            )
            .await
            .unwrap();
        assert!(outcome.transition.is_none());
        assert_eq!(outcome.payment.refund_amount, Some(Decimal::new(100, 0)));
        assert_eq!(f.orders.require("o-1").unwrap().status, OrderStatus::Delivered);

        // Refunded payments are not refundable again
        let err = f
            .reconciler
            .refund(&payment.payment_id, None, "again", &Actor::staff("staff-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::PaymentNotRefundable { .. }));
    }

    #[tokio::test]
    async fn test_refund_gateway_failure_changes_nothing() {
        let f = fixture();
        let payment = paid_order(&f, "o-1").await;
        f.gateway.fail_refunds(2);

        let err = f
            .reconciler
            .refund(&payment.payment_id, None, "oops", &Actor::staff("staff-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::RefundFailed(_)));
        assert!(err.is_retryable());

        let stored = f.reconciler.get_payment(&payment.payment_id).unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(f.orders.require("o-1").unwrap().status, OrderStatus::Placed);
    }

    #[tokio::test]
    async fn test_refund_retries_once() {
        let f = fixture();
        let payment = paid_order(&f, "o-1").await;
        f.gateway.fail_refunds(1);
        let outcome = f
            .reconciler
            .refund(&payment.payment_id, None, "retry", &Actor::staff("staff-1"))
            .await
            .unwrap();
        assert_eq!(outcome.payment.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_recover_refund_from_gateway() {
        let f = fixture();
        let payment = paid_order(&f, "o-1").await;
        assert!(f.reconciler.recover_refund(&payment.payment_id).await.unwrap().is_none());

        let charge = payment.gateway_ref.clone().unwrap();
        f.gateway.record_refund(&charge, "re-lost", Decimal::new(550, 0));
        let outcome = f
            .reconciler
            .recover_refund(&payment.payment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.payment.status, PaymentStatus::Refunded);
        assert_eq!(outcome.payment.refund_ref.as_deref(), Some("re-lost"));
        assert_eq!(f.orders.require("o-1").unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_open_payment() {
        let f = fixture();
        seed_order(&f, "o-1");
        f.reconciler
            .start_checkout("o-1", &Actor::customer("cust-1"))
            .await
            .unwrap();
        let cancelled = f.reconciler.cancel_open_payment("o-1").unwrap().unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
        assert_eq!(
            f.orders.require("o-1").unwrap().payment_status,
            Some(PaymentStatus::Cancelled)
        );
        assert!(f.reconciler.cancel_open_payment("o-1").unwrap().is_none());

        let paid = paid_order(&f, "o-2").await;
        assert!(f.reconciler.cancel_open_payment("o-2").unwrap().is_none());
        assert_eq!(
            f.reconciler.get_payment(&paid.payment_id).unwrap().status,
            PaymentStatus::Completed
        );
    }
}
