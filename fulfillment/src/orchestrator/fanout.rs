//! Side effects fired after an order or payment write commits
//!
//! Every method here only schedules work on the [`EffectRunner`] and
//! returns. Nothing is awaited on the caller's path, so a slow transport or
//! a failing ledger never changes the outcome of the operation that
//! triggered it.

use crate::audit::{Activity, AuditAction, AuditService};
use crate::effects::EffectRunner;
use crate::inventory::InventoryLedger;
use crate::notifications::NotificationDispatcher;
use crate::orders::{OrderStorage, Transition};
use crate::payment::{PaymentReconciler, PaymentUpdate, ReconcileOutcome, RefundOutcome};
use crate::rewards::RewardsLedger;
use crate::services::ProfileStore;
use crate::utils::Clock;
use serde_json::json;
use shared::models::{NotificationEvent, NotificationKind, Payment, PaymentStatus};
use shared::order::{Actor, Order, OrderStatus};
use std::sync::Arc;

/// Reason attached to refunds of payments confirmed after cancellation
pub const LATE_PAYMENT_REASON: &str = "payment confirmed after cancellation";

pub(crate) fn status_notification(status: OrderStatus) -> NotificationKind {
    match status {
        OrderStatus::Scheduled => NotificationKind::OrderScheduled,
        OrderStatus::Placed => NotificationKind::OrderPlaced,
        OrderStatus::Processing => NotificationKind::OrderProcessing,
        OrderStatus::Ready => NotificationKind::OrderReady,
        OrderStatus::OutForDelivery => NotificationKind::OrderOutForDelivery,
        OrderStatus::Delivered => NotificationKind::OrderDelivered,
        OrderStatus::Completed => NotificationKind::OrderCompleted,
        OrderStatus::Cancelled => NotificationKind::OrderCancelled,
    }
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[derive(Clone)]
pub(crate) struct SideEffects {
    pub runner: EffectRunner,
    pub orders: OrderStorage,
    pub inventory: InventoryLedger,
    pub rewards: RewardsLedger,
    pub notifications: NotificationDispatcher,
    pub payments: PaymentReconciler,
    pub profiles: Arc<dyn ProfileStore>,
    pub audit: AuditService,
    pub clock: Arc<dyn Clock>,
}

impl SideEffects {
    // ========== Primitives ==========

    pub fn audit(&self, activity: Activity) {
        let audit = self.audit.clone();
        let subject = activity.resource_id.clone();
        self.runner.spawn("audit", subject, async move {
            audit.log(activity).await;
            Ok(())
        });
    }

    pub fn notify(&self, event: NotificationEvent) {
        let dispatcher = self.notifications.clone();
        let subject = event.order_id.clone().unwrap_or_else(|| event.user_id.clone());
        self.runner.spawn("notification", subject, async move {
            let notification = dispatcher.dispatch(&event).await?;
            tracing::debug!(
                notification_id = %notification.notification_id,
                user_id = %notification.user_id,
                kind = ?notification.kind,
                "Notification recorded"
            );
            Ok(())
        });
    }

    fn order_event(&self, kind: NotificationKind, order: &Order) -> NotificationEvent {
        NotificationEvent::new(kind, order.customer_id.clone())
            .for_order(order.order_id.clone())
            .with("total", order.total.to_string())
    }

    // ========== Order lifecycle ==========

    pub fn order_placed(&self, order: &Order, actor: &Actor) {
        self.audit(
            Activity::new(
                AuditAction::OrderPlaced,
                "order",
                &order.order_id,
                actor,
                order.created_at,
            )
            .with_details(json!({
                "customer_id": order.customer_id,
                "status": order.status,
                "source": order.source,
                "total": order.total,
                "items": order.items.len(),
            })),
        );

        let mut event = self.order_event(status_notification(order.status), order);
        if let Some(at) = order.scheduled_for {
            event = event.with("scheduled_for", format_millis(at));
        }
        self.notify(event);

        if order.status == OrderStatus::Placed {
            self.deduct_inventory(order);
        }
    }

    /// Fan out a committed status change
    pub fn transitioned(&self, transition: &Transition) {
        let order = &transition.order;
        let note = order
            .status_history
            .last()
            .and_then(|entry| entry.note.clone());
        let action = if transition.to == OrderStatus::Cancelled {
            AuditAction::OrderCancelled
        } else {
            AuditAction::OrderTransitioned
        };
        self.audit(
            Activity::new(
                action,
                "order",
                &order.order_id,
                &transition.actor,
                order.updated_at,
            )
            .with_details(json!({
                "from": transition.from,
                "to": transition.to,
                "version": order.version,
                "note": note,
            })),
        );

        let mut event = self.order_event(status_notification(transition.to), order);
        if let Some(cancellation) = &order.cancellation {
            event = event.with("reason", cancellation.reason.clone());
        }
        self.notify(event);

        match transition.to {
            OrderStatus::Placed => self.deduct_inventory(order),
            OrderStatus::Delivered | OrderStatus::Completed => self.award_rewards(order),
            OrderStatus::Cancelled => self.settle_cancelled_payment(order, &transition.actor),
            _ => {}
        }
    }

    fn deduct_inventory(&self, order: &Order) {
        let ledger = self.inventory.clone();
        let audit = self.audit.clone();
        let clock = self.clock.clone();
        let order = order.clone();
        self.runner.spawn("inventory", order.order_id.clone(), async move {
            let deductions = ledger.deduct_for_order(&order)?;
            if !deductions.is_empty() {
                let activity = Activity::new(
                    AuditAction::StockDeducted,
                    "order",
                    &order.order_id,
                    &Actor::system(),
                    clock.now_millis(),
                )
                .with_details(json!({ "deductions": deductions }));
                audit.log(activity).await;
            }
            Ok(())
        });
    }

    fn award_rewards(&self, order: &Order) {
        let effects = self.clone();
        let order = order.clone();
        self.runner.spawn("rewards", order.order_id.clone(), async move {
            let referrer = effects.profiles.referrer_of(&order.customer_id).await;
            let outcome = effects
                .rewards
                .award_for_order(&order, referrer.as_deref())?;
            let system = Actor::system();

            if let Some(entry) = &outcome.earned {
                let account = effects.rewards.balance(&entry.user_id)?;
                effects.audit(
                    Activity::new(
                        AuditAction::PointsAwarded,
                        "rewards",
                        &entry.user_id,
                        &system,
                        entry.created_at,
                    )
                    .with_details(json!({
                        "order_id": order.order_id,
                        "points": entry.points,
                        "balance": account.balance,
                        "tier": account.tier,
                    })),
                );
                effects.notify(
                    NotificationEvent::new(NotificationKind::PointsEarned, entry.user_id.clone())
                        .for_order(order.order_id.clone())
                        .with("points", entry.points)
                        .with("balance", account.balance),
                );
            }
            if let Some(entry) = &outcome.referral {
                effects.audit(
                    Activity::new(
                        AuditAction::ReferralCredited,
                        "rewards",
                        &entry.user_id,
                        &system,
                        entry.created_at,
                    )
                    .with_details(json!({
                        "referee_id": entry.related_user_id,
                        "points": entry.points,
                    })),
                );
                effects.notify(
                    NotificationEvent::new(NotificationKind::ReferralBonus, entry.user_id.clone())
                        .with("points", entry.points),
                );
            }
            Ok(())
        });
    }

    // ========== Payments ==========

    /// A cancelled order refunds a completed payment and closes an open one
    fn settle_cancelled_payment(&self, order: &Order, actor: &Actor) {
        let Some(payment_status) = order.payment_status else {
            return;
        };
        let reason = order
            .cancellation
            .as_ref()
            .map(|c| c.reason.clone())
            .unwrap_or_else(|| "order cancelled".to_string());

        if payment_status == PaymentStatus::Completed {
            if let Some(payment_id) = &order.payment_id {
                let refunder = if actor.role.is_privileged() {
                    actor.clone()
                } else {
                    Actor::system()
                };
                self.refund(payment_id, reason, refunder);
            }
        } else if payment_status.is_open() {
            let payments = self.payments.clone();
            let order_id = order.order_id.clone();
            self.runner.spawn("payment", order_id.clone(), async move {
                if let Some(payment) = payments.cancel_open_payment(&order_id)? {
                    tracing::info!(
                        order_id = %order_id,
                        payment_id = %payment.payment_id,
                        "Open payment cancelled with its order"
                    );
                }
                Ok(())
            });
        }
    }

    /// Refund a completed payment in full
    pub fn refund(&self, payment_id: &str, reason: String, actor: Actor) {
        let effects = self.clone();
        let payment_id = payment_id.to_string();
        self.runner.spawn("refund", payment_id.clone(), async move {
            let outcome = effects
                .payments
                .refund(&payment_id, None, &reason, &actor)
                .await?;
            effects.refunded(&outcome, &actor);
            Ok(())
        });
    }

    pub fn refunded(&self, outcome: &RefundOutcome, actor: &Actor) {
        if !outcome.applied {
            return;
        }
        let payment = &outcome.payment;
        let amount = payment.refund_amount.unwrap_or(payment.amount);
        self.audit(
            Activity::new(
                AuditAction::PaymentRefunded,
                "payment",
                &payment.payment_id,
                actor,
                payment.refunded_at.unwrap_or(payment.updated_at),
            )
            .with_details(json!({
                "order_id": payment.order_id,
                "amount": amount,
                "refund_ref": payment.refund_ref,
                "reason": payment.refund_reason,
            })),
        );
        self.notify(
            NotificationEvent::new(NotificationKind::RefundIssued, payment.customer_id.clone())
                .for_order(payment.order_id.clone())
                .with("amount", format!("{} {}", amount, payment.currency)),
        );
        if let Some(transition) = &outcome.transition {
            self.transitioned(transition);
        }
    }

    pub fn payment_updated(&self, update: &PaymentUpdate) {
        let payment = &update.payment;
        match update.outcome {
            ReconcileOutcome::Completed => {
                self.payment_reconciled(payment);
                self.notify(
                    NotificationEvent::new(
                        NotificationKind::PaymentConfirmed,
                        payment.customer_id.clone(),
                    )
                    .for_order(payment.order_id.clone())
                    .with("amount", format!("{} {}", payment.amount, payment.currency)),
                );
                self.refund_if_order_cancelled(payment);
            }
            ReconcileOutcome::Failed => {
                self.payment_reconciled(payment);
                self.notify(
                    NotificationEvent::new(NotificationKind::PaymentFailed, payment.customer_id.clone())
                        .for_order(payment.order_id.clone())
                        .with(
                            "reason",
                            payment
                                .failure_reason
                                .clone()
                                .unwrap_or_else(|| "declined".to_string()),
                        ),
                );
            }
            ReconcileOutcome::Processing
            | ReconcileOutcome::Unchanged
            | ReconcileOutcome::Duplicate => {}
        }
        if let Some(transition) = &update.transition {
            self.transitioned(transition);
        }
    }

    fn payment_reconciled(&self, payment: &Payment) {
        self.audit(
            Activity::new(
                AuditAction::PaymentReconciled,
                "payment",
                &payment.payment_id,
                &Actor::system(),
                payment.updated_at,
            )
            .with_details(json!({
                "order_id": payment.order_id,
                "status": payment.status,
                "amount": payment.amount,
                "gateway_ref": payment.gateway_ref,
            })),
        );
    }

    /// Money captured for an order that was cancelled meanwhile goes back
    fn refund_if_order_cancelled(&self, payment: &Payment) {
        match self.orders.get(&payment.order_id) {
            Ok(Some(order)) if order.status == OrderStatus::Cancelled => {
                tracing::warn!(
                    order_id = %order.order_id,
                    payment_id = %payment.payment_id,
                    "Payment completed on a cancelled order, refunding"
                );
                self.refund(
                    &payment.payment_id,
                    LATE_PAYMENT_REASON.to_string(),
                    Actor::system(),
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(order_id = %payment.order_id, error = %e, "Failed to load order after payment");
            }
        }
    }
}
