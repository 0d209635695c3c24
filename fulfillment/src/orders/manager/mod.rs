//! OrdersManager - the order state machine
//!
//! Owns the canonical order record. Every status change goes through
//! [`OrderStorage::update`], so validation and write happen under the single
//! redb writer: of two racing transitions from the same status exactly one
//! commits, and the other validates against the committed result and fails
//! with a state error.
//!
//! The manager performs no side effects. Callers receive a [`Transition`]
//! describing what committed and fan out from there.

use crate::core::Config;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::orders::money;
use crate::orders::storage::OrderStorage;
use crate::orders::transitions;
use crate::services::Catalog;
use crate::utils::Clock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::order::{
    Actor, ActorRole, Cancellation, LineItem, Order, OrderSource, OrderStatus, ReturnRequest,
    ReturnStatus,
};
use std::sync::Arc;

/// One requested line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderItem {
    pub item_id: String,
    pub quantity: u32,
}

impl PlaceOrderItem {
    pub fn new(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Placement request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub customer_id: String,
    pub items: Vec<PlaceOrderItem>,
    #[serde(default)]
    pub scheduled_for: Option<i64>,
    #[serde(default)]
    pub delivery_fee: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

impl PlaceOrder {
    pub fn new(customer_id: impl Into<String>, items: Vec<PlaceOrderItem>) -> Self {
        Self {
            customer_id: customer_id.into(),
            items,
            scheduled_for: None,
            delivery_fee: Decimal::ZERO,
            discount: Decimal::ZERO,
            note: None,
        }
    }
}

/// Time bounds and pricing rules applied by the state machine
#[derive(Debug, Clone)]
pub struct OrderPolicy {
    pub tax_rate: Decimal,
    pub customer_cancel_window_ms: i64,
    pub return_window_ms: i64,
    pub schedule_min_lead_ms: i64,
    pub schedule_horizon_ms: i64,
}

impl OrderPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tax_rate: config.tax_rate,
            customer_cancel_window_ms: config.customer_cancel_window_ms,
            return_window_ms: config.return_window_ms,
            schedule_min_lead_ms: config.schedule_min_lead_ms,
            schedule_horizon_ms: config.schedule_horizon_ms,
        }
    }
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A committed status change
#[derive(Debug, Clone)]
pub struct Transition {
    /// Order as written
    pub order: Order,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Actor,
}

/// Order state machine
#[derive(Clone)]
pub struct OrdersManager {
    storage: OrderStorage,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    policy: OrderPolicy,
}

impl std::fmt::Debug for OrdersManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersManager")
            .field("storage", &self.storage)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl OrdersManager {
    pub fn new(
        storage: OrderStorage,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
        policy: OrderPolicy,
    ) -> Self {
        Self {
            storage,
            catalog,
            clock,
            policy,
        }
    }

    pub fn storage(&self) -> &OrderStorage {
        &self.storage
    }

    pub fn policy(&self) -> &OrderPolicy {
        &self.policy
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    // ========== Placement ==========

    /// Validate, snapshot and persist a new order
    ///
    /// Customers place for themselves; staff and admins place at the point
    /// of sale on a customer's behalf.
    pub fn place(&self, actor: &Actor, input: PlaceOrder) -> FulfillmentResult<Order> {
        let source = match actor.role {
            ActorRole::Customer if input.customer_id == actor.id => OrderSource::App,
            ActorRole::Customer => {
                return Err(FulfillmentError::NotAuthorized(format!(
                    "{} cannot place orders for {}",
                    actor.id, input.customer_id
                )));
            }
            ActorRole::Staff | ActorRole::Admin => OrderSource::PointOfSale,
            ActorRole::System => {
                return Err(FulfillmentError::NotAuthorized(
                    "system actor cannot place orders".into(),
                ));
            }
        };
        if input.items.is_empty() {
            return Err(FulfillmentError::EmptyOrder);
        }

        let items = self.snapshot_items(&input.items)?;
        let now = self.clock.now_millis();
        let status = self.initial_status(input.scheduled_for, now)?;
        let totals = money::compute_totals(
            &items,
            input.delivery_fee,
            input.discount,
            self.policy.tax_rate,
        )?;

        let mut order = Order::new(
            shared::util::new_id(),
            input.customer_id,
            source,
            items,
            totals,
            status,
            input.scheduled_for,
            actor,
            now,
        );
        order.note = input.note;
        self.storage.insert(&order)?;

        tracing::info!(
            order_id = %order.order_id,
            customer_id = %order.customer_id,
            status = %order.status,
            total = %order.total,
            "Order placed"
        );
        Ok(order)
    }

    fn snapshot_items(&self, requested: &[PlaceOrderItem]) -> FulfillmentResult<Vec<LineItem>> {
        requested
            .iter()
            .map(|req| {
                if req.quantity == 0 || req.quantity > money::MAX_QUANTITY {
                    return Err(FulfillmentError::InvalidItem(format!(
                        "{}: quantity must be between 1 and {}, got {}",
                        req.item_id,
                        money::MAX_QUANTITY,
                        req.quantity
                    )));
                }
                let item = self.catalog.lookup_item(&req.item_id).ok_or_else(|| {
                    FulfillmentError::InvalidItem(format!("{}: unknown item", req.item_id))
                })?;
                if !item.is_available {
                    return Err(FulfillmentError::InvalidItem(format!(
                        "{}: currently unavailable",
                        req.item_id
                    )));
                }
                if item.price < Decimal::ZERO || item.price > money::MAX_PRICE {
                    return Err(FulfillmentError::InvalidItem(format!(
                        "{}: price {} out of range",
                        req.item_id, item.price
                    )));
                }
                Ok(LineItem {
                    item_id: item.item_id,
                    name: item.name,
                    unit_price: item.price,
                    quantity: req.quantity,
                    line_total: money::line_total(item.price, req.quantity),
                })
            })
            .collect()
    }

    /// `Scheduled` for a time within `[now + lead, now + horizon]`, `Placed`
    /// when no time or a near-immediate one is given
    fn initial_status(&self, scheduled_for: Option<i64>, now: i64) -> FulfillmentResult<OrderStatus> {
        match scheduled_for {
            None => Ok(OrderStatus::Placed),
            Some(at) if at < now => Err(FulfillmentError::InvalidSchedule(format!(
                "scheduled time {} is in the past",
                at
            ))),
            Some(at) if at > now + self.policy.schedule_horizon_ms => {
                Err(FulfillmentError::InvalidSchedule(format!(
                    "scheduled time {} is beyond the {} day horizon",
                    at,
                    self.policy.schedule_horizon_ms / shared::util::DAY_MS
                )))
            }
            Some(at) if at >= now + self.policy.schedule_min_lead_ms => Ok(OrderStatus::Scheduled),
            Some(_) => Ok(OrderStatus::Placed),
        }
    }

    // ========== Transitions ==========

    /// Move an order to `target`
    ///
    /// A `Cancelled` target is handled by [`Self::cancel`] so the window and
    /// cancellation metadata rules apply.
    pub fn transition(
        &self,
        order_id: &str,
        target: OrderStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> FulfillmentResult<Transition> {
        if target == OrderStatus::Cancelled {
            let reason = note.unwrap_or_else(|| format!("cancelled by {}", actor.role));
            return self.cancel(order_id, actor, reason);
        }

        let now = self.clock.now_millis();
        let (order, from) = self.storage.update(order_id, |order: &mut Order| -> FulfillmentResult<OrderStatus> {
            authorize(order, actor)?;
            let from = order.status;
            if !transitions::is_allowed(from, target, actor.role) {
                return Err(FulfillmentError::IllegalTransition {
                    order_id: order.order_id.clone(),
                    from,
                    to: target,
                    role: actor.role,
                });
            }
            order.push_status(target, actor, now, note);
            Ok(from)
        })?;

        tracing::info!(
            order_id = %order_id,
            from = %from,
            to = %target,
            actor = %actor.id,
            role = %actor.role,
            "Order transitioned"
        );
        Ok(Transition {
            order,
            from,
            to: target,
            actor: actor.clone(),
        })
    }

    /// Cancel from `Scheduled`, `Placed` or `Processing`
    ///
    /// Customers must cancel within the window after creation; staff and
    /// admins are exempt.
    pub fn cancel(&self, order_id: &str, actor: &Actor, reason: String) -> FulfillmentResult<Transition> {
        let now = self.clock.now_millis();
        let window = self.policy.customer_cancel_window_ms;
        let (order, from) = self.storage.update(order_id, |order: &mut Order| -> FulfillmentResult<OrderStatus> {
            authorize(order, actor)?;
            let from = order.status;
            if !from.is_cancellable() {
                return Err(FulfillmentError::NotCancellable {
                    order_id: order.order_id.clone(),
                    status: from,
                });
            }
            if actor.role == ActorRole::Customer && now - order.created_at > window {
                return Err(FulfillmentError::CancellationWindowExpired {
                    order_id: order.order_id.clone(),
                });
            }
            if !transitions::is_allowed(from, OrderStatus::Cancelled, actor.role) {
                return Err(FulfillmentError::IllegalTransition {
                    order_id: order.order_id.clone(),
                    from,
                    to: OrderStatus::Cancelled,
                    role: actor.role,
                });
            }
            mark_cancelled(order, actor, &reason, now);
            Ok(from)
        })?;

        tracing::info!(
            order_id = %order_id,
            from = %from,
            actor = %actor.id,
            role = %actor.role,
            reason = %reason,
            "Order cancelled"
        );
        Ok(Transition {
            order,
            from,
            to: OrderStatus::Cancelled,
            actor: actor.clone(),
        })
    }

    /// Release every scheduled order whose time has come
    pub fn release_due_scheduled(&self, now: i64) -> FulfillmentResult<Vec<Transition>> {
        let system = Actor::system();
        let mut released = Vec::new();
        for order_id in self.storage.due_scheduled(now)? {
            let (order, changed) = self.storage.update(&order_id, |order: &mut Order| {
                // Re-checked under the writer: a cancel may have won the race
                if order.status != OrderStatus::Scheduled {
                    return Ok::<_, FulfillmentError>(false);
                }
                order.push_status(
                    OrderStatus::Placed,
                    &system,
                    now,
                    Some("scheduled release".into()),
                );
                Ok(true)
            })?;
            if changed {
                tracing::info!(order_id = %order_id, "Scheduled order released");
                released.push(Transition {
                    order,
                    from: OrderStatus::Scheduled,
                    to: OrderStatus::Placed,
                    actor: system.clone(),
                });
            }
        }
        Ok(released)
    }

    // ========== Returns ==========

    /// Attach a return request to a delivered order
    ///
    /// At most one open request per order, within the return window after
    /// delivery. An approved return blocks further requests; a rejected one
    /// can be re-filed. Status is unchanged.
    pub fn request_return(&self, order_id: &str, actor: &Actor, reason: String) -> FulfillmentResult<Order> {
        let now = self.clock.now_millis();
        let window = self.policy.return_window_ms;
        let (order, ()) = self.storage.update(order_id, |order: &mut Order| -> FulfillmentResult<()> {
            authorize(order, actor)?;
            // A rejected request may be replaced; its history stays in the audit log
            if order
                .return_request
                .as_ref()
                .is_some_and(|r| r.status != ReturnStatus::Rejected)
            {
                return Err(FulfillmentError::ReturnAlreadyRequested(order.order_id.clone()));
            }
            let delivered_at = match order.delivered_at() {
                Some(at) if order.status.is_fulfilled() => at,
                _ => {
                    return Err(FulfillmentError::ReturnNotAllowed {
                        order_id: order.order_id.clone(),
                        status: order.status,
                    });
                }
            };
            if now - delivered_at > window {
                return Err(FulfillmentError::ReturnWindowExpired(order.order_id.clone()));
            }
            order.return_request = Some(ReturnRequest {
                reason: reason.clone(),
                requested_by: actor.id.clone(),
                requested_at: now,
                status: ReturnStatus::Open,
                resolved_by: None,
                resolved_at: None,
                resolution_note: None,
            });
            order.touch(now);
            Ok(())
        })?;

        tracing::info!(order_id = %order_id, actor = %actor.id, "Return requested");
        Ok(order)
    }

    /// Approve or reject an open return request (staff/admin)
    pub fn resolve_return(
        &self,
        order_id: &str,
        actor: &Actor,
        approve: bool,
        note: Option<String>,
    ) -> FulfillmentResult<Order> {
        if !actor.role.is_privileged() {
            return Err(FulfillmentError::NotAuthorized(format!(
                "{} cannot resolve returns",
                actor.role
            )));
        }
        let now = self.clock.now_millis();
        let (order, ()) = self.storage.update(order_id, |order: &mut Order| -> FulfillmentResult<()> {
            let request = match order.return_request.as_mut() {
                Some(r) if r.status == ReturnStatus::Open => r,
                _ => return Err(FulfillmentError::ReturnNotOpen(order.order_id.clone())),
            };
            request.status = if approve {
                ReturnStatus::Approved
            } else {
                ReturnStatus::Rejected
            };
            request.resolved_by = Some(actor.id.clone());
            request.resolved_at = Some(now);
            request.resolution_note = note;
            order.touch(now);
            Ok(())
        })?;

        tracing::info!(order_id = %order_id, approved = approve, actor = %actor.id, "Return resolved");
        Ok(order)
    }

    // ========== Reads ==========

    pub fn get_order(&self, order_id: &str, actor: &Actor) -> FulfillmentResult<Order> {
        let order = self.storage.require(order_id)?;
        authorize(&order, actor)?;
        Ok(order)
    }

    pub fn list_for_customer(&self, customer_id: &str, actor: &Actor) -> FulfillmentResult<Vec<Order>> {
        if actor.role == ActorRole::Customer && actor.id != customer_id {
            return Err(FulfillmentError::NotAuthorized(format!(
                "{} cannot list orders of {}",
                actor.id, customer_id
            )));
        }
        Ok(self.storage.list_for_customer(customer_id)?)
    }
}

/// Customers may only act on their own orders
pub(crate) fn authorize(order: &Order, actor: &Actor) -> FulfillmentResult<()> {
    if actor.role == ActorRole::Customer && order.customer_id != actor.id {
        return Err(FulfillmentError::NotAuthorized(format!(
            "order {} does not belong to {}",
            order.order_id, actor.id
        )));
    }
    Ok(())
}

fn mark_cancelled(order: &mut Order, actor: &Actor, reason: &str, now: i64) {
    order.cancellation = Some(Cancellation {
        reason: reason.to_string(),
        cancelled_by: actor.id.clone(),
        cancelled_by_role: actor.role,
        cancelled_at: now,
    });
    order.push_status(OrderStatus::Cancelled, actor, now, Some(reason.to_string()));
}

/// Cancel after a confirmed refund, bypassing the transition table
///
/// Orders already delivered, completed or cancelled keep their status.
/// Returns the previous status when a change was made.
pub(crate) fn apply_forced_cancel(
    order: &mut Order,
    actor: &Actor,
    reason: &str,
    now: i64,
) -> Option<OrderStatus> {
    let from = order.status;
    if matches!(
        from,
        OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Cancelled
    ) {
        return None;
    }
    mark_cancelled(order, actor, reason, now);
    Some(from)
}

#[cfg(test)]
mod tests;
