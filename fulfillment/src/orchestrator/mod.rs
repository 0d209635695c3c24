//! Orchestrator - wiring and public operations
//!
//! Holds one instance of every component over a shared redb handle and
//! exposes the operations a thin CLI/HTTP layer calls. Each operation writes
//! through its owning component, then hands the committed result to
//! [`fanout`] for inventory, rewards, notifications and audit.
//!
//! # Component layout
//!
//! | Field | Type | Role |
//! |-------|------|------|
//! | manager | OrdersManager | state machine, canonical order record |
//! | payments | PaymentReconciler | checkout, gateway reconciliation, refunds |
//! | effects | SideEffects | post-commit fan-out over the ledgers and dispatch |
//! | audit_storage | Option<AuditStorage> | default audit sink, when none is injected |

mod fanout;
pub mod timeline;


pub use fanout::LATE_PAYMENT_REASON;
pub use timeline::{Timeline, TimelineEntry, TimelineEvent};

use crate::audit::{Activity, ActivitySink, AuditAction, AuditService, AuditStorage, AuditWorker};
use crate::core::Config;
use crate::db;
use crate::effects::EffectRunner;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::inventory::{InventoryLedger, InventoryStorage};
use crate::notifications::{FeedAction, NotificationDispatcher, NotificationStorage, Transports};
use crate::orders::{OrderPolicy, OrderStorage, OrdersManager, PlaceOrder};
use crate::payment::{
    PaymentGateway, PaymentReconciler, PaymentSettings, PaymentStorage, PaymentUpdate,
    RefundOutcome,
};
use crate::rewards::{Redemption, RewardsLedger, RewardsStorage};
use crate::services::{Catalog, ProfileStore, TimeoutProfileStore};
use crate::utils::{Clock, SystemClock};
use fanout::SideEffects;
use redb::Database;
use rust_decimal::Decimal;
use serde_json::json;
use shared::models::{
    GatewayEvent, IngredientStock, LedgerEntry, Notification, NotificationEvent,
    NotificationKind, Payment, RecipeIngredient, RewardAccount,
};
use shared::order::{Actor, ActorRole, Order, OrderStatus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// External systems the orchestrator talks to
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn Catalog>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub profiles: Arc<dyn ProfileStore>,
    pub transports: Transports,
    /// Audit destination; `None` appends to the redb audit table
    pub activity_sink: Option<Arc<dyn ActivitySink>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    manager: OrdersManager,
    payments: PaymentReconciler,
    effects: SideEffects,
    audit_storage: Option<AuditStorage>,
    audit_worker: TaskTracker,
    audit_shutdown: CancellationToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("manager", &self.manager)
            .field("payments", &self.payments)
            .finish_non_exhaustive()
    }
}

fn require_privileged(actor: &Actor, what: &str) -> FulfillmentResult<()> {
    if !actor.role.is_privileged() {
        return Err(FulfillmentError::NotAuthorized(format!(
            "{} may not {}",
            actor.id, what
        )));
    }
    Ok(())
}

/// Customers only reach their own account; staff reach anyone's
fn require_self_or_staff(actor: &Actor, user_id: &str) -> FulfillmentResult<()> {
    if actor.role == ActorRole::Customer && actor.id != user_id {
        return Err(FulfillmentError::NotAuthorized(format!(
            "{} cannot access account {}",
            actor.id, user_id
        )));
    }
    Ok(())
}

impl Orchestrator {
    /// Open the database under `config.work_dir` and wire every component
    ///
    /// Must be called inside a tokio runtime; the audit worker is spawned
    /// here.
    pub fn open(config: &Config, collaborators: Collaborators) -> FulfillmentResult<Self> {
        let database = db::open(config.db_path())?;
        Self::new(config, database, Arc::new(SystemClock), collaborators)
    }

    pub fn new(
        config: &Config,
        database: Arc<Database>,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> FulfillmentResult<Self> {
        let profiles: Arc<dyn ProfileStore> = Arc::new(TimeoutProfileStore::new(
            collaborators.profiles,
            config.profile_timeout,
        ));
        let orders = OrderStorage::new(database.clone())?;
        let manager = OrdersManager::new(
            orders.clone(),
            collaborators.catalog,
            clock.clone(),
            OrderPolicy::from_config(config),
        );
        let payments = PaymentReconciler::new(
            PaymentStorage::new(database.clone())?,
            orders.clone(),
            collaborators.gateway,
            clock.clone(),
            PaymentSettings::from_config(config),
        );
        let inventory = InventoryLedger::new(InventoryStorage::new(database.clone())?, clock.clone());
        let rewards = RewardsLedger::new(
            RewardsStorage::new(database.clone())?,
            clock.clone(),
            config.rewards.clone(),
        );
        let notifications = NotificationDispatcher::new(
            NotificationStorage::new(database.clone())?,
            profiles.clone(),
            collaborators.transports,
            clock.clone(),
            config.transport_timeout,
        );

        let (audit_storage, sink): (Option<AuditStorage>, Arc<dyn ActivitySink>) =
            match collaborators.activity_sink {
                Some(sink) => (None, sink),
                None => {
                    let storage = AuditStorage::new(database)?;
                    let sink: Arc<dyn ActivitySink> = Arc::new(storage.clone());
                    (Some(storage), sink)
                }
            };
        let (audit, rx) = AuditService::new(config.audit_buffer_size);
        let audit_shutdown = CancellationToken::new();
        let audit_worker = TaskTracker::new();
        audit_worker.spawn(AuditWorker::new(sink).run(rx, audit_shutdown.clone()));
        audit_worker.close();

        tracing::info!(
            currency = %config.currency,
            auto_accept = config.auto_accept_paid_orders,
            "Fulfillment orchestrator ready"
        );

        Ok(Self {
            manager,
            payments: payments.clone(),
            effects: SideEffects {
                runner: EffectRunner::new(),
                orders,
                inventory,
                rewards,
                notifications,
                payments,
                profiles,
                audit,
                clock,
            },
            audit_storage,
            audit_worker,
            audit_shutdown,
        })
    }

    // ========================================================================
    // Components
    // ========================================================================

    pub fn manager(&self) -> &OrdersManager {
        &self.manager
    }

    pub fn payments(&self) -> &PaymentReconciler {
        &self.payments
    }

    pub fn inventory(&self) -> &InventoryLedger {
        &self.effects.inventory
    }

    pub fn rewards(&self) -> &RewardsLedger {
        &self.effects.rewards
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.effects.notifications
    }

    /// Built-in audit table, absent when a sink was injected
    pub fn audit_storage(&self) -> Option<&AuditStorage> {
        self.audit_storage.as_ref()
    }

    fn now(&self) -> i64 {
        self.effects.clock.now_millis()
    }

    // ========================================================================
    // Order lifecycle
    // ========================================================================

    pub async fn place(&self, actor: &Actor, input: PlaceOrder) -> FulfillmentResult<Order> {
        let order = self.manager.place(actor, input)?;
        self.effects.order_placed(&order, actor);
        Ok(order)
    }

    /// Update status; a `Cancelled` target goes through [`Self::cancel`]
    pub async fn transition(
        &self,
        order_id: &str,
        target: OrderStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> FulfillmentResult<Order> {
        let transition = self.manager.transition(order_id, target, actor, note)?;
        self.effects.transitioned(&transition);
        Ok(transition.order)
    }

    /// Cancel the order, refunding a completed payment afterwards
    ///
    /// The refund runs after the cancellation commits. If the gateway is
    /// down the payment stays `Completed` and [`Self::refund`] can be
    /// retried by staff.
    pub async fn cancel(&self, order_id: &str, actor: &Actor, reason: String) -> FulfillmentResult<Order> {
        let transition = self.manager.cancel(order_id, actor, reason)?;
        self.effects.transitioned(&transition);
        Ok(transition.order)
    }

    pub async fn request_return(&self, order_id: &str, actor: &Actor, reason: String) -> FulfillmentResult<Order> {
        let order = self.manager.request_return(order_id, actor, reason.clone())?;
        self.effects.audit(
            Activity::new(
                AuditAction::ReturnRequested,
                "order",
                order_id,
                actor,
                order.updated_at,
            )
            .with_details(json!({ "reason": reason })),
        );
        self.effects.notify(
            NotificationEvent::new(NotificationKind::ReturnRequested, order.customer_id.clone())
                .for_order(order_id),
        );
        Ok(order)
    }

    /// Approve or reject a return; an approval refunds a completed payment
    pub async fn resolve_return(
        &self,
        order_id: &str,
        actor: &Actor,
        approve: bool,
        note: Option<String>,
    ) -> FulfillmentResult<Order> {
        let order = self.manager.resolve_return(order_id, actor, approve, note)?;
        let resolution = if approve { "approved" } else { "rejected" };
        self.effects.audit(
            Activity::new(
                AuditAction::ReturnResolved,
                "order",
                order_id,
                actor,
                order.updated_at,
            )
            .with_details(json!({ "resolution": resolution })),
        );
        self.effects.notify(
            NotificationEvent::new(NotificationKind::ReturnResolved, order.customer_id.clone())
                .for_order(order_id)
                .with("resolution", resolution),
        );

        if approve
            && order.payment_status == Some(shared::models::PaymentStatus::Completed)
            && let Some(payment_id) = &order.payment_id
        {
            let reason = order
                .return_request
                .as_ref()
                .map(|r| format!("return approved: {}", r.reason))
                .unwrap_or_else(|| "return approved".to_string());
            self.effects.refund(payment_id, reason, actor.clone());
        }
        Ok(order)
    }

    /// Release scheduled orders whose time has come
    pub async fn release_due_scheduled(&self) -> FulfillmentResult<Vec<Order>> {
        let released = self.manager.release_due_scheduled(self.now())?;
        for transition in &released {
            self.effects.transitioned(transition);
        }
        Ok(released.into_iter().map(|t| t.order).collect())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_order(&self, order_id: &str, actor: &Actor) -> FulfillmentResult<Order> {
        self.manager.get_order(order_id, actor)
    }

    pub fn list_orders(&self, customer_id: &str, actor: &Actor) -> FulfillmentResult<Vec<Order>> {
        self.manager.list_for_customer(customer_id, actor)
    }

    pub fn get_timeline(&self, order_id: &str, actor: &Actor) -> FulfillmentResult<Timeline> {
        let order = self.manager.get_order(order_id, actor)?;
        let payment = match &order.payment_id {
            Some(payment_id) => Some(self.payments.get_payment(payment_id)?),
            None => None,
        };
        Ok(Timeline::build(&order, payment.as_ref()))
    }

    // ========================================================================
    // Payments
    // ========================================================================

    pub async fn start_checkout(&self, order_id: &str, actor: &Actor) -> FulfillmentResult<Payment> {
        let payment = self.payments.start_checkout(order_id, actor).await?;
        self.effects.audit(
            Activity::new(
                AuditAction::CheckoutStarted,
                "payment",
                &payment.payment_id,
                actor,
                payment.created_at,
            )
            .with_details(json!({
                "order_id": payment.order_id,
                "amount": payment.amount,
                "session_ref": payment.session_ref,
            })),
        );
        Ok(payment)
    }

    /// Customer came back from checkout: poll the gateway
    pub async fn verify_checkout(&self, session_ref: &str) -> FulfillmentResult<PaymentUpdate> {
        let update = self.payments.verify_checkout(session_ref).await?;
        self.effects.payment_updated(&update);
        Ok(update)
    }

    /// Gateway callback
    pub async fn handle_gateway_event(&self, event: &GatewayEvent) -> FulfillmentResult<PaymentUpdate> {
        let update = self.payments.handle_event(event)?;
        self.effects.payment_updated(&update);
        Ok(update)
    }

    /// Staff refund, fully when `amount` is `None`
    pub async fn refund(
        &self,
        payment_id: &str,
        amount: Option<Decimal>,
        reason: &str,
        actor: &Actor,
    ) -> FulfillmentResult<RefundOutcome> {
        let outcome = self.payments.refund(payment_id, amount, reason, actor).await?;
        self.effects.refunded(&outcome, actor);
        Ok(outcome)
    }

    pub async fn recover_refund(&self, payment_id: &str) -> FulfillmentResult<Option<RefundOutcome>> {
        let outcome = self.payments.recover_refund(payment_id).await?;
        if let Some(outcome) = &outcome {
            self.effects.refunded(outcome, &Actor::system());
        }
        Ok(outcome)
    }

    pub fn payment_for_order(&self, order_id: &str, actor: &Actor) -> FulfillmentResult<Option<Payment>> {
        self.manager.get_order(order_id, actor)?;
        self.payments.payment_for_order(order_id)
    }

    // ========================================================================
    // Rewards
    // ========================================================================

    pub fn reward_balance(&self, user_id: &str, actor: &Actor) -> FulfillmentResult<RewardAccount> {
        require_self_or_staff(actor, user_id)?;
        self.effects.rewards.balance(user_id)
    }

    pub fn reward_history(&self, user_id: &str, actor: &Actor) -> FulfillmentResult<Vec<LedgerEntry>> {
        require_self_or_staff(actor, user_id)?;
        self.effects.rewards.history(user_id)
    }

    pub async fn redeem_points(&self, user_id: &str, points: i64, actor: &Actor) -> FulfillmentResult<Redemption> {
        require_self_or_staff(actor, user_id)?;
        let redemption = self.effects.rewards.redeem(user_id, points)?;
        self.effects.audit(
            Activity::new(
                AuditAction::PointsRedeemed,
                "rewards",
                user_id,
                actor,
                redemption.entry.created_at,
            )
            .with_details(json!({
                "points": points,
                "discount": redemption.discount,
                "balance": redemption.account.balance,
            })),
        );
        self.effects.notify(
            NotificationEvent::new(NotificationKind::PointsRedeemed, user_id)
                .with("points", points)
                .with("discount", redemption.discount.to_string()),
        );
        Ok(redemption)
    }

    // ========================================================================
    // Inventory
    // ========================================================================

    pub fn upsert_ingredient(&self, stock: IngredientStock, actor: &Actor) -> FulfillmentResult<IngredientStock> {
        require_privileged(actor, "manage inventory")?;
        let stored = self.effects.inventory.upsert_ingredient(stock)?;
        self.audit_stock(&stored, actor, json!({ "set_to": stored.current_stock }));
        Ok(stored)
    }

    pub fn restock(&self, ingredient_id: &str, quantity: Decimal, actor: &Actor) -> FulfillmentResult<IngredientStock> {
        require_privileged(actor, "manage inventory")?;
        let stored = self.effects.inventory.restock(ingredient_id, quantity)?;
        self.audit_stock(
            &stored,
            actor,
            json!({ "added": quantity, "current_stock": stored.current_stock }),
        );
        Ok(stored)
    }

    pub fn set_recipe(&self, item_id: &str, ingredients: Vec<RecipeIngredient>, actor: &Actor) -> FulfillmentResult<()> {
        require_privileged(actor, "manage recipes")?;
        self.effects.inventory.set_recipe(item_id, ingredients)
    }

    pub fn low_stock(&self) -> FulfillmentResult<Vec<IngredientStock>> {
        self.effects.inventory.low_stock()
    }

    fn audit_stock(&self, stock: &IngredientStock, actor: &Actor, details: serde_json::Value) {
        self.effects.audit(
            Activity::new(
                AuditAction::StockAdjusted,
                "ingredient",
                &stock.ingredient_id,
                actor,
                stock.updated_at,
            )
            .with_details(details),
        );
    }

    // ========================================================================
    // Notification feed
    // ========================================================================

    pub fn notifications_for(&self, actor: &Actor, limit: Option<usize>) -> FulfillmentResult<Vec<Notification>> {
        self.effects.notifications.list_for_user(&actor.id, limit)
    }

    pub fn unread_count(&self, actor: &Actor) -> FulfillmentResult<usize> {
        self.effects.notifications.unread_count(&actor.id)
    }

    pub fn mark_notification(
        &self,
        notification_id: &str,
        actor: &Actor,
        action: FeedAction,
    ) -> FulfillmentResult<Notification> {
        self.effects
            .notifications
            .mark(notification_id, &actor.id, action)
    }

    /// Send a promotion to every listed user who opted in
    pub async fn dispatch_promotion(
        &self,
        user_ids: &[String],
        title: &str,
        body: &str,
        actor: &Actor,
    ) -> FulfillmentResult<Vec<Notification>> {
        require_privileged(actor, "send promotions")?;
        let sent = self
            .effects
            .notifications
            .dispatch_promotion(user_ids, title, body)
            .await?;
        self.effects.audit(
            Activity::new(AuditAction::PromotionSent, "promotion", title, actor, self.now())
                .with_details(json!({ "targeted": user_ids.len(), "sent": sent.len() })),
        );
        Ok(sent)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Wait for every side effect scheduled so far
    pub async fn settle(&self) {
        self.effects.runner.settle().await;
    }

    /// Drain side effects, then flush queued audit records and stop the worker
    pub async fn shutdown(&self) {
        self.effects.runner.shutdown().await;
        self.audit_shutdown.cancel();
        self.audit_worker.wait().await;
        tracing::info!("Fulfillment orchestrator stopped");
    }
}
