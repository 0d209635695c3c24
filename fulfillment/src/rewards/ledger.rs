use super::storage::RewardsStorage;
use crate::core::config::RewardsConfig;
use crate::error::{FulfillmentError, FulfillmentResult};
use crate::orders::money;
use crate::utils::Clock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{LedgerEntry, LedgerEntryType, RewardAccount, Tier};
use shared::order::Order;
use std::sync::Arc;

/// Entries written for one delivered order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AwardOutcome {
    /// `None` when the order had already been awarded
    pub earned: Option<LedgerEntry>,
    /// Referrer credit, written on the referee's first delivered order
    pub referral: Option<LedgerEntry>,
}

/// Points spent as a discount
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Redemption {
    pub entry: LedgerEntry,
    pub discount: Decimal,
    pub account: RewardAccount,
}

#[derive(Clone)]
pub struct RewardsLedger {
    storage: RewardsStorage,
    clock: Arc<dyn Clock>,
    config: RewardsConfig,
}

impl std::fmt::Debug for RewardsLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardsLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RewardsLedger {
    pub fn new(storage: RewardsStorage, clock: Arc<dyn Clock>, config: RewardsConfig) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    /// Credit points for a delivered order, once per order
    ///
    /// Points are the floored base earn, plus the first-order bonus when the
    /// customer has no earlier earn, plus the tier bonus of the balance held
    /// before this award. `referrer_id` is credited only on the customer's
    /// first earn, and only once per referee.
    pub fn award_for_order(&self, order: &Order, referrer_id: Option<&str>) -> FulfillmentResult<AwardOutcome> {
        let now = self.clock.now_millis();
        let customer_id = order.customer_id.as_str();

        let outcome = self.storage.write(|txn| -> FulfillmentResult<AwardOutcome> {
            if self.storage.order_awarded_in(txn, &order.order_id)? {
                tracing::debug!(order_id = %order.order_id, "Rewards already awarded");
                return Ok(AwardOutcome::default());
            }

            let entries = self.storage.entries_in(txn, customer_id)?;
            let first_order = !entries
                .iter()
                .any(|e| e.entry_type == LedgerEntryType::Earned);
            let balance: i64 = entries.iter().map(|e| e.points).sum();
            let tier = Tier::for_balance(balance);

            let base = money::base_points(order.total, self.config.base_rate);
            let first_bonus = if first_order { self.config.first_order_bonus } else { 0 };
            let tier_bonus = base * tier.bonus_percent() / 100;
            let points = base + first_bonus + tier_bonus;

            let earned = LedgerEntry {
                entry_id: uuid::Uuid::new_v4().to_string(),
                user_id: customer_id.to_string(),
                entry_type: LedgerEntryType::Earned,
                points,
                description: format!("Order {}", order.order_id),
                related_order_id: Some(order.order_id.clone()),
                related_user_id: None,
                created_at: now,
            };
            self.storage.append_in(txn, &earned, now)?;
            self.storage
                .mark_order_awarded_in(txn, &order.order_id, &earned.entry_id)?;

            let mut referral = None;
            if first_order
                && let Some(referrer_id) = referrer_id
                && referrer_id != customer_id
                && !self.storage.referral_credited_in(txn, customer_id)?
            {
                let entry = LedgerEntry {
                    entry_id: uuid::Uuid::new_v4().to_string(),
                    user_id: referrer_id.to_string(),
                    entry_type: LedgerEntryType::Referral,
                    points: self.config.referral_bonus,
                    description: format!("Referral of {customer_id}"),
                    related_order_id: Some(order.order_id.clone()),
                    related_user_id: Some(customer_id.to_string()),
                    created_at: now,
                };
                self.storage.append_in(txn, &entry, now)?;
                self.storage
                    .mark_referral_credited_in(txn, customer_id, &entry.entry_id)?;
                referral = Some(entry);
            }

            tracing::info!(
                order_id = %order.order_id,
                customer_id,
                points,
                base,
                first_bonus,
                tier_bonus,
                "Rewards earned"
            );
            Ok(AwardOutcome {
                earned: Some(earned),
                referral,
            })
        })?;
        Ok(outcome)
    }

    /// Spend points, returning the currency discount they are worth
    pub fn redeem(&self, user_id: &str, points: i64) -> FulfillmentResult<Redemption> {
        if points <= 0 {
            return Err(FulfillmentError::InvalidPoints(format!(
                "points to redeem must be positive, got {points}"
            )));
        }
        let now = self.clock.now_millis();
        let discount = money::points_to_amount(points, self.config.points_per_unit);

        self.storage.write(|txn| -> FulfillmentResult<Redemption> {
            let entries = self.storage.entries_in(txn, user_id)?;
            let balance: i64 = entries.iter().map(|e| e.points).sum();
            if balance < points {
                return Err(FulfillmentError::InsufficientPoints {
                    requested: points,
                    balance,
                });
            }

            let entry = LedgerEntry {
                entry_id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                entry_type: LedgerEntryType::Redeemed,
                points: -points,
                description: format!("Redeemed for {discount}"),
                related_order_id: None,
                related_user_id: None,
                created_at: now,
            };
            let account = self.storage.append_in(txn, &entry, now)?;
            tracing::info!(user_id, points, discount = %discount, "Points redeemed");
            Ok(Redemption {
                entry,
                discount,
                account,
            })
        })
    }

    /// Current projection; an empty account for unknown users
    pub fn balance(&self, user_id: &str) -> FulfillmentResult<RewardAccount> {
        Ok(self
            .storage
            .account(user_id)?
            .unwrap_or_else(|| RewardAccount::empty(user_id)))
    }

    /// Ledger entries, newest first
    pub fn history(&self, user_id: &str) -> FulfillmentResult<Vec<LedgerEntry>> {
        let mut entries = self.storage.entries(user_id)?;
        entries.reverse();
        Ok(entries)
    }
}
