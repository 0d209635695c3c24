//! Rewards Model

use serde::{Deserialize, Serialize};

/// Loyalty tier derived from the points balance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Minimum balance for silver
    pub const SILVER_THRESHOLD: i64 = 500;
    /// Minimum balance for gold
    pub const GOLD_THRESHOLD: i64 = 2_000;
    /// Minimum balance for platinum
    pub const PLATINUM_THRESHOLD: i64 = 5_000;

    pub fn for_balance(balance: i64) -> Self {
        match balance {
            b if b >= Self::PLATINUM_THRESHOLD => Tier::Platinum,
            b if b >= Self::GOLD_THRESHOLD => Tier::Gold,
            b if b >= Self::SILVER_THRESHOLD => Tier::Silver,
            _ => Tier::Bronze,
        }
    }

    /// Extra points awarded on top of the base earn, in percent
    pub fn bonus_percent(&self) -> i64 {
        match self {
            Tier::Bronze => 0,
            Tier::Silver => 5,
            Tier::Gold => 10,
            Tier::Platinum => 15,
        }
    }
}

/// Ledger entry type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// Points earned from a delivered order
    Earned,
    /// Points spent as a discount (negative)
    Redeemed,
    /// Referrer bonus for a referee's first delivered order
    Referral,
}

/// Immutable rewards ledger entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub user_id: String,
    pub entry_type: LedgerEntryType,
    /// Signed points; negative for redemptions
    pub points: i64,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_order_id: Option<String>,
    /// Referee ID on referral entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_user_id: Option<String>,
    pub created_at: i64,
}

/// Materialized projection of a user's ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RewardAccount {
    pub user_id: String,
    pub balance: i64,
    pub total_earned: i64,
    pub total_redeemed: i64,
    pub tier: Tier,
    pub updated_at: i64,
}

impl RewardAccount {
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Recompute the projection from the full ledger
    pub fn from_entries(user_id: &str, entries: &[LedgerEntry], now: i64) -> Self {
        let mut account = Self::empty(user_id);
        for entry in entries {
            account.balance += entry.points;
            if entry.points >= 0 {
                account.total_earned += entry.points;
            } else {
                account.total_redeemed += -entry.points;
            }
        }
        account.tier = Tier::for_balance(account.balance);
        account.updated_at = now;
        account
    }
}
