//! Notification Model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Push,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Push];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Push => "push",
        };
        f.write_str(s)
    }
}

/// Preference group an event belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Order,
    Payment,
    Rewards,
    Promotional,
}

/// Event type tag; selects the message template
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderScheduled,
    OrderPlaced,
    OrderProcessing,
    OrderReady,
    OrderOutForDelivery,
    OrderDelivered,
    OrderCompleted,
    OrderCancelled,
    ReturnRequested,
    ReturnResolved,
    PaymentConfirmed,
    PaymentFailed,
    RefundIssued,
    PointsEarned,
    PointsRedeemed,
    ReferralBonus,
    Promotion,
}

impl NotificationKind {
    pub fn category(&self) -> NotificationCategory {
        use NotificationKind::*;
        match self {
            OrderScheduled | OrderPlaced | OrderProcessing | OrderReady | OrderOutForDelivery
            | OrderDelivered | OrderCompleted | OrderCancelled | ReturnRequested
            | ReturnResolved => NotificationCategory::Order,
            PaymentConfirmed | PaymentFailed | RefundIssued => NotificationCategory::Payment,
            PointsEarned | PointsRedeemed | ReferralBonus => NotificationCategory::Rewards,
            Promotion => NotificationCategory::Promotional,
        }
    }
}

/// Domain event handed to notification dispatch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Template variables
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl NotificationEvent {
    pub fn new(kind: NotificationKind, user_id: impl Into<String>) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            order_id: None,
            data: serde_json::Map::new(),
        }
    }

    pub fn for_order(mut self, order_id: impl Into<String>) -> Self {
        let order_id = order_id.into();
        self.data
            .insert("order_id".to_string(), serde_json::Value::from(order_id.clone()));
        self.order_id = Some(order_id);
        self
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Outcome of one channel attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    /// Channel disabled by preference or missing contact
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// In-app notification record, one per dispatched event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub notification_id: String,
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub channels: Vec<ChannelOutcome>,
    pub read: bool,
    pub clicked: bool,
    pub dismissed: bool,
    pub created_at: i64,
}
