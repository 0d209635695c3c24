//! Message templates
//!
//! One fixed template per [`NotificationKind`]. Placeholders are written as
//! `{key}` and filled from the event data; unknown keys stay as written.

use serde::{Deserialize, Serialize};
use shared::models::{Channel, NotificationKind};

/// Message handed to a channel transport
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Email subject / push title; SMS has none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

/// (title, body) templates
fn template(kind: NotificationKind) -> (&'static str, &'static str) {
    use NotificationKind::*;
    match kind {
        OrderScheduled => (
            "Order scheduled",
            "Your order {order_id} is scheduled for {scheduled_for}.",
        ),
        OrderPlaced => (
            "Order received",
            "We received your order {order_id}. Total: {total}.",
        ),
        OrderProcessing => (
            "Order accepted",
            "The kitchen is preparing your order {order_id}.",
        ),
        OrderReady => ("Order ready", "Your order {order_id} is ready."),
        OrderOutForDelivery => ("On the way", "Your order {order_id} is out for delivery."),
        OrderDelivered => (
            "Order delivered",
            "Your order {order_id} has been delivered. Enjoy!",
        ),
        OrderCompleted => (
            "Order completed",
            "Thanks for ordering! Order {order_id} is complete.",
        ),
        OrderCancelled => (
            "Order cancelled",
            "Your order {order_id} was cancelled: {reason}.",
        ),
        ReturnRequested => (
            "Return requested",
            "We received your return request for order {order_id}.",
        ),
        ReturnResolved => (
            "Return {resolution}",
            "Your return request for order {order_id} was {resolution}.",
        ),
        PaymentConfirmed => (
            "Payment confirmed",
            "We received your payment of {amount} for order {order_id}.",
        ),
        PaymentFailed => (
            "Payment failed",
            "Payment for order {order_id} failed: {reason}.",
        ),
        RefundIssued => (
            "Refund issued",
            "A refund of {amount} for order {order_id} is on its way.",
        ),
        PointsEarned => (
            "Points earned",
            "You earned {points} points. Balance: {balance}.",
        ),
        PointsRedeemed => (
            "Points redeemed",
            "You redeemed {points} points for {discount}.",
        ),
        ReferralBonus => (
            "Referral bonus",
            "A friend you referred received their first order. You earned {points} points.",
        ),
        Promotion => ("{title}", "{body}"),
    }
}

fn fill(text: &str, data: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut out = text.to_string();
    for (key, value) in data {
        let placeholder = format!("{{{key}}}");
        if !out.contains(&placeholder) {
            continue;
        }
        let replacement = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        out = out.replace(&placeholder, &replacement);
    }
    out
}

/// Title and body for the in-app record
pub fn render(kind: NotificationKind, data: &serde_json::Map<String, serde_json::Value>) -> (String, String) {
    let (title, body) = template(kind);
    (fill(title, data), fill(body, data))
}

/// Channel-specific rendering
pub fn render_for_channel(
    kind: NotificationKind,
    channel: Channel,
    recipient_name: &str,
    data: &serde_json::Map<String, serde_json::Value>,
) -> RenderedMessage {
    let (title, body) = render(kind, data);
    match channel {
        Channel::Email => {
            let body = if recipient_name.is_empty() {
                body
            } else {
                format!("Hi {recipient_name},\n\n{body}")
            };
            RenderedMessage {
                subject: Some(title),
                body,
            }
        }
        Channel::Sms => RenderedMessage {
            subject: None,
            body: format!("{title}: {body}"),
        },
        Channel::Push => RenderedMessage {
            subject: Some(title),
            body,
        },
    }
}
