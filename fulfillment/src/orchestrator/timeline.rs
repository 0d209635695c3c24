//! Order timeline: status history merged with payment and return markers

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::models::{Payment, PaymentStatus};
use shared::order::{ActorRole, Order, OrderStatus, ReturnStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    Status {
        status: OrderStatus,
        actor_id: String,
        actor_role: ActorRole,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    CheckoutStarted {
        payment_id: String,
        amount: Decimal,
    },
    PaymentCompleted {
        payment_id: String,
    },
    PaymentFailed {
        payment_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    PaymentCancelled {
        payment_id: String,
    },
    Refunded {
        payment_id: String,
        amount: Decimal,
    },
    ReturnRequested {
        reason: String,
    },
    ReturnResolved {
        status: ReturnStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimelineEntry {
    pub timestamp: i64,
    #[serde(flatten)]
    pub event: TimelineEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub order_id: String,
    pub status: OrderStatus,
    /// Oldest first
    pub entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Merge the order history with markers from its current payment
    pub fn build(order: &Order, payment: Option<&Payment>) -> Self {
        let mut entries: Vec<TimelineEntry> = order
            .status_history
            .iter()
            .map(|entry| TimelineEntry {
                timestamp: entry.timestamp,
                event: TimelineEvent::Status {
                    status: entry.status,
                    actor_id: entry.actor_id.clone(),
                    actor_role: entry.actor_role,
                    note: entry.note.clone(),
                },
            })
            .collect();

        if let Some(payment) = payment {
            entries.extend(payment_markers(payment));
        }

        if let Some(request) = &order.return_request {
            entries.push(TimelineEntry {
                timestamp: request.requested_at,
                event: TimelineEvent::ReturnRequested {
                    reason: request.reason.clone(),
                },
            });
            if let Some(resolved_at) = request.resolved_at {
                entries.push(TimelineEntry {
                    timestamp: resolved_at,
                    event: TimelineEvent::ReturnResolved {
                        status: request.status,
                        note: request.resolution_note.clone(),
                    },
                });
            }
        }

        // Stable: status entries keep their order on equal timestamps
        entries.sort_by_key(|e| e.timestamp);

        Self {
            order_id: order.order_id.clone(),
            status: order.status,
            entries,
        }
    }
}

fn payment_markers(payment: &Payment) -> Vec<TimelineEntry> {
    let id = || payment.payment_id.clone();
    let mut markers = vec![TimelineEntry {
        timestamp: payment.created_at,
        event: TimelineEvent::CheckoutStarted {
            payment_id: id(),
            amount: payment.amount,
        },
    }];

    if let Some(paid_at) = payment.paid_at {
        markers.push(TimelineEntry {
            timestamp: paid_at,
            event: TimelineEvent::PaymentCompleted { payment_id: id() },
        });
    }
    match payment.status {
        PaymentStatus::Failed => markers.push(TimelineEntry {
            timestamp: payment.updated_at,
            event: TimelineEvent::PaymentFailed {
                payment_id: id(),
                reason: payment.failure_reason.clone(),
            },
        }),
        PaymentStatus::Cancelled => markers.push(TimelineEntry {
            timestamp: payment.updated_at,
            event: TimelineEvent::PaymentCancelled { payment_id: id() },
        }),
        _ => {}
    }
    if let (Some(refunded_at), Some(amount)) = (payment.refunded_at, payment.refund_amount) {
        markers.push(TimelineEntry {
            timestamp: refunded_at,
            event: TimelineEvent::Refunded {
                payment_id: id(),
                amount,
            },
        });
    }
    markers
}
