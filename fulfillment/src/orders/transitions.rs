//! Transition table
//!
//! `(from, role) -> allowed targets`. Anything not listed is illegal.
//! Refund-driven cancellation bypasses this table (see
//! [`super::manager::apply_forced_cancel`]).

use shared::order::{ActorRole, OrderStatus};

use OrderStatus::*;

const NONE: &[OrderStatus] = &[];

/// Legal successors of `from` for an actor of `role`
pub fn allowed_targets(from: OrderStatus, role: ActorRole) -> &'static [OrderStatus] {
    match role {
        ActorRole::Staff | ActorRole::Admin => match from {
            Scheduled => &[Placed, Cancelled],
            Placed => &[Processing, Cancelled],
            Processing => &[Ready, Cancelled],
            Ready => &[OutForDelivery, Delivered],
            OutForDelivery => &[Delivered],
            Delivered => &[Completed],
            Completed | Cancelled => NONE,
        },
        ActorRole::Customer => match from {
            Scheduled | Placed | Processing => &[Cancelled],
            Delivered => &[Completed],
            _ => NONE,
        },
        // Scheduler releases, auto-accept on payment, auto-close
        ActorRole::System => match from {
            Scheduled => &[Placed, Cancelled],
            Placed => &[Processing, Cancelled],
            Processing => &[Cancelled],
            Delivered => &[Completed],
            _ => NONE,
        },
    }
}

pub fn is_allowed(from: OrderStatus, to: OrderStatus, role: ActorRole) -> bool {
    allowed_targets(from, role).contains(&to)
}
