use super::*;

#[test]
fn test_customer_cancel_just_inside_window() {
    let f = fixture();
    let order = place_basic(&f);

    f.clock.advance(4 * MINUTE_MS + 59_000);
    let t = f
        .manager
        .cancel(&order.order_id, &customer(), "too slow".into())
        .unwrap();

    assert_eq!(t.from, OrderStatus::Placed);
    assert_eq!(t.order.status, OrderStatus::Cancelled);
    let cancellation = t.order.cancellation.as_ref().unwrap();
    assert_eq!(cancellation.reason, "too slow");
    assert_eq!(cancellation.cancelled_by, "cust-1");
    assert_eq!(cancellation.cancelled_by_role, ActorRole::Customer);
    assert_eq!(cancellation.cancelled_at, START + 4 * MINUTE_MS + 59_000);
    assert!(t.order.history_consistent());
}

#[test]
fn test_customer_cancel_just_outside_window() {
    let f = fixture();
    let order = place_basic(&f);

    f.clock.advance(5 * MINUTE_MS + 1_000);
    let err = f
        .manager
        .cancel(&order.order_id, &customer(), "too slow".into())
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::CancellationWindowExpired { .. }
    ));

    let stored = f.manager.storage().require(&order.order_id).unwrap();
    assert_eq!(stored.status, OrderStatus::Placed);
    assert!(stored.cancellation.is_none());
}

#[test]
fn test_staff_cancel_ignores_window() {
    let f = fixture();
    let order = place_basic(&f);
    advance_to(&f, &order.order_id, OrderStatus::Processing);

    f.clock.advance(3 * HOUR_MS);
    let t = f
        .manager
        .cancel(&order.order_id, &staff(), "out of buns".into())
        .unwrap();
    assert_eq!(t.from, OrderStatus::Processing);
    assert_eq!(t.order.status, OrderStatus::Cancelled);
}

#[test]
fn test_cancel_after_ready_is_rejected() {
    let f = fixture();
    let order = place_basic(&f);
    advance_to(&f, &order.order_id, OrderStatus::Ready);

    let err = f
        .manager
        .cancel(&order.order_id, &staff(), "late".into())
        .unwrap_err();
    assert!(matches!(
        err,
        FulfillmentError::NotCancellable {
            status: OrderStatus::Ready,
            ..
        }
    ));
}

#[test]
fn test_cancel_twice_is_rejected() {
    let f = fixture();
    let order = place_basic(&f);
    f.manager
        .cancel(&order.order_id, &customer(), "first".into())
        .unwrap();
    assert!(matches!(
        f.manager.cancel(&order.order_id, &staff(), "second".into()),
        Err(FulfillmentError::NotCancellable { .. })
    ));
}

#[test]
fn test_other_customer_cannot_cancel() {
    let f = fixture();
    let order = place_basic(&f);
    assert!(matches!(
        f.manager
            .cancel(&order.order_id, &Actor::customer("cust-2"), "mine".into()),
        Err(FulfillmentError::NotAuthorized(_))
    ));
}

#[test]
fn test_transition_to_cancelled_uses_cancel_rules() {
    let f = fixture();
    let order = place_basic(&f);

    f.clock.advance(10 * MINUTE_MS);
    assert!(matches!(
        f.manager
            .transition(&order.order_id, OrderStatus::Cancelled, &customer(), None),
        Err(FulfillmentError::CancellationWindowExpired { .. })
    ));

    let t = f
        .manager
        .transition(
            &order.order_id,
            OrderStatus::Cancelled,
            &staff(),
            Some("kitchen closed".into()),
        )
        .unwrap();
    assert_eq!(
        t.order.cancellation.as_ref().map(|c| c.reason.as_str()),
        Some("kitchen closed")
    );
}

#[test]
fn test_forced_cancel_skips_delivered_orders() {
    let f = fixture();
    let order = place_basic(&f);
    let mut ready = advance_to(&f, &order.order_id, OrderStatus::Ready);

    let from = apply_forced_cancel(&mut ready, &Actor::system(), "refunded", START);
    assert_eq!(from, Some(OrderStatus::Ready));
    assert_eq!(ready.status, OrderStatus::Cancelled);
    assert!(ready.history_consistent());

    let other = place_basic(&f);
    let mut delivered = advance_to(&f, &other.order_id, OrderStatus::Delivered);
    let len = delivered.status_history.len();
    assert_eq!(
        apply_forced_cancel(&mut delivered, &Actor::system(), "refunded", START),
        None
    );
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert_eq!(delivered.status_history.len(), len);
}
