use super::*;
use std::sync::Barrier;

#[test]
fn test_ready_and_cancel_race_has_one_winner() {
    for _ in 0..20 {
        let f = fixture();
        let order = place_basic(&f);
        let order = advance_to(&f, &order.order_id, OrderStatus::Processing);
        let before = order.status_history.len();
        let barrier = Barrier::new(2);

        let (ready, cancel) = std::thread::scope(|s| {
            let ready = s.spawn(|| {
                barrier.wait();
                f.manager
                    .transition(&order.order_id, OrderStatus::Ready, &staff(), None)
            });
            let cancel = s.spawn(|| {
                barrier.wait();
                f.manager.transition(
                    &order.order_id,
                    OrderStatus::Cancelled,
                    &Actor::staff("staff-2"),
                    Some("race".into()),
                )
            });
            (ready.join().unwrap(), cancel.join().unwrap())
        });

        assert!(ready.is_ok() ^ cancel.is_ok(), "exactly one must win");
        match (&ready, &cancel) {
            (Ok(_), Err(e)) => assert!(matches!(e, FulfillmentError::NotCancellable { .. })),
            (Err(e), Ok(_)) => assert!(matches!(e, FulfillmentError::IllegalTransition { .. })),
            _ => unreachable!(),
        }

        let stored = f.manager.storage().require(&order.order_id).unwrap();
        assert_eq!(stored.status_history.len(), before + 1);
        assert!(stored.history_consistent());
    }
}

#[test]
fn test_parallel_cancels_commit_once() {
    let f = fixture();
    let order = place_basic(&f);
    let barrier = Barrier::new(8);

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let barrier = &barrier;
                let manager = &f.manager;
                let order_id = &order.order_id;
                s.spawn(move || {
                    barrier.wait();
                    manager.cancel(order_id, &Actor::staff(format!("staff-{}", i)), "dup".into())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let stored = f.manager.storage().require(&order.order_id).unwrap();
    assert_eq!(stored.status_history.len(), 2);
    assert_eq!(stored.version, 2);
}
