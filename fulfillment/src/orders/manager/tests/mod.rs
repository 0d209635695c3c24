use super::*;
use crate::services::{CatalogItem, InMemoryCatalog};
use crate::utils::ManualClock;
use shared::util::{DAY_MS, HOUR_MS, MINUTE_MS};

const START: i64 = 1_700_000_000_000;

struct Fixture {
    manager: OrdersManager,
    clock: Arc<ManualClock>,
    catalog: Arc<InMemoryCatalog>,
}

fn fixture() -> Fixture {
    let storage = OrderStorage::open_in_memory().unwrap();
    let clock = Arc::new(ManualClock::new(START));
    let catalog = Arc::new(InMemoryCatalog::with_items([
        CatalogItem::new("burger", "Smash Burger", Decimal::new(300, 0)),
        CatalogItem::new("fries", "Fries", Decimal::new(200, 0)),
        CatalogItem::new("soda", "Soda", Decimal::new(250, 2)),
    ]));
    let manager = OrdersManager::new(
        storage,
        catalog.clone(),
        clock.clone(),
        OrderPolicy::default(),
    );
    Fixture {
        manager,
        clock,
        catalog,
    }
}

fn customer() -> Actor {
    Actor::customer("cust-1")
}

fn staff() -> Actor {
    Actor::staff("staff-1")
}

fn basic_request() -> PlaceOrder {
    let mut input = PlaceOrder::new(
        "cust-1",
        vec![
            PlaceOrderItem::new("burger", 1),
            PlaceOrderItem::new("fries", 1),
        ],
    );
    input.delivery_fee = Decimal::new(50, 0);
    input
}

fn place_basic(f: &Fixture) -> Order {
    f.manager.place(&customer(), basic_request()).unwrap()
}

/// Walk an order forward as staff until it reaches `target`
fn advance_to(f: &Fixture, order_id: &str, target: OrderStatus) -> Order {
    let path = [
        OrderStatus::Placed,
        OrderStatus::Processing,
        OrderStatus::Ready,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Completed,
    ];
    let mut order = f.manager.storage().require(order_id).unwrap();
    for next in path {
        if order.status == target {
            break;
        }
        if !transitions::is_allowed(order.status, next, ActorRole::Staff) {
            continue;
        }
        order = f
            .manager
            .transition(order_id, next, &staff(), None)
            .unwrap()
            .order;
    }
    assert_eq!(order.status, target);
    order
}

mod test_cancel;
mod test_concurrency;
