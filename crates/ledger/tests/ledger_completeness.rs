use std::sync::Arc;

use domain::{CustomerContact, Money, Order, OrderStatus, ProductType, ShippingAddress};
use futures_util::future::join_all;
use ledger::{LedgerError, StatusLedger};
use store::{FulfillmentStore, InMemoryFulfillmentStore, StoreError};

fn physical_order() -> Order {
    Order::new(
        ProductType::FramedCanvas,
        "16x20",
        Money::from_cents(9999),
        "usd",
        CustomerContact {
            name: "Grace Hopper".to_string(),
            email: "grace@example.com".to_string(),
            phone: Some("+1 555 0100".to_string()),
        },
        Some(ShippingAddress {
            line1: "10 Harbor Rd".to_string(),
            city: "Arlington".to_string(),
            state: Some("VA".to_string()),
            postal_code: "22201".to_string(),
            country: "US".to_string(),
            ..Default::default()
        }),
    )
}

#[tokio::test]
async fn racing_transitions_record_exactly_one_entry() {
    let store = Arc::new(InMemoryFulfillmentStore::new());
    let order = physical_order();
    store.insert_order(&order).await.unwrap();
    let ledger = StatusLedger::new(store.clone());

    let attempts = (0..8).map(|i| {
        let ledger = ledger.clone();
        let order_id = order.id;
        tokio::spawn(async move {
            ledger
                .transition(
                    order_id,
                    OrderStatus::Pending,
                    OrderStatus::PendingReview,
                    &format!("attempt {i}"),
                )
                .await
        })
    });

    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    let won = results.iter().filter(|r| r.is_ok()).count();
    let conflicted = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::Store(StoreError::StatusConflict { .. }))))
        .count();
    assert_eq!(won, 1);
    assert_eq!(conflicted, 7);

    assert_eq!(ledger.transitions(order.id).await.unwrap().len(), 1);
    ledger.verify(order.id).await.unwrap();
}

#[tokio::test]
async fn ledger_reconstructs_full_lifecycle() {
    let store = Arc::new(InMemoryFulfillmentStore::new());
    let order = physical_order();
    store.insert_order(&order).await.unwrap();
    let ledger = StatusLedger::new(store.clone());

    let path = [
        OrderStatus::PendingReview,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
    ];
    let mut current = OrderStatus::Pending;
    for next in path {
        ledger.annotate(order.id, "checkpoint").await.unwrap();
        ledger
            .transition(order.id, current, next, next.as_str())
            .await
            .unwrap();
        current = next;
    }

    let timeline = ledger.verify(order.id).await.unwrap();
    assert_eq!(timeline.entries.len(), 8);
    assert_eq!(
        timeline.status_sequence(),
        vec![
            OrderStatus::Pending,
            OrderStatus::PendingReview,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ]
    );
    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, timeline.latest_status());
}
