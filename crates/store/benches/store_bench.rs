use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    CustomerContact, Money, Order, OrderStatus, ProductType, ShippingAddress, StatusHistoryEntry,
};
use store::{FulfillmentStore, InMemoryFulfillmentStore};

fn sample_order() -> Order {
    Order::new(
        ProductType::FramedCanvas,
        "16x20",
        Money::from_cents(9999),
        "usd",
        CustomerContact {
            name: "Bench Customer".to_string(),
            email: "bench@example.com".to_string(),
            phone: None,
        },
        Some(ShippingAddress {
            line1: "1 Bench St".to_string(),
            city: "Benchville".to_string(),
            postal_code: "00000".to_string(),
            country: "US".to_string(),
            ..Default::default()
        }),
    )
}

fn bench_transition(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("in_memory_transition_order", |b| {
        b.to_async(&rt).iter(|| async {
            let store = InMemoryFulfillmentStore::new();
            let order = sample_order();
            store.insert_order(&order).await.unwrap();
            store
                .transition_order(
                    order.id,
                    OrderStatus::Pending,
                    OrderStatus::Processing,
                    "bench",
                )
                .await
                .unwrap();
        })
    });
}

fn bench_history(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryFulfillmentStore::new();
    let order = sample_order();
    rt.block_on(async {
        store.insert_order(&order).await.unwrap();
        for i in 0..100 {
            store
                .append_history(StatusHistoryEntry::annotation(
                    order.id,
                    OrderStatus::Pending,
                    format!("note {i}"),
                ))
                .await
                .unwrap();
        }
    });

    c.bench_function("in_memory_history_100", |b| {
        b.to_async(&rt).iter(|| async { store.history(order.id).await.unwrap() })
    });
}

criterion_group!(benches, bench_transition, bench_history);
criterion_main!(benches);
