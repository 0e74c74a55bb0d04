//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container and need Docker, so they are
//! ignored by default. Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --ignored
//! ```

use std::sync::Arc;

use common::ArtifactId;
use domain::{
    Artifact, CustomerContact, DomainError, EnhancementStatus, EntryKind, Money, Order,
    OrderStatus, ProductType, Region, Review, ReviewOutcome, ReviewType, ShippingAddress,
    StatusHistoryEntry, VendorOrderRef, VendorProduct, VendorProductKey,
};
use serial_test::serial;
use sqlx::PgPool;
use store::{EnhancementUpdate, FulfillmentStore, PostgresFulfillmentStore, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            for migration in [
                include_str!("../../../migrations/001_create_fulfillment_tables.sql"),
                include_str!("../../../migrations/002_add_order_hold.sql"),
            ] {
                sqlx::raw_sql(migration).execute(&temp_pool).await.unwrap();
            }
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresFulfillmentStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE order_status_history, orders, reviews, artifacts, vendor_products",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresFulfillmentStore::new(pool)
}

fn print_order(artifact_id: Option<ArtifactId>) -> Order {
    let mut order = Order::new(
        ProductType::ArtPrint,
        "18x24",
        Money::from_cents(4999),
        "usd",
        CustomerContact {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
        },
        Some(ShippingAddress {
            line1: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
            country: "US".to_string(),
            ..Default::default()
        }),
    );
    order.artifact_id = artifact_id;
    order
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn order_roundtrip_preserves_fields() {
    let store = get_test_store().await;
    let artifact = Artifact::new("https://cdn.example.com/a.png");
    store.insert_artifact(&artifact).await.unwrap();
    let order = print_order(Some(artifact.id));
    store.insert_order(&order).await.unwrap();

    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(loaded.artifact_id, Some(artifact.id));
    assert_eq!(loaded.contact, order.contact);
    assert_eq!(loaded.shipping_address, order.shipping_address);
    assert_eq!(loaded.price, order.price);
    assert_eq!(loaded.status, OrderStatus::Pending);

    assert!(matches!(
        store.insert_order(&order).await,
        Err(StoreError::AlreadyExists { .. })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn confirm_payment_is_idempotent() {
    let store = get_test_store().await;
    let order = print_order(None);
    store.insert_order(&order).await.unwrap();

    let first = store.confirm_payment(order.id, "cs_live_1").await.unwrap();
    let second = store.confirm_payment(order.id, "cs_live_2").await.unwrap();
    assert_eq!(first.payment_reference, "cs_live_1");
    assert_eq!(second.payment_reference, "cs_live_1");
    assert!(second.is_payment_confirmed());
    assert_eq!(store.orders_awaiting_vendor().await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn duplicate_payment_reference_is_rejected() {
    let store = get_test_store().await;
    let first = print_order(None);
    store.insert_order(&first).await.unwrap();
    store.confirm_payment(first.id, "cs_live_dup").await.unwrap();

    let mut second = print_order(None);
    second.confirm_payment("cs_live_dup");
    assert!(matches!(
        store.insert_order(&second).await,
        Err(StoreError::AlreadyExists {
            entity: "payment reference",
            ..
        })
    ));
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn hold_round_trips() {
    let store = get_test_store().await;
    let order = print_order(None);
    store.insert_order(&order).await.unwrap();

    let held = store.set_hold(order.id, Some("vendor rejected")).await.unwrap();
    assert_eq!(held.hold_reason.as_deref(), Some("vendor rejected"));
    let loaded = store.get_order(order.id).await.unwrap().unwrap();
    assert!(loaded.is_held());

    let released = store.set_hold(order.id, None).await.unwrap();
    assert!(!released.is_held());
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn transition_compare_and_swap() {
    let store = get_test_store().await;
    let order = print_order(None);
    store.insert_order(&order).await.unwrap();

    store
        .transition_order(
            order.id,
            OrderStatus::Pending,
            OrderStatus::PendingReview,
            "review requested",
        )
        .await
        .unwrap();
    let stale = store
        .transition_order(
            order.id,
            OrderStatus::Pending,
            OrderStatus::Cancelled,
            "too late",
        )
        .await;
    assert!(matches!(
        stale,
        Err(StoreError::StatusConflict {
            actual: OrderStatus::PendingReview,
            ..
        })
    ));

    let invalid = store
        .transition_order(
            order.id,
            OrderStatus::PendingReview,
            OrderStatus::Shipped,
            "skip ahead",
        )
        .await;
    assert!(matches!(
        invalid,
        Err(StoreError::Domain(DomainError::InvalidTransition { .. }))
    ));

    let history = store.history(order.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, EntryKind::Transition);
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn record_vendor_order_sets_fields_and_ledger() {
    let store = get_test_store().await;
    let order = print_order(None);
    store.insert_order(&order).await.unwrap();
    store
        .append_history(StatusHistoryEntry::annotation(
            order.id,
            OrderStatus::Pending,
            "enhanced asset used",
        ))
        .await
        .unwrap();

    let vendor = VendorOrderRef {
        vendor_order_id: "po_123".to_string(),
        status: "pending".to_string(),
    };
    let updated = store
        .record_vendor_order(order.id, OrderStatus::Pending, &vendor, "vendor order created")
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Processing);
    assert_eq!(updated.vendor_order_id.as_deref(), Some("po_123"));

    let found = store
        .find_order_by_vendor_order_id("po_123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, order.id);

    let history = store.history(order.id).await.unwrap();
    let kinds: Vec<_> = history.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EntryKind::Annotation, EntryKind::Transition]);
    assert!(store.orders_awaiting_vendor().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn enhancement_updates_respect_rules() {
    let store = get_test_store().await;
    let artifact = Artifact::new("https://cdn.example.com/a.png");
    store.insert_artifact(&artifact).await.unwrap();

    store
        .update_enhancement(artifact.id, EnhancementUpdate::Processing)
        .await
        .unwrap();
    let done = store
        .update_enhancement(
            artifact.id,
            EnhancementUpdate::Completed {
                enhanced_url: "https://cdn.example.com/a-3x.png".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(done.enhancement_status(), EnhancementStatus::Completed);

    let rejected = store
        .update_enhancement(artifact.id, EnhancementUpdate::Failed)
        .await;
    assert!(rejected.is_err());
    let loaded = store.get_artifact(artifact.id).await.unwrap().unwrap();
    assert_eq!(loaded.enhanced_url(), Some("https://cdn.example.com/a-3x.png"));
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn one_pending_review_per_type() {
    let store = get_test_store().await;
    let artifact = Artifact::new("https://cdn.example.com/a.png");
    store.insert_artifact(&artifact).await.unwrap();

    let first = store
        .insert_review_unless_pending(&Review::new(artifact.id, ReviewType::Proof))
        .await
        .unwrap();
    let second = store
        .insert_review_unless_pending(&Review::new(artifact.id, ReviewType::Proof))
        .await
        .unwrap();
    assert!(first.was_created());
    assert_eq!(first.review().id, second.review().id);

    store
        .decide_review(first.review().id, ReviewOutcome::Rejected, "mod", None)
        .await
        .unwrap();
    assert!(matches!(
        store
            .decide_review(first.review().id, ReviewOutcome::Approved, "mod", None)
            .await,
        Err(StoreError::Domain(DomainError::ReviewAlreadyDecided(_)))
    ));

    let third = store
        .insert_review_unless_pending(&Review::new(artifact.id, ReviewType::Proof))
        .await
        .unwrap();
    assert!(third.was_created());
    assert_eq!(store.pending_reviews(None).await.unwrap().len(), 1);
    assert_eq!(
        store.reviews_for_artifact(artifact.id).await.unwrap().len(),
        2
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
#[serial]
async fn vendor_product_insert_keeps_first() {
    let store = get_test_store().await;
    let key = VendorProductKey::new(ProductType::ArtPrint, "12x18", Region::Europe);
    let first = VendorProduct {
        key: key.clone(),
        vendor_product_id: "prod_a".to_string(),
        vendor_variant_id: 65216,
        created_at: chrono::Utc::now(),
    };
    let second = VendorProduct {
        vendor_product_id: "prod_b".to_string(),
        ..first.clone()
    };

    store.insert_vendor_product(&first).await.unwrap();
    let stored = store.insert_vendor_product(&second).await.unwrap();
    assert_eq!(stored.vendor_product_id, "prod_a");
    assert_eq!(stored.vendor_variant_id, 65216);
}
