//! PostgreSQL integration tests for the read models.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p projections --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use broker::{Broker, Delivery, InMemoryBroker};
use chrono::{DateTime, TimeDelta, Utc};
use common::{CustomerId, OrderId, ProductId};
use domain::{IntegrationEvent, Money, OrderCreated, OrderItem, ProductCreated};
use futures_util::StreamExt;
use projections::{ApplyOutcome, HandleOutcome, PostgresReadModels, Projector, ReadModelStore};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

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
            PostgresReadModels::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresReadModels {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE processed_events, orders_read, product_sales_view, \
         product_catalog_read, projection_watermark, dead_letters RESTART IDENTITY",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresReadModels::new(pool)
}

/// Postgres stores microseconds; keep test timestamps comparable.
fn micros(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(at.timestamp_micros()).unwrap()
}

fn order_created(order_id: i64, at: DateTime<Utc>) -> IntegrationEvent {
    IntegrationEvent::OrderCreated(OrderCreated {
        event_id: Uuid::new_v4(),
        order_id: OrderId::new(order_id),
        customer_id: CustomerId::new(9),
        total: Money::from_cents(2500),
        items: vec![
            OrderItem::new(ProductId::new(1), 2, Money::from_cents(1000)),
            OrderItem::new(ProductId::new(2), 1, Money::from_cents(500)),
        ],
        timestamp: micros(at),
    })
}

#[tokio::test]
#[serial]
async fn apply_is_idempotent_per_event_id() {
    let store = get_test_store().await;
    let event = order_created(1, Utc::now());

    assert_eq!(store.apply(&event).await.unwrap(), ApplyOutcome::Applied);
    assert_eq!(store.apply(&event).await.unwrap(), ApplyOutcome::Duplicate);

    let sales = store.product_sales(ProductId::new(1)).await.unwrap().unwrap();
    assert_eq!(sales.total_quantity_sold, 2);
    assert_eq!(sales.total_revenue, Money::from_cents(2000));
    assert_eq!(sales.order_count, 1);

    let order = store.order(OrderId::new(1)).await.unwrap().unwrap();
    assert_eq!(order.customer_id, CustomerId::new(9));
    assert_eq!(order.item_count, 2);
    assert_eq!(order.event_id, event.event_id());
}

#[tokio::test]
#[serial]
async fn sales_accumulate_across_orders() {
    let store = get_test_store().await;

    store.apply(&order_created(1, Utc::now())).await.unwrap();
    store.apply(&order_created(2, Utc::now())).await.unwrap();

    let sales = store.product_sales(ProductId::new(2)).await.unwrap().unwrap();
    assert_eq!(sales.total_quantity_sold, 2);
    assert_eq!(sales.order_count, 2);
    assert!(store.product_sales(ProductId::new(3)).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn watermark_is_monotonic() {
    let store = get_test_store().await;
    let newer = micros(Utc::now());
    let older = newer - TimeDelta::seconds(45);

    assert!(store.watermark().await.unwrap().is_none());

    store.apply(&order_created(2, newer)).await.unwrap();
    store.apply(&order_created(1, older)).await.unwrap();

    assert_eq!(store.watermark().await.unwrap(), Some(newer));
}

#[tokio::test]
#[serial]
async fn separate_projections_keep_separate_watermarks() {
    let store = get_test_store().await;
    let other = PostgresReadModels::with_name(store.pool().clone(), "audit");

    store.apply(&order_created(1, Utc::now())).await.unwrap();

    assert!(store.watermark().await.unwrap().is_some());
    assert!(other.watermark().await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn product_catalog_and_dead_letters() {
    let store = get_test_store().await;
    let created = IntegrationEvent::ProductCreated(ProductCreated {
        event_id: Uuid::new_v4(),
        product_id: ProductId::new(4),
        name: "Kettle".to_string(),
        category: "kitchen".to_string(),
        price: Money::from_cents(3450),
        stock: 12,
        timestamp: micros(Utc::now()),
    });

    store.apply(&created).await.unwrap();
    let entry = store.catalog_entry(ProductId::new(4)).await.unwrap().unwrap();
    assert_eq!(entry.name, "Kettle");
    assert_eq!(entry.price, Money::from_cents(3450));

    store
        .park_dead_letter("order-events", "{oops", "Malformed event payload")
        .await
        .unwrap();
    let parked = store.dead_letters().await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].payload, "{oops");
}

async fn deliver(broker: &InMemoryBroker, topic: &str, payload: &[u8]) -> Delivery {
    broker.publish(topic, payload).await.unwrap();
    let mut stream = broker.subscribe(topic).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap()
}

#[tokio::test]
#[serial]
async fn nul_in_undecodable_payload_is_dead_lettered() {
    let store = get_test_store().await;
    let broker = InMemoryBroker::new();
    let projector = Projector::new(store.clone(), broker.clone());

    let delivery = deliver(&broker, "order-events", b"not json \0 at all").await;
    let outcome = projector.handle_delivery(&delivery).await.unwrap();

    assert_eq!(outcome, HandleOutcome::DeadLettered);
    assert_eq!(broker.unacked_count("order-events").await, 0);
    let parked = store.dead_letters().await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].payload, "not json \\u0000 at all");
}

#[tokio::test]
#[serial]
async fn nul_in_product_name_is_dead_lettered() {
    let store = get_test_store().await;
    let broker = InMemoryBroker::new();
    let projector = Projector::new(store.clone(), broker.clone());
    let payload = format!(
        r#"{{"eventType":"ProductCreated","eventId":"{}","productId":5,"name":"Wid\u0000get","category":"tools","price":10.0,"stock":1,"timestamp":"2026-01-01T00:00:00Z"}}"#,
        Uuid::new_v4()
    );

    let delivery = deliver(&broker, "product-events", payload.as_bytes()).await;
    let outcome = projector.handle_delivery(&delivery).await.unwrap();

    assert_eq!(outcome, HandleOutcome::DeadLettered);
    assert_eq!(broker.unacked_count("product-events").await, 0);
    assert!(store.catalog_entry(ProductId::new(5)).await.unwrap().is_none());
    assert_eq!(store.dead_letters().await.unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn text_the_database_refuses_is_a_permanent_error() {
    let store = get_test_store().await;
    let event = IntegrationEvent::ProductCreated(ProductCreated {
        event_id: Uuid::new_v4(),
        product_id: ProductId::new(6),
        name: "Wid\0get".to_string(),
        category: "tools".to_string(),
        price: Money::from_cents(1000),
        stock: 1,
        timestamp: micros(Utc::now()),
    });

    let err = store.apply(&event).await.unwrap_err();

    assert!(err.is_permanent(), "{err}");
    assert!(store.watermark().await.unwrap().is_none());
}
