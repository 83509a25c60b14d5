//! PostgreSQL integration tests for the outbox writer.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p domain --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use common::{CustomerId, ProductId};
use domain::{
    CommandService, CreateOrder, CreateProduct, DomainError, Money, OrderItem, PostgresWriteStore,
    WriteStore,
};
use outbox::{OutboxStore, PostgresOutbox};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

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
            PostgresOutbox::new(temp_pool.clone())
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

async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders, products, outbox RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn two_line_order() -> CreateOrder {
    CreateOrder::new(
        CustomerId::new(7),
        vec![
            OrderItem::new(ProductId::new(1), 2, Money::from_cents(1000)),
            OrderItem::new(ProductId::new(2), 1, Money::from_cents(500)),
        ],
    )
}

#[tokio::test]
#[serial]
async fn create_order_commits_row_items_and_event() {
    let pool = get_test_pool().await;
    let service = CommandService::new(PostgresWriteStore::new(pool.clone()));
    let outbox = PostgresOutbox::new(pool);

    let committed = service.create_order(two_line_order()).await.unwrap();

    let stored = service.get_order(committed.record.id).await.unwrap().unwrap();
    assert_eq!(stored.total, Money::from_cents(2500));
    assert_eq!(stored.items, committed.record.items);

    let event = outbox.get(committed.outbox_id).await.unwrap().unwrap();
    assert_eq!(event.topic, "order-events");
    assert_eq!(event.payload["eventType"], "OrderCreated");
    assert_eq!(event.payload["orderId"], committed.record.id.as_i64());
    assert_eq!(event.payload["total"], 25.0);
    assert!(event.is_pending());
}

#[tokio::test]
#[serial]
async fn failed_outbox_insert_rolls_back_the_order() {
    let pool = get_test_pool().await;
    let store = PostgresWriteStore::new(pool.clone());

    sqlx::query("ALTER TABLE outbox ADD CONSTRAINT reject_orders CHECK (topic <> 'order-events')")
        .execute(&pool)
        .await
        .unwrap();

    let result = store
        .insert_order(two_line_order(), Money::from_cents(2500))
        .await;

    sqlx::query("ALTER TABLE outbox DROP CONSTRAINT reject_orders")
        .execute(&pool)
        .await
        .unwrap();

    assert!(matches!(result, Err(DomainError::Outbox(_))));
    assert!(store.list_orders().await.unwrap().is_empty());

    let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_items")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(items, 0);
    assert_eq!(PostgresOutbox::new(pool).pending_count().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn product_writes_are_listed_in_id_order() {
    let pool = get_test_pool().await;
    let service = CommandService::new(PostgresWriteStore::new(pool.clone()));

    for name in ["Chair", "Table", "Lamp"] {
        service
            .create_product(CreateProduct::new(name, "home", Money::from_cents(1999), 5))
            .await
            .unwrap();
    }

    let names: Vec<String> = service
        .list_products()
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, ["Chair", "Table", "Lamp"]);

    let claimed = PostgresOutbox::new(pool)
        .claim_pending("test", 10, Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(claimed.len(), 3);
    assert!(claimed.iter().all(|e| e.topic == "product-events"));
}
