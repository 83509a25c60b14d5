//! Relay against the PostgreSQL outbox and the PostgreSQL broker queue.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p relay --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use broker::{Broker, PostgresBroker};
use futures_util::StreamExt;
use outbox::{NewOutboxEvent, OutboxStore, PostgresOutbox};
use relay::{OutboxRelay, RelayConfig};
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

async fn connect() -> PgPool {
    let info = get_container_info().await;
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap()
}

#[tokio::test]
#[serial]
async fn relayed_events_survive_a_restart_of_the_process() {
    let pool = connect().await;
    sqlx::query("TRUNCATE TABLE outbox, broker_messages RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    let outbox = PostgresOutbox::new(pool.clone());
    for seq in 0..3 {
        let mut tx = pool.begin().await.unwrap();
        PostgresOutbox::insert_in_tx(
            &mut tx,
            &NewOutboxEvent::new(
                "order-events",
                serde_json::json!({"eventType": "OrderCreated", "seq": seq}),
            ),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    let relay = OutboxRelay::new(
        outbox.clone(),
        PostgresBroker::new(pool.clone()),
        RelayConfig::default(),
    );
    assert_eq!(relay.run_cycle().await.unwrap().published, 3);
    assert_eq!(outbox.pending_count().await.unwrap(), 0);

    // Nothing consumed yet; the process goes away.
    drop(relay);
    pool.close().await;

    let broker = PostgresBroker::new(connect().await).with_poll_interval(Duration::from_millis(20));
    let mut stream = broker.subscribe("order-events").await.unwrap();
    let mut seqs = Vec::new();
    for _ in 0..3 {
        let delivery = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&delivery.payload).unwrap();
        seqs.push(value["seq"].as_u64().unwrap());
        broker.ack(&delivery).await.unwrap();
    }
    assert_eq!(seqs, vec![0, 1, 2]);
}
