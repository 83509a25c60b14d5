use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Broker, BrokerError, Delivery, DeliveryStream, DeliveryTag, Result};

/// Broker whose topics are queues in a PostgreSQL table.
///
/// A publish returns once its insert has committed, so a confirmed message
/// survives a process restart. Subscribers claim one message at a time with
/// `FOR UPDATE SKIP LOCKED`, which makes subscribers on the same topic
/// competing consumers. A claimed message stays invisible to other
/// consumers until it is acked (deleted), nacked, its subscription stream
/// is dropped, or the ack timeout runs out; in the last three cases it is
/// delivered again with `redelivered` set.
#[derive(Clone)]
pub struct PostgresBroker {
    pool: PgPool,
    poll_interval: Duration,
    ack_timeout: Duration,
}

impl PostgresBroker {
    /// Creates a broker polling every 200ms with a 30s ack timeout.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: Duration::from_millis(200),
            ack_timeout: Duration::from_secs(30),
        }
    }

    /// How long an idle subscription waits before looking for messages again.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// How long a delivery may stay unacked before it is handed out again.
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations, including the broker queue table.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Number of messages on `topic` that are not currently claimed.
    pub async fn queue_depth(&self, topic: &str) -> Result<u64> {
        let depth: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM broker_messages
            WHERE topic = $1 AND (invisible_until IS NULL OR invisible_until <= NOW())
            "#,
        )
        .bind(topic)
        .fetch_one(&self.pool)
        .await?;
        Ok(depth as u64)
    }

    async fn claim_next(&self, topic: &str, consumer: Uuid) -> Result<Option<Delivery>> {
        let row = sqlx::query(
            r#"
            WITH next AS (
                SELECT id
                FROM broker_messages
                WHERE topic = $1
                  AND (invisible_until IS NULL OR invisible_until <= NOW())
                ORDER BY id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE broker_messages m
            SET delivery_tag = nextval('broker_delivery_tags'),
                consumer = $2,
                invisible_until = NOW() + make_interval(secs => $3),
                delivery_count = m.delivery_count + 1
            FROM next
            WHERE m.id = next.id
            RETURNING m.delivery_tag, m.topic, m.payload, m.delivery_count
            "#,
        )
        .bind(topic)
        .bind(consumer)
        .bind(self.ack_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_delivery).transpose()
    }

    fn row_to_delivery(row: PgRow) -> Result<Delivery> {
        let tag: i64 = row.try_get("delivery_tag")?;
        let delivery_count: i32 = row.try_get("delivery_count")?;
        Ok(Delivery {
            tag: DeliveryTag::new(tag as u64),
            topic: row.try_get("topic")?,
            payload: row.try_get("payload")?,
            redelivered: delivery_count > 1,
        })
    }

    async fn release_consumer(pool: &PgPool, consumer: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE broker_messages
            SET delivery_tag = NULL, consumer = NULL, invisible_until = NULL
            WHERE consumer = $1
            "#,
        )
        .bind(consumer)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Unfold state of one subscription stream. Dropping it hands the
/// subscription's unacked deliveries back to the queue.
struct Subscription {
    broker: PostgresBroker,
    topic: String,
    consumer: Uuid,
}

impl Subscription {
    async fn next(&self) -> Result<Delivery> {
        loop {
            if let Some(delivery) = self.broker.claim_next(&self.topic, self.consumer).await? {
                return Ok(delivery);
            }
            tokio::time::sleep(self.broker.poll_interval).await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Without a runtime the claims still return when the ack timeout ends.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let pool = self.broker.pool.clone();
        let consumer = self.consumer;
        let topic = std::mem::take(&mut self.topic);
        runtime.spawn(async move {
            match PostgresBroker::release_consumer(&pool, consumer).await {
                Ok(0) => {}
                Ok(requeued) => tracing::debug!(
                    %topic,
                    %consumer,
                    requeued,
                    "subscription dropped, unacked deliveries requeued"
                ),
                Err(err) => tracing::warn!(
                    %topic,
                    %consumer,
                    error = %err,
                    "could not requeue deliveries, they return after the ack timeout"
                ),
            }
        });
    }
}

#[async_trait]
impl Broker for PostgresBroker {
    #[tracing::instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        sqlx::query("INSERT INTO broker_messages (topic, payload) VALUES ($1, $2)")
            .bind(topic)
            .bind(payload)
            .execute(&self.pool)
            .await?;
        tracing::debug!("message confirmed");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<DeliveryStream> {
        // Fail fast when the database is unreachable.
        sqlx::query("SELECT 1").execute(&self.pool).await?;

        let subscription = Subscription {
            broker: self.clone(),
            topic: topic.to_string(),
            consumer: Uuid::new_v4(),
        };
        tracing::debug!(topic, consumer = %subscription.consumer, "subscribed");

        let stream = futures_util::stream::unfold(subscription, |subscription| async move {
            let next = subscription.next().await;
            Some((next, subscription))
        });
        Ok(Box::pin(stream))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let result =
            sqlx::query("DELETE FROM broker_messages WHERE delivery_tag = $1 AND topic = $2")
                .bind(delivery.tag.as_u64() as i64)
                .bind(&delivery.topic)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(BrokerError::UnknownDelivery(delivery.tag));
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let query = if requeue {
            r#"
            UPDATE broker_messages
            SET delivery_tag = NULL, consumer = NULL, invisible_until = NULL
            WHERE delivery_tag = $1 AND topic = $2
            "#
        } else {
            "DELETE FROM broker_messages WHERE delivery_tag = $1 AND topic = $2"
        };

        let result = sqlx::query(query)
            .bind(delivery.tag.as_u64() as i64)
            .bind(&delivery.topic)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(BrokerError::UnknownDelivery(delivery.tag));
        }
        if !requeue {
            tracing::warn!(topic = %delivery.topic, tag = %delivery.tag, "message dropped by nack");
        }
        Ok(())
    }
}
