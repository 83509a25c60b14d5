use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{NewOutboxEvent, OutboxError, OutboxEvent, OutboxId, OutboxStore, Result};

const OUTBOX_COLUMNS: &str =
    "id, topic, payload, created_at, published_at, claimed_by, claimed_until, attempts";

/// PostgreSQL-backed outbox relation.
#[derive(Clone)]
pub struct PostgresOutbox {
    pool: PgPool,
}

impl PostgresOutbox {
    /// Creates a new PostgreSQL outbox.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations for the whole system (write tables,
    /// outbox, read models).
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Appends an event inside the caller's write transaction.
    ///
    /// The row only becomes visible to relays when the caller commits, so a
    /// relay never observes an event whose domain mutation rolled back.
    pub async fn insert_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: &NewOutboxEvent,
    ) -> Result<OutboxEvent> {
        let row = sqlx::query(&format!(
            "INSERT INTO outbox (topic, payload) VALUES ($1, $2) RETURNING {OUTBOX_COLUMNS}"
        ))
        .bind(&event.topic)
        .bind(&event.payload)
        .fetch_one(&mut **tx)
        .await?;

        Self::row_to_event(row)
    }

    fn row_to_event(row: PgRow) -> Result<OutboxEvent> {
        Ok(OutboxEvent {
            id: OutboxId::new(row.try_get("id")?),
            topic: row.try_get("topic")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            published_at: row.try_get("published_at")?,
            claimed_by: row.try_get("claimed_by")?,
            claimed_until: row.try_get("claimed_until")?,
            attempts: row.try_get("attempts")?,
        })
    }
}

#[async_trait]
impl OutboxStore for PostgresOutbox {
    #[tracing::instrument(skip(self))]
    async fn claim_pending(
        &self,
        worker: &str,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<OutboxEvent>> {
        // SKIP LOCKED lets concurrent relays claim disjoint batches; the lease
        // columns keep the rows out of other batches after this statement commits.
        let rows = sqlx::query(
            r#"
            WITH candidates AS (
                SELECT id
                FROM outbox
                WHERE published_at IS NULL
                  AND (claimed_until IS NULL OR claimed_until <= NOW())
                ORDER BY id ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE outbox o
            SET claimed_by = $1,
                claimed_until = NOW() + make_interval(secs => $3),
                attempts = o.attempts + 1
            FROM candidates c
            WHERE o.id = c.id
            RETURNING o.id, o.topic, o.payload, o.created_at, o.published_at,
                      o.claimed_by, o.claimed_until, o.attempts
            "#,
        )
        .bind(worker)
        .bind(limit as i64)
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;

        // RETURNING does not preserve the CTE order.
        let mut events = rows
            .into_iter()
            .map(Self::row_to_event)
            .collect::<Result<Vec<_>>>()?;
        events.sort_by_key(|e| e.id);
        Ok(events)
    }

    async fn mark_published(&self, id: OutboxId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET published_at = NOW(), claimed_by = NULL, claimed_until = NULL
            WHERE id = $1 AND published_at IS NULL
            "#,
        )
        .bind(id.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match self.get(id).await? {
            Some(_) => Ok(false),
            None => Err(OutboxError::NotFound(id)),
        }
    }

    async fn release(&self, worker: &str, ids: &[OutboxId]) -> Result<()> {
        let ids: Vec<i64> = ids.iter().map(OutboxId::as_i64).collect();
        sqlx::query(
            r#"
            UPDATE outbox
            SET claimed_by = NULL, claimed_until = NULL
            WHERE id = ANY($1) AND claimed_by = $2 AND published_at IS NULL
            "#,
        )
        .bind(ids)
        .bind(worker)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: OutboxId) -> Result<Option<OutboxEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_event).transpose()
    }

    async fn pending_count(&self) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE published_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }
}
