use std::borrow::Cow;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use domain::{IntegrationEvent, Money, OrderCreated, ProductCreated};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::Result;
use crate::store::{ApplyOutcome, ReadModelStore};
use crate::views::{CatalogEntry, DeadLetter, OrderSummary, ProductSales};

/// Watermark row used when no name is given.
pub const DEFAULT_PROJECTION_NAME: &str = "read_models";

/// PostgreSQL-backed read models.
#[derive(Clone)]
pub struct PostgresReadModels {
    pool: PgPool,
    name: String,
}

impl PostgresReadModels {
    pub fn new(pool: PgPool) -> Self {
        Self::with_name(pool, DEFAULT_PROJECTION_NAME)
    }

    /// Uses a separate watermark row, for running more than one projector
    /// against the same database.
    pub fn with_name(pool: PgPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn apply_order(tx: &mut Transaction<'_, Postgres>, event: &OrderCreated) -> Result<()> {
        let summary = OrderSummary::from_event(event);
        let inserted = sqlx::query(
            r#"
            INSERT INTO orders_read (order_id, customer_id, total_cents, item_count, created_at, event_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(summary.order_id.as_i64())
        .bind(summary.customer_id.as_i64())
        .bind(summary.total.cents())
        .bind(summary.item_count)
        .bind(summary.created_at)
        .bind(summary.event_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        // Sales only move when the order row is new.
        if inserted == 0 {
            return Ok(());
        }

        for delta in ProductSales::deltas(event) {
            sqlx::query(
                r#"
                INSERT INTO product_sales_view (product_id, total_quantity_sold, total_revenue_cents, order_count)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (product_id) DO UPDATE SET
                    total_quantity_sold = product_sales_view.total_quantity_sold + EXCLUDED.total_quantity_sold,
                    total_revenue_cents = product_sales_view.total_revenue_cents + EXCLUDED.total_revenue_cents,
                    order_count = product_sales_view.order_count + EXCLUDED.order_count
                "#,
            )
            .bind(delta.product_id.as_i64())
            .bind(delta.total_quantity_sold)
            .bind(delta.total_revenue.cents())
            .bind(delta.order_count)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    async fn apply_product(
        tx: &mut Transaction<'_, Postgres>,
        event: &ProductCreated,
    ) -> Result<()> {
        let entry = CatalogEntry::from_event(event);
        sqlx::query(
            r#"
            INSERT INTO product_catalog_read (product_id, name, category, price_cents, stock, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id) DO NOTHING
            "#,
        )
        .bind(entry.product_id.as_i64())
        .bind(&entry.name)
        .bind(&entry.category)
        .bind(entry.price.cents())
        .bind(entry.stock)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ReadModelStore for PostgresReadModels {
    #[tracing::instrument(skip(self, event), fields(event_id = %event.event_id(), event_type = event.event_type()))]
    async fn apply(&self, event: &IntegrationEvent) -> Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event.event_id())
        .bind(event.event_type())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if recorded == 0 {
            tx.rollback().await?;
            return Ok(ApplyOutcome::Duplicate);
        }

        match event {
            IntegrationEvent::OrderCreated(e) => Self::apply_order(&mut tx, e).await?,
            IntegrationEvent::ProductCreated(e) => Self::apply_product(&mut tx, e).await?,
        }

        sqlx::query(
            r#"
            INSERT INTO projection_watermark (name, last_processed_event_time)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET
                last_processed_event_time = GREATEST(
                    projection_watermark.last_processed_event_time,
                    EXCLUDED.last_processed_event_time
                )
            "#,
        )
        .bind(&self.name)
        .bind(event.timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ApplyOutcome::Applied)
    }

    async fn park_dead_letter(&self, topic: &str, payload: &str, reason: &str) -> Result<()> {
        let topic = escape_nul(topic);
        let payload = escape_nul(payload);
        let reason = escape_nul(reason);
        sqlx::query("INSERT INTO dead_letters (topic, payload, reason) VALUES ($1, $2, $3)")
            .bind(topic.as_ref())
            .bind(payload.as_ref())
            .bind(reason.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn watermark(&self) -> Result<Option<DateTime<Utc>>> {
        let watermark: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT last_processed_event_time FROM projection_watermark WHERE name = $1",
        )
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(watermark)
    }

    async fn order(&self, id: OrderId) -> Result<Option<OrderSummary>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, customer_id, total_cents, item_count, created_at, event_id
            FROM orders_read
            WHERE order_id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row: PgRow| -> Result<OrderSummary> {
            Ok(OrderSummary {
                order_id: OrderId::new(row.try_get("order_id")?),
                customer_id: CustomerId::new(row.try_get("customer_id")?),
                total: Money::from_cents(row.try_get("total_cents")?),
                item_count: row.try_get("item_count")?,
                created_at: row.try_get("created_at")?,
                event_id: row.try_get("event_id")?,
            })
        })
        .transpose()
    }

    async fn product_sales(&self, id: ProductId) -> Result<Option<ProductSales>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, total_quantity_sold, total_revenue_cents, order_count
            FROM product_sales_view
            WHERE product_id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row: PgRow| -> Result<ProductSales> {
            Ok(ProductSales {
                product_id: ProductId::new(row.try_get("product_id")?),
                total_quantity_sold: row.try_get("total_quantity_sold")?,
                total_revenue: Money::from_cents(row.try_get("total_revenue_cents")?),
                order_count: row.try_get("order_count")?,
            })
        })
        .transpose()
    }

    async fn catalog_entry(&self, id: ProductId) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, category, price_cents, stock, created_at
            FROM product_catalog_read
            WHERE product_id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row: PgRow| -> Result<CatalogEntry> {
            Ok(CatalogEntry {
                product_id: ProductId::new(row.try_get("product_id")?),
                name: row.try_get("name")?,
                category: row.try_get("category")?,
                price: Money::from_cents(row.try_get("price_cents")?),
                stock: row.try_get("stock")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            "SELECT id, topic, payload, reason, received_at FROM dead_letters ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<DeadLetter> {
                Ok(DeadLetter {
                    id: row.try_get("id")?,
                    topic: row.try_get("topic")?,
                    payload: row.try_get("payload")?,
                    reason: row.try_get("reason")?,
                    received_at: row.try_get("received_at")?,
                })
            })
            .collect()
    }
}

/// PostgreSQL text columns reject NUL, so dead letters keep it as a
/// visible `\u0000` escape.
fn escape_nul(text: &str) -> Cow<'_, str> {
    if text.contains('\0') {
        Cow::Owned(text.replace('\0', "\\u0000"))
    } else {
        Cow::Borrowed(text)
    }
}
