use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, ProductId};
use outbox::{NewOutboxEvent, PostgresOutbox};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::Result;
use crate::store::{Committed, WriteStore};
use crate::{CreateOrder, CreateProduct, IntegrationEvent, Money, Order, OrderItem, Product};

/// PostgreSQL-backed write store.
///
/// Each mutation runs in one `sqlx` transaction covering the domain tables
/// and the outbox insert. Any error returns early and drops the transaction,
/// which rolls it back.
#[derive(Clone)]
pub struct PostgresWriteStore {
    pool: PgPool,
}

impl PostgresWriteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: row.try_get("stock")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn load_items(&self, order_ids: &[i64]) -> Result<Vec<(i64, OrderItem)>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id ASC, line_no ASC
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(i64, OrderItem)> {
                Ok((
                    row.try_get("order_id")?,
                    OrderItem::new(
                        ProductId::new(row.try_get("product_id")?),
                        row.try_get("quantity")?,
                        Money::from_cents(row.try_get("unit_price_cents")?),
                    ),
                ))
            })
            .collect()
    }

    async fn load_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let mut orders = rows
            .into_iter()
            .map(|row| -> Result<Order> {
                Ok(Order {
                    id: OrderId::new(row.try_get("id")?),
                    customer_id: CustomerId::new(row.try_get("customer_id")?),
                    items: Vec::new(),
                    total: Money::from_cents(row.try_get("total_cents")?),
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<i64> = orders.iter().map(|o| o.id.as_i64()).collect();
        for (order_id, item) in self.load_items(&ids).await? {
            if let Some(order) = orders.iter_mut().find(|o| o.id.as_i64() == order_id) {
                order.items.push(item);
            }
        }

        Ok(orders)
    }
}

#[async_trait]
impl WriteStore for PostgresWriteStore {
    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    async fn insert_product(&self, product: CreateProduct) -> Result<Committed<Product>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO products (name, category, price_cents, stock)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            "#,
        )
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price.cents())
        .bind(product.stock)
        .fetch_one(&mut *tx)
        .await?;

        let id = ProductId::new(row.try_get("id")?);
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let product = product.into_product(id, created_at);

        let event = IntegrationEvent::product_created(&product);
        let stored = PostgresOutbox::insert_in_tx(
            &mut tx,
            &NewOutboxEvent::serialize(event.topic(), &event)?,
        )
        .await?;

        tx.commit().await?;

        Ok(Committed {
            record: product,
            event,
            outbox_id: stored.id,
        })
    }

    #[tracing::instrument(skip(self, order), fields(customer_id = %order.customer_id))]
    async fn insert_order(&self, order: CreateOrder, total: Money) -> Result<Committed<Order>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO orders (customer_id, total_cents)
            VALUES ($1, $2)
            RETURNING id, created_at
            "#,
        )
        .bind(order.customer_id.as_i64())
        .bind(total.cents())
        .fetch_one(&mut *tx)
        .await?;

        let id = OrderId::new(row.try_get("id")?);
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price_cents)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id.as_i64())
            .bind(line_no as i32)
            .bind(item.product_id.as_i64())
            .bind(item.quantity)
            .bind(item.price.cents())
            .execute(&mut *tx)
            .await?;
        }

        let order = order.into_order(id, total, created_at);
        let event = IntegrationEvent::order_created(&order);
        let stored = PostgresOutbox::insert_in_tx(
            &mut tx,
            &NewOutboxEvent::serialize(event.topic(), &event)?,
        )
        .await?;

        tx.commit().await?;

        Ok(Committed {
            record: order,
            event,
            outbox_id: stored.id,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let rows = sqlx::query(
            "SELECT id, customer_id, total_cents, created_at FROM orders WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(self.load_orders(rows).await?.into_iter().next())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT id, customer_id, total_cents, created_at FROM orders ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        self.load_orders(rows).await
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT id, name, category, price_cents, stock, created_at FROM products ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_product).collect()
    }
}
