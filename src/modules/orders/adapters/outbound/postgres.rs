use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;

use crate::modules::orders::core::order::{Order, OrderStatus};
use crate::modules::orders::core::ports::{OrderStore, OrderStoreError};
use crate::shared::infrastructure::outbox::postgres::PgOutboxStore;
use crate::shared::infrastructure::outbox::OutboxMessage;

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: String,
    customer_id: String,
    amount: f64,
    status: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = OrderStoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_str(&row.status).map_err(OrderStoreError::Backend)?;
        Ok(Order {
            id: row.id,
            customer_id: row.customer_id,
            amount: row.amount,
            status,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn backend(err: sqlx::Error) -> OrderStoreError {
    OrderStoreError::Backend(err.to_string())
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn get(&self, id: &str) -> Result<Order, OrderStoreError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, customer_id, amount, status, description, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| OrderStoreError::NotFound(id.to_string()))?;

        row.try_into()
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Order>, OrderStoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, customer_id, amount, status, description, created_at, updated_at
            FROM orders
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn count(&self) -> Result<i64, OrderStoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(count)
    }

    async fn create_with_event(
        &self,
        order: &Order,
        event: OutboxMessage,
    ) -> Result<i64, OrderStoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, amount, status, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(order.amount)
        .bind(order.status.as_str())
        .bind(&order.description)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        let event_id = PgOutboxStore::create_in_tx(&mut tx, &event).await?;

        tx.commit().await.map_err(backend)?;
        Ok(event_id)
    }

    async fn update_with_event(
        &self,
        order: &Order,
        event: OutboxMessage,
    ) -> Result<i64, OrderStoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET customer_id = $1, amount = $2, status = $3, description = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(&order.customer_id)
        .bind(order.amount)
        .bind(order.status.as_str())
        .bind(&order.description)
        .bind(order.updated_at)
        .bind(&order.id)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(OrderStoreError::NotFound(order.id.clone()));
        }

        let event_id = PgOutboxStore::create_in_tx(&mut tx, &event).await?;

        tx.commit().await.map_err(backend)?;
        Ok(event_id)
    }
}
