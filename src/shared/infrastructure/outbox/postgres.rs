use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use tracing::error;

use super::{OutboxMessage, OutboxStatus, OutboxStore, OutboxStoreError};

#[derive(Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    payload: Vec<u8>,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
    processing_attempts: i32,
    last_error: Option<String>,
    status: String,
}

impl TryFrom<OutboxRow> for OutboxMessage {
    type Error = OutboxStoreError;

    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let status = OutboxStatus::from_str(&row.status).map_err(OutboxStoreError::Backend)?;
        Ok(OutboxMessage {
            id: row.id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
            processed_at: row.processed_at,
            processing_attempts: row.processing_attempts,
            last_error: row.last_error,
            status,
        })
    }
}

fn backend(err: sqlx::Error) -> OutboxStoreError {
    OutboxStoreError::Backend(err.to_string())
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an outbox row inside the caller's transaction, so the row
    /// commits or rolls back together with the business mutation. This is
    /// the only insert path for outbox rows.
    pub async fn create_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        message: &OutboxMessage,
    ) -> Result<i64, OutboxStoreError> {
        if message.status != OutboxStatus::Pending {
            return Err(OutboxStoreError::InvalidState(format!(
                "outbox rows must be inserted as pending, got {}",
                message.status.as_str()
            )));
        }

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO outbox_messages (
                aggregate_type, aggregate_id, event_type, payload, created_at, status
            ) VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&message.aggregate_type)
        .bind(&message.aggregate_id)
        .bind(&message.event_type)
        .bind(&message.payload)
        .bind(message.created_at)
        .bind(message.status.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(backend)?;

        Ok(id)
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    async fn get_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, OutboxStoreError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, aggregate_type, aggregate_id, event_type, payload,
                   created_at, processed_at, processing_attempts, last_error, status
            FROM outbox_messages
            WHERE status = $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(OutboxStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|err| {
            error!(error = %err, "failed to fetch pending outbox messages");
            backend(err)
        })?;

        rows.into_iter().map(OutboxMessage::try_from).collect()
    }

    async fn mark_processing(&self, id: i64) -> Result<(), OutboxStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = $1, processing_attempts = processing_attempts + 1
            WHERE id = $2
            "#,
        )
        .bind(OutboxStatus::Processing.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(OutboxStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn mark_completed(&self, id: i64) -> Result<(), OutboxStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = $1, processed_at = $2
            WHERE id = $3
            "#,
        )
        .bind(OutboxStatus::Completed.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(OutboxStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), OutboxStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = $1, last_error = $2
            WHERE id = $3
            "#,
        )
        .bind(OutboxStatus::Failed.as_str())
        .bind(error_message)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(OutboxStoreError::NotFound(id));
        }
        Ok(())
    }
}
