use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;

use super::{DeadLetterMessage, DeadLetterStatus, DeadLetterStore, DeadLetterStoreError};

#[derive(Clone)]
pub struct PgDeadLetterStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct DeadLetterRow {
    id: i64,
    original_message_id: i64,
    aggregate_type: String,
    aggregate_id: String,
    event_type: String,
    payload: Vec<u8>,
    error_message: String,
    failure_reason: String,
    retry_count: i32,
    last_retry_at: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<DeadLetterRow> for DeadLetterMessage {
    type Error = DeadLetterStoreError;

    fn try_from(row: DeadLetterRow) -> Result<Self, Self::Error> {
        let status =
            DeadLetterStatus::from_str(&row.status).map_err(DeadLetterStoreError::Backend)?;
        Ok(DeadLetterMessage {
            id: row.id,
            original_message_id: row.original_message_id,
            aggregate_type: row.aggregate_type,
            aggregate_id: row.aggregate_id,
            event_type: row.event_type,
            payload: row.payload,
            error_message: row.error_message,
            failure_reason: row.failure_reason,
            retry_count: row.retry_count,
            last_retry_at: row.last_retry_at,
            status,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

fn backend(err: sqlx::Error) -> DeadLetterStoreError {
    DeadLetterStoreError::Backend(err.to_string())
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, original_message_id, aggregate_type, aggregate_id, event_type, payload,
           error_message, failure_reason, retry_count, last_retry_at, status,
           created_at, resolved_at
    FROM dead_letter_messages
"#;

impl PgDeadLetterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeadLetterStore for PgDeadLetterStore {
    async fn create(&self, message: DeadLetterMessage) -> Result<i64, DeadLetterStoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO dead_letter_messages (
                original_message_id, aggregate_type, aggregate_id, event_type, payload,
                error_message, failure_reason, retry_count, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(message.original_message_id)
        .bind(&message.aggregate_type)
        .bind(&message.aggregate_id)
        .bind(&message.event_type)
        .bind(&message.payload)
        .bind(&message.error_message)
        .bind(&message.failure_reason)
        .bind(message.retry_count)
        .bind(message.status.as_str())
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<DeadLetterMessage, DeadLetterStoreError> {
        let row = sqlx::query_as::<_, DeadLetterRow>(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(DeadLetterStoreError::NotFound(id))?;

        row.try_into()
    }

    async fn get_pending(
        &self,
        limit: i64,
    ) -> Result<Vec<DeadLetterMessage>, DeadLetterStoreError> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(&format!(
            "{SELECT_COLUMNS} WHERE status = $1 ORDER BY created_at ASC LIMIT $2"
        ))
        .bind(DeadLetterStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(DeadLetterMessage::try_from).collect()
    }

    async fn mark_retrying(&self, id: i64) -> Result<(), DeadLetterStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE dead_letter_messages
            SET status = $1, retry_count = retry_count + 1, last_retry_at = $2
            WHERE id = $3
            "#,
        )
        .bind(DeadLetterStatus::Retrying.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(DeadLetterStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn mark_resolved(&self, id: i64) -> Result<(), DeadLetterStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE dead_letter_messages
            SET status = $1, resolved_at = $2
            WHERE id = $3
            "#,
        )
        .bind(DeadLetterStatus::Resolved.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(DeadLetterStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), DeadLetterStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE dead_letter_messages
            SET status = $1,
                failure_reason = failure_reason || ' | Discarded: ' || $2,
                resolved_at = $3
            WHERE id = $4
            "#,
        )
        .bind(DeadLetterStatus::Discarded.as_str())
        .bind(reason)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(DeadLetterStoreError::NotFound(id));
        }
        Ok(())
    }

    async fn reset_to_retry(&self, id: i64) -> Result<(), DeadLetterStoreError> {
        sqlx::query(
            r#"
            UPDATE dead_letter_messages
            SET status = $1
            WHERE id = $2 AND status = $3
            "#,
        )
        .bind(DeadLetterStatus::Pending.as_str())
        .bind(id)
        .bind(DeadLetterStatus::Retrying.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }
}
