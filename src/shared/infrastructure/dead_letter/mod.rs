// Dead-letter queue: messages the dispatcher has given up on, kept for
// re-drive under a stronger retry policy or for manual intervention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use thiserror::Error;

use super::outbox::OutboxMessage;

pub mod in_memory;
pub mod postgres;

pub const REASON_NO_HANDLER: &str = "No handler available";
pub const REASON_MAX_RETRIES: &str = "Max retries exceeded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterStatus {
    Pending,
    Retrying,
    Resolved,
    Discarded,
}

impl DeadLetterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retrying => "retrying",
            Self::Resolved => "resolved",
            Self::Discarded => "discarded",
        }
    }
}

impl FromStr for DeadLetterStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "retrying" => Ok(Self::Retrying),
            "resolved" => Ok(Self::Resolved),
            "discarded" => Ok(Self::Discarded),
            other => Err(format!("unknown dead letter status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetterMessage {
    pub id: i64,
    pub original_message_id: i64,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub error_message: String,
    pub failure_reason: String,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub status: DeadLetterStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DeadLetterMessage {
    /// Builds a pending dead letter from the outbox row that failed.
    pub fn from_outbox(
        message: &OutboxMessage,
        error_message: impl Into<String>,
        failure_reason: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            original_message_id: message.id,
            aggregate_type: message.aggregate_type.clone(),
            aggregate_id: message.aggregate_id.clone(),
            event_type: message.event_type.clone(),
            payload: message.payload.clone(),
            error_message: error_message.into(),
            failure_reason: failure_reason.into(),
            retry_count: 0,
            last_retry_at: None,
            status: DeadLetterStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum DeadLetterStoreError {
    #[error("dead letter message {0} not found")]
    NotFound(i64),

    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn create(&self, message: DeadLetterMessage) -> Result<i64, DeadLetterStoreError>;

    async fn get(&self, id: i64) -> Result<DeadLetterMessage, DeadLetterStoreError>;

    /// Pending rows ordered by `created_at` ascending.
    async fn get_pending(&self, limit: i64)
        -> Result<Vec<DeadLetterMessage>, DeadLetterStoreError>;

    /// Marks a row retrying, increments its retry counter and stamps the
    /// retry time.
    async fn mark_retrying(&self, id: i64) -> Result<(), DeadLetterStoreError>;

    async fn mark_resolved(&self, id: i64) -> Result<(), DeadLetterStoreError>;

    /// Terminal discard; appends the reason to `failure_reason` and stamps
    /// `resolved_at`.
    async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), DeadLetterStoreError>;

    /// Conditional transition retrying → pending so a stuck row re-enters
    /// the re-driver's queue. A no-op for rows in any other state.
    async fn reset_to_retry(&self, id: i64) -> Result<(), DeadLetterStoreError>;
}
