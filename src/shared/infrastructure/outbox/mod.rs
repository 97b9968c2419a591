// Transactional outbox: rows describing domain events, co-written with the
// business mutation they belong to and drained asynchronously by the
// dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::str::FromStr;
use thiserror::Error;

pub mod in_memory;
pub mod postgres;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutboxMessage {
    pub id: i64,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_attempts: i32,
    pub last_error: Option<String>,
    pub status: OutboxStatus,
}

impl OutboxMessage {
    /// A freshly minted pending row, ready for `create_in_tx`.
    pub fn pending(
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            id: 0,
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
            processed_at: None,
            processing_attempts: 0,
            last_error: None,
            status: OutboxStatus::Pending,
        }
    }
}

#[derive(Debug, Error)]
pub enum OutboxStoreError {
    #[error("outbox message {0} not found")]
    NotFound(i64),

    #[error("invalid outbox state: {0}")]
    InvalidState(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Worker-facing outbox operations. The insert path is deliberately absent
/// here: business handlers co-write rows inside their own transaction via
/// the concrete store's `create_in_tx`.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Pending rows ordered by `created_at` ascending. Rows are not claimed.
    async fn get_pending(&self, limit: i64) -> Result<Vec<OutboxMessage>, OutboxStoreError>;

    /// Marks a row processing and increments its attempt counter.
    async fn mark_processing(&self, id: i64) -> Result<(), OutboxStoreError>;

    async fn mark_completed(&self, id: i64) -> Result<(), OutboxStoreError>;

    async fn mark_failed(&self, id: i64, error_message: &str) -> Result<(), OutboxStoreError>;
}
