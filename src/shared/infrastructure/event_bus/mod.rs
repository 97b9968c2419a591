// Downstream bus contract: publications are keyed by aggregate id so the
// broker's per-key partitioning preserves per-aggregate order, and carry a
// serialized envelope whose `event_id` is the consumer-side dedup key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod pulsar;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub event_id: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum EventProducerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("broker rejected publish with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait EventProducer: Send + Sync {
    /// Publishes one message to `topic`, keyed by `key`, returning once the
    /// broker has acknowledged it.
    async fn publish(&self, topic: &str, key: &str, payload: &[u8])
        -> Result<(), EventProducerError>;
}
