use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::MessageHandler;
use crate::shared::core::errors::AppError;
use crate::shared::infrastructure::event_bus::{EventEnvelope, EventProducer, EventProducerError};
use crate::shared::infrastructure::outbox::OutboxMessage;

/// Log-only handler: decodes the envelope and emits a structured line.
/// Used as the delivery target when no bus is configured.
pub struct LoggingHandler;

impl LoggingHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageHandler for LoggingHandler {
    async fn handle(
        &self,
        _cancel: &CancellationToken,
        message: &OutboxMessage,
    ) -> Result<(), AppError> {
        let envelope: EventEnvelope = serde_json::from_slice(&message.payload)
            .map_err(|err| AppError::internal(format!("failed to decode event payload: {err}")))?;

        info!(
            message_id = message.id,
            event_type = %message.event_type,
            aggregate_id = %message.aggregate_id,
            event_id = %envelope.event_id,
            occurred_at = %envelope.occurred_at,
            "handling outbox message"
        );
        Ok(())
    }
}

/// Publishes the message to the downstream bus, keyed by aggregate id so
/// the broker keeps per-aggregate order.
pub struct BusPublishHandler {
    producer: Arc<dyn EventProducer>,
    topic: String,
}

impl BusPublishHandler {
    pub fn new(producer: Arc<dyn EventProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl MessageHandler for BusPublishHandler {
    async fn handle(
        &self,
        _cancel: &CancellationToken,
        message: &OutboxMessage,
    ) -> Result<(), AppError> {
        self.producer
            .publish(&self.topic, &message.aggregate_id, &message.payload)
            .await
            .map_err(|err| match err {
                EventProducerError::Transport(detail) => {
                    AppError::temporary(format!("bus publish failed: {detail}"))
                }
                EventProducerError::Rejected(status) => AppError::ServiceUnavailable(format!(
                    "bus rejected publish with status {status}"
                )),
            })?;

        info!(
            message_id = message.id,
            aggregate_id = %message.aggregate_id,
            topic = %self.topic,
            "published message to bus"
        );
        Ok(())
    }
}
