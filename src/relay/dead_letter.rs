// Dead-letter re-driver: structurally a slower, more patient dispatcher.
// It re-runs dead letters through the same handler registry with a longer
// backoff ceiling, resolving the ones that heal and discarding the rest.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::MessageHandler;
use crate::shared::infrastructure::dead_letter::{
    DeadLetterMessage, DeadLetterStore, DeadLetterStoreError, REASON_NO_HANDLER,
};
use crate::shared::infrastructure::outbox::{OutboxMessage, OutboxStatus};
use crate::shared::infrastructure::retry::{self, BackoffStrategy, ExponentialBackoff, RetryPolicy};

#[derive(Clone)]
pub struct RedriverConfig {
    pub polling_interval: Duration,
    pub batch_size: i64,
    pub max_retries: u32,
    pub backoff: Arc<dyn BackoffStrategy>,
}

impl Default for RedriverConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(30),
            batch_size: 5,
            max_retries: 5,
            backoff: Arc::new(ExponentialBackoff {
                initial_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(120),
                multiplier: 2.0,
                jitter_factor: 0.1,
            }),
        }
    }
}

pub struct DeadLetterRedriver {
    dead_letters: Arc<dyn DeadLetterStore>,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    config: RedriverConfig,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Error)]
enum RedriveError {
    #[error("failed to mark message as retrying: {0}")]
    MarkRetrying(DeadLetterStoreError),

    #[error("no handler registered for event type: {0}")]
    NoHandler(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("failed to mark message as resolved: {0}")]
    MarkResolved(DeadLetterStoreError),
}

impl DeadLetterRedriver {
    pub fn new(dead_letters: Arc<dyn DeadLetterStore>, config: RedriverConfig) -> Self {
        Self {
            dead_letters,
            handlers: HashMap::new(),
            config,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Registers the handler for an event type; write-once at startup.
    pub fn register_handler(
        &mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) {
        self.handlers.insert(event_type.into(), handler);
    }

    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().expect("lock poisoned");
        if worker.is_some() {
            return;
        }

        let redriver = Arc::clone(self);
        *worker = Some(tokio::spawn(async move { redriver.run_loop().await }));

        info!(
            polling_interval_ms = self.config.polling_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            max_retries = self.config.max_retries,
            "dead letter re-driver started"
        );
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "dead letter re-driver worker ended abnormally");
            }
        }
    }

    /// Drains one batch immediately, outside the polling schedule.
    pub async fn run_once(&self) -> Result<(), DeadLetterStoreError> {
        let batch_cancel = self.cancel.child_token();
        self.process_batch(&batch_cancel).await
    }

    async fn run_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.polling_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }

        info!("dead letter re-driver stopped");
    }

    async fn tick(&self) {
        let batch_cancel = self.cancel.child_token();
        let batch = self.process_batch(&batch_cancel);
        tokio::pin!(batch);

        let result = tokio::select! {
            result = &mut batch => result,
            _ = tokio::time::sleep(self.config.polling_interval) => {
                batch_cancel.cancel();
                batch.await
            }
        };

        if let Err(err) = result {
            error!(error = %err, "failed to process dead letter batch");
        }
    }

    async fn process_batch(&self, cancel: &CancellationToken) -> Result<(), DeadLetterStoreError> {
        let messages = self.dead_letters.get_pending(self.config.batch_size).await?;

        if messages.is_empty() {
            debug!("no pending dead letter messages");
            return Ok(());
        }

        info!(count = messages.len(), "processing dead letter batch");

        for message in &messages {
            if cancel.is_cancelled() {
                break;
            }

            if let Err(err) = self.process_message(cancel, message).await {
                error!(
                    error = %err,
                    message_id = message.id,
                    aggregate_id = %message.aggregate_id,
                    event_type = %message.event_type,
                    retry_count = message.retry_count,
                    "failed to process dead letter message"
                );
            }
        }

        Ok(())
    }

    async fn process_message(
        &self,
        cancel: &CancellationToken,
        message: &DeadLetterMessage,
    ) -> Result<(), RedriveError> {
        self.dead_letters
            .mark_retrying(message.id)
            .await
            .map_err(RedriveError::MarkRetrying)?;

        let Some(handler) = self.handlers.get(&message.event_type) else {
            error!(
                message_id = message.id,
                event_type = %message.event_type,
                "no handler registered for dead letter event type"
            );

            if let Err(err) = self
                .dead_letters
                .mark_discarded(message.id, REASON_NO_HANDLER)
                .await
            {
                error!(error = %err, message_id = message.id, "failed to mark message as discarded");
            }

            return Err(RedriveError::NoHandler(message.event_type.clone()));
        };

        // Hand the handler an outbox-shaped envelope so dead letters and
        // live rows take the same delivery path.
        let envelope = OutboxMessage {
            id: 0,
            aggregate_type: message.aggregate_type.clone(),
            aggregate_id: message.aggregate_id.clone(),
            event_type: message.event_type.clone(),
            payload: message.payload.clone(),
            created_at: Utc::now(),
            processed_at: None,
            processing_attempts: 0,
            last_error: None,
            status: OutboxStatus::Pending,
        };

        let policy = RetryPolicy::new(self.config.max_retries, Arc::clone(&self.config.backoff));
        let result = retry::run_with_discard(
            &policy,
            cancel,
            || handler.handle(cancel, &envelope),
            |last| {
                let reason = format!(
                    "Failed to process message after {} attempts: {last}",
                    self.config.max_retries
                );
                async move {
                    if let Err(err) = self.dead_letters.mark_discarded(message.id, &reason).await {
                        error!(
                            error = %err,
                            message_id = message.id,
                            "failed to mark message as discarded"
                        );
                    }
                }
            },
        )
        .await;

        match result {
            Ok(()) => {
                self.dead_letters
                    .mark_resolved(message.id)
                    .await
                    .map_err(RedriveError::MarkResolved)?;

                info!(
                    message_id = message.id,
                    aggregate_id = %message.aggregate_id,
                    event_type = %message.event_type,
                    "successfully re-drove dead letter message"
                );
                Ok(())
            }
            Err(err) => Err(RedriveError::Handler(err.to_string())),
        }
    }
}
