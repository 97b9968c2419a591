// Outbox dispatcher: a single long-lived worker that polls for pending
// rows, runs each one through its registered handler under the retry
// policy, and transitions the row to its terminal status. A failure on one
// message never aborts the rest of the batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::MessageHandler;
use crate::shared::infrastructure::dead_letter::{
    DeadLetterMessage, DeadLetterStore, REASON_MAX_RETRIES, REASON_NO_HANDLER,
};
use crate::shared::infrastructure::outbox::{OutboxMessage, OutboxStore, OutboxStoreError};
use crate::shared::infrastructure::retry::{self, BackoffStrategy, ExponentialBackoff, RetryPolicy};

#[derive(Clone)]
pub struct DispatcherConfig {
    pub polling_interval: Duration,
    pub batch_size: i64,
    pub max_retries: u32,
    pub backoff: Arc<dyn BackoffStrategy>,
    pub use_dead_letter_queue: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(5),
            batch_size: 10,
            max_retries: 3,
            backoff: Arc::new(ExponentialBackoff::default()),
            use_dead_letter_queue: true,
        }
    }
}

pub struct OutboxDispatcher {
    outbox: Arc<dyn OutboxStore>,
    dead_letters: Arc<dyn DeadLetterStore>,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    config: DispatcherConfig,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Error)]
enum DispatchError {
    #[error("failed to mark message as processing: {0}")]
    MarkProcessing(OutboxStoreError),

    #[error("no handler registered for event type: {0}")]
    NoHandler(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("failed to mark message as completed: {0}")]
    MarkCompleted(OutboxStoreError),
}

impl OutboxDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        dead_letters: Arc<dyn DeadLetterStore>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            outbox,
            dead_letters,
            handlers: HashMap::new(),
            config,
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Registers the handler for an event type. Called at startup, before
    /// `start`; the registry is immutable afterwards.
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

        let dispatcher = Arc::clone(self);
        *worker = Some(tokio::spawn(async move { dispatcher.run_loop().await }));

        info!(
            polling_interval_ms = self.config.polling_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "outbox dispatcher started"
        );
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "outbox dispatcher worker ended abnormally");
            }
        }
    }

    /// Drains one batch immediately, outside the polling schedule.
    pub async fn run_once(&self) -> Result<(), OutboxStoreError> {
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

        info!("outbox dispatcher stopped");
    }

    /// One poll with a batch deadline equal to the polling interval; work
    /// that overruns observes the deadline through the child token.
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
            error!(error = %err, "failed to process outbox batch");
        }
    }

    async fn process_batch(&self, cancel: &CancellationToken) -> Result<(), OutboxStoreError> {
        let messages = self.outbox.get_pending(self.config.batch_size).await?;

        if messages.is_empty() {
            debug!("no pending outbox messages");
            return Ok(());
        }

        info!(count = messages.len(), "processing outbox batch");

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
                    "failed to process outbox message"
                );
            }
        }

        Ok(())
    }

    async fn process_message(
        &self,
        cancel: &CancellationToken,
        message: &OutboxMessage,
    ) -> Result<(), DispatchError> {
        self.outbox
            .mark_processing(message.id)
            .await
            .map_err(DispatchError::MarkProcessing)?;

        let Some(handler) = self.handlers.get(&message.event_type) else {
            let error_msg = format!(
                "no handler registered for event type: {}",
                message.event_type
            );
            error!(message_id = message.id, "{}", error_msg);

            if let Err(err) = self.outbox.mark_failed(message.id, &error_msg).await {
                error!(error = %err, message_id = message.id, "failed to mark message as failed");
            }
            if self.config.use_dead_letter_queue {
                self.send_to_dead_letters(message, &error_msg, REASON_NO_HANDLER)
                    .await;
            }

            return Err(DispatchError::NoHandler(message.event_type.clone()));
        };

        let policy = RetryPolicy::new(self.config.max_retries, Arc::clone(&self.config.backoff));
        let result = retry::run_with_discard(
            &policy,
            cancel,
            || handler.handle(cancel, message),
            |last| {
                let error_msg = format!(
                    "Failed after {} retries: {last}",
                    self.config.max_retries
                );
                async move {
                    if let Err(err) = self.outbox.mark_failed(message.id, &error_msg).await {
                        error!(
                            error = %err,
                            message_id = message.id,
                            "failed to mark message as failed"
                        );
                    }
                    if self.config.use_dead_letter_queue {
                        self.send_to_dead_letters(message, &error_msg, REASON_MAX_RETRIES)
                            .await;
                    }
                }
            },
        )
        .await;

        match result {
            Ok(()) => {
                self.outbox
                    .mark_completed(message.id)
                    .await
                    .map_err(DispatchError::MarkCompleted)?;

                info!(
                    message_id = message.id,
                    aggregate_id = %message.aggregate_id,
                    event_type = %message.event_type,
                    "successfully processed outbox message"
                );
                Ok(())
            }
            Err(err) => Err(DispatchError::Handler(err.to_string())),
        }
    }

    async fn send_to_dead_letters(&self, message: &OutboxMessage, error_msg: &str, reason: &str) {
        let dead_letter = DeadLetterMessage::from_outbox(message, error_msg, reason);

        match self.dead_letters.create(dead_letter).await {
            Ok(id) => info!(
                message_id = message.id,
                dead_letter_id = id,
                "message sent to dead letter queue"
            ),
            Err(err) => error!(
                error = %err,
                message_id = message.id,
                "failed to send message to dead letter queue"
            ),
        }
    }
}

#[cfg(test)]
mod dispatcher_tests {
    use super::*;
    use crate::shared::core::errors::AppError;
    use crate::shared::infrastructure::dead_letter::in_memory::InMemoryDeadLetterStore;
    use crate::shared::infrastructure::outbox::in_memory::InMemoryOutboxStore;
    use crate::shared::infrastructure::outbox::OutboxStatus;
    use crate::shared::infrastructure::retry::ConstantBackoff;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedHandler {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    impl ScriptedHandler {
        fn succeeding_after(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures_before_success: failures,
                calls: AtomicU32::new(0),
            })
        }

        fn always_failing() -> Arc<Self> {
            Self::succeeding_after(u32::MAX)
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessageHandler for ScriptedHandler {
        async fn handle(
            &self,
            _cancel: &CancellationToken,
            _message: &OutboxMessage,
        ) -> Result<(), AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(AppError::temporary("induced handler failure"))
            } else {
                Ok(())
            }
        }
    }

    fn quick_config() -> DispatcherConfig {
        DispatcherConfig {
            polling_interval: Duration::from_millis(10),
            batch_size: 10,
            max_retries: 3,
            backoff: Arc::new(ConstantBackoff {
                interval: Duration::from_millis(1),
            }),
            use_dead_letter_queue: true,
        }
    }

    struct Fixture {
        outbox: Arc<InMemoryOutboxStore>,
        dead_letters: Arc<InMemoryDeadLetterStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                outbox: Arc::new(InMemoryOutboxStore::new()),
                dead_letters: Arc::new(InMemoryDeadLetterStore::new()),
            }
        }

        fn dispatcher(&self, handlers: Vec<(&str, Arc<dyn MessageHandler>)>) -> OutboxDispatcher {
            let mut dispatcher = OutboxDispatcher::new(
                self.outbox.clone(),
                self.dead_letters.clone(),
                quick_config(),
            );
            for (event_type, handler) in handlers {
                dispatcher.register_handler(event_type, handler);
            }
            dispatcher
        }

        fn seed(&self, event_type: &str) -> i64 {
            self.outbox
                .insert(OutboxMessage::pending(
                    "order",
                    "ord-1",
                    event_type,
                    b"{}".to_vec(),
                ))
                .expect("seed failed")
        }
    }

    #[tokio::test]
    async fn a_flaky_handler_eventually_completes_the_row() {
        let fixture = Fixture::new();
        let handler = ScriptedHandler::succeeding_after(2);
        let dispatcher = fixture.dispatcher(vec![("order_created", handler.clone())]);
        let id = fixture.seed("order_created");

        dispatcher.run_once().await.unwrap();

        let row = fixture.outbox.message(id).unwrap();
        assert_eq!(row.status, OutboxStatus::Completed);
        assert!(row.processed_at.is_some());
        assert_eq!(handler.calls(), 3);
        assert!(fixture.dead_letters.all().is_empty());
    }

    #[tokio::test]
    async fn an_exhausted_handler_fails_the_row_and_dead_letters_it() {
        let fixture = Fixture::new();
        let handler = ScriptedHandler::always_failing();
        let dispatcher = fixture.dispatcher(vec![("order_created", handler.clone())]);
        let id = fixture.seed("order_created");

        dispatcher.run_once().await.unwrap();

        let row = fixture.outbox.message(id).unwrap();
        assert_eq!(row.status, OutboxStatus::Failed);
        assert!(row
            .last_error
            .as_deref()
            .unwrap()
            .starts_with("Failed after 3 retries"));
        assert_eq!(handler.calls(), 3);

        let dead = fixture.dead_letters.all();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].original_message_id, id);
        assert_eq!(dead[0].failure_reason, REASON_MAX_RETRIES);
    }

    #[tokio::test]
    async fn an_unknown_event_type_dead_letters_on_the_first_dispatch() {
        let fixture = Fixture::new();
        let dispatcher = fixture.dispatcher(vec![]);
        let id = fixture.seed("order_teleported");

        dispatcher.run_once().await.unwrap();

        let row = fixture.outbox.message(id).unwrap();
        assert_eq!(row.status, OutboxStatus::Failed);
        assert_eq!(row.processing_attempts, 1);

        let dead = fixture.dead_letters.all();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].failure_reason, REASON_NO_HANDLER);
    }

    #[tokio::test]
    async fn a_poison_message_does_not_abort_the_batch() {
        let fixture = Fixture::new();
        let poison = ScriptedHandler::always_failing();
        let healthy = ScriptedHandler::succeeding_after(0);
        let dispatcher = fixture.dispatcher(vec![
            ("order_created", poison),
            ("order_updated", healthy.clone()),
        ]);
        let poison_id = fixture.seed("order_created");
        let healthy_id = fixture.seed("order_updated");

        dispatcher.run_once().await.unwrap();

        assert_eq!(
            fixture.outbox.message(poison_id).unwrap().status,
            OutboxStatus::Failed
        );
        assert_eq!(
            fixture.outbox.message(healthy_id).unwrap().status,
            OutboxStatus::Completed
        );
        assert_eq!(healthy.calls(), 1);
    }

    #[tokio::test]
    async fn terminal_rows_are_never_picked_up_again() {
        let fixture = Fixture::new();
        let handler = ScriptedHandler::succeeding_after(0);
        let dispatcher = fixture.dispatcher(vec![("order_created", handler.clone())]);
        let id = fixture.seed("order_created");

        dispatcher.run_once().await.unwrap();
        dispatcher.run_once().await.unwrap();

        let row = fixture.outbox.message(id).unwrap();
        assert_eq!(row.status, OutboxStatus::Completed);
        assert_eq!(row.processing_attempts, 1);
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn the_polling_worker_drains_rows_and_stops_cleanly() {
        let fixture = Fixture::new();
        let handler = ScriptedHandler::succeeding_after(0);
        let dispatcher =
            Arc::new(fixture.dispatcher(vec![("order_created", handler.clone())]));
        let id = fixture.seed("order_created");

        dispatcher.start();
        dispatcher.start(); // idempotent

        tokio::time::sleep(Duration::from_millis(100)).await;

        dispatcher.stop().await;
        dispatcher.stop().await; // idempotent

        let row = fixture.outbox.message(id).unwrap();
        assert_eq!(row.status, OutboxStatus::Completed);
    }
}
