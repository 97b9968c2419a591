// End-to-end relay journey over the in-memory adapters: ingress co-write,
// dispatch under induced failures, dead-letter hand-off, and eventual
// re-drive once the handler heals.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use order_relay::modules::orders::adapters::outbound::in_memory::InMemoryOrderStore;
use order_relay::modules::orders::use_cases::create_order::command::CreateOrder;
use order_relay::modules::orders::use_cases::create_order::handler::CreateOrderHandler;
use order_relay::relay::{
    DeadLetterRedriver, DispatcherConfig, MessageHandler, OutboxDispatcher, RedriverConfig,
};
use order_relay::shared::core::errors::AppError;
use order_relay::shared::infrastructure::dead_letter::in_memory::InMemoryDeadLetterStore;
use order_relay::shared::infrastructure::dead_letter::{DeadLetterStatus, REASON_MAX_RETRIES};
use order_relay::shared::infrastructure::outbox::in_memory::InMemoryOutboxStore;
use order_relay::shared::infrastructure::outbox::{OutboxMessage, OutboxStatus};
use order_relay::shared::infrastructure::retry::ConstantBackoff;

/// Fails a scripted number of times, then succeeds forever; every
/// successful call counts as one delivery to the downstream bus.
struct ScriptedHandler {
    failures_before_success: u32,
    calls: AtomicU32,
    delivered: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    fn succeeding_after(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures_before_success: failures,
            calls: AtomicU32::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(
        &self,
        _cancel: &CancellationToken,
        message: &OutboxMessage,
    ) -> Result<(), AppError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures_before_success {
            return Err(AppError::temporary("induced delivery failure"));
        }
        self.delivered
            .lock()
            .unwrap()
            .push(message.aggregate_id.clone());
        Ok(())
    }
}

struct Pipeline {
    outbox: Arc<InMemoryOutboxStore>,
    orders: Arc<InMemoryOrderStore>,
    dead_letters: Arc<InMemoryDeadLetterStore>,
}

impl Pipeline {
    fn new() -> Self {
        let outbox = Arc::new(InMemoryOutboxStore::new());
        let orders = Arc::new(InMemoryOrderStore::new(Arc::clone(&outbox)));
        Self {
            outbox,
            orders,
            dead_letters: Arc::new(InMemoryDeadLetterStore::new()),
        }
    }

    async fn create_order(&self) -> String {
        CreateOrderHandler::new(self.orders.clone())
            .handle(CreateOrder {
                customer_id: "c1".into(),
                amount: 10.0,
                description: "x".into(),
            })
            .await
            .expect("order creation failed")
            .id
    }

    fn dispatcher(&self, handler: Arc<ScriptedHandler>) -> OutboxDispatcher {
        let mut dispatcher = OutboxDispatcher::new(
            self.outbox.clone(),
            self.dead_letters.clone(),
            DispatcherConfig {
                polling_interval: Duration::from_millis(10),
                batch_size: 10,
                max_retries: 3,
                backoff: Arc::new(ConstantBackoff {
                    interval: Duration::from_millis(1),
                }),
                use_dead_letter_queue: true,
            },
        );
        dispatcher.register_handler("order_created", handler);
        dispatcher
    }

    fn redriver(&self, handler: Arc<ScriptedHandler>) -> DeadLetterRedriver {
        let mut redriver = DeadLetterRedriver::new(
            self.dead_letters.clone(),
            RedriverConfig {
                polling_interval: Duration::from_millis(10),
                batch_size: 5,
                max_retries: 5,
                backoff: Arc::new(ConstantBackoff {
                    interval: Duration::from_millis(1),
                }),
            },
        );
        redriver.register_handler("order_created", handler);
        redriver
    }
}

#[tokio::test]
async fn a_created_order_is_delivered_at_least_once_despite_failures() {
    let pipeline = Pipeline::new();
    let order_id = pipeline.create_order().await;

    // Two induced failures, then success: the row must complete within the
    // three configured attempts and reach the bus exactly once.
    let handler = ScriptedHandler::succeeding_after(2);
    pipeline.dispatcher(handler.clone()).run_once().await.unwrap();

    let rows = pipeline.outbox.all();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, OutboxStatus::Completed);
    assert_eq!(rows[0].processing_attempts, 1);
    assert_eq!(handler.calls(), 3);
    assert_eq!(handler.delivered(), vec![order_id]);
    assert!(pipeline.dead_letters.all().is_empty());
}

#[tokio::test]
async fn dispatch_is_fifo_within_a_batch() {
    let pipeline = Pipeline::new();
    let first = pipeline.create_order().await;
    let second = pipeline.create_order().await;
    let third = pipeline.create_order().await;

    let handler = ScriptedHandler::succeeding_after(0);
    pipeline.dispatcher(handler.clone()).run_once().await.unwrap();

    assert_eq!(handler.delivered(), vec![first, second, third]);
}

#[tokio::test]
async fn an_exhausted_message_travels_to_the_dlq_and_back() {
    let pipeline = Pipeline::new();
    let order_id = pipeline.create_order().await;

    // The handler fails the dispatcher's entire retry budget, then heals:
    // the first re-drive attempt succeeds.
    let handler = ScriptedHandler::succeeding_after(3);

    pipeline.dispatcher(handler.clone()).run_once().await.unwrap();

    let rows = pipeline.outbox.all();
    let row = &rows[0];
    assert_eq!(row.status, OutboxStatus::Failed);
    assert!(row
        .last_error
        .as_deref()
        .unwrap()
        .starts_with("Failed after 3 retries"));

    let dead = pipeline.dead_letters.all();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].failure_reason, REASON_MAX_RETRIES);
    assert_eq!(dead[0].original_message_id, row.id);
    assert_eq!(dead[0].aggregate_id, order_id);

    pipeline.redriver(handler.clone()).run_once().await.unwrap();

    let dead = pipeline.dead_letters.all();
    assert_eq!(dead[0].status, DeadLetterStatus::Resolved);
    assert_eq!(dead[0].retry_count, 1);
    assert_eq!(handler.delivered(), vec![order_id]);

    // The original outbox row stays in its terminal state.
    assert_eq!(pipeline.outbox.all()[0].status, OutboxStatus::Failed);
}

#[tokio::test]
async fn attempts_only_ever_increase() {
    let pipeline = Pipeline::new();
    pipeline.create_order().await;

    let handler = ScriptedHandler::succeeding_after(u32::MAX);
    let dispatcher = pipeline.dispatcher(handler);

    let mut last_attempts = 0;
    for _ in 0..3 {
        dispatcher.run_once().await.unwrap();
        let attempts = pipeline.outbox.all()[0].processing_attempts;
        assert!(attempts >= last_attempts);
        last_attempts = attempts;
    }
}
