// Outbox relay: the polling dispatcher that drains pending outbox rows
// through registered handlers, and the dead-letter re-driver that gives
// failed messages a second life under a stronger backoff policy.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::shared::core::errors::AppError;
use crate::shared::infrastructure::outbox::OutboxMessage;

pub mod dead_letter;
pub mod dispatcher;
pub mod handlers;

pub use dead_letter::{DeadLetterRedriver, RedriverConfig};
pub use dispatcher::{DispatcherConfig, OutboxDispatcher};

/// A message handler owns the delivery of one event type. Handlers observe
/// the batch deadline through the cancellation token and classify failures
/// through the application error taxonomy, which drives the retry engine.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        cancel: &CancellationToken,
        message: &OutboxMessage,
    ) -> Result<(), AppError>;
}
