// Order persistence port. The co-write operations are the load-bearing part
// of the contract: the order row and its outbox row commit or roll back
// together, which is what makes the outbox pattern hold.

use async_trait::async_trait;
use thiserror::Error;

use super::order::Order;
use crate::shared::core::errors::AppError;
use crate::shared::infrastructure::outbox::{OutboxMessage, OutboxStoreError};

#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("order {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Outbox(#[from] OutboxStoreError),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<OrderStoreError> for AppError {
    fn from(err: OrderStoreError) -> Self {
        match err {
            OrderStoreError::NotFound(id) => AppError::not_found(format!("order {id} not found")),
            other => AppError::internal(other.to_string()),
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Order, OrderStoreError>;

    /// Newest orders first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Order>, OrderStoreError>;

    async fn count(&self) -> Result<i64, OrderStoreError>;

    /// Atomically persists a new order together with its outbox event.
    /// Returns the outbox row id.
    async fn create_with_event(
        &self,
        order: &Order,
        event: OutboxMessage,
    ) -> Result<i64, OrderStoreError>;

    /// Atomically updates an existing order together with an outbox event.
    /// Returns the outbox row id.
    async fn update_with_event(
        &self,
        order: &Order,
        event: OutboxMessage,
    ) -> Result<i64, OrderStoreError>;
}
