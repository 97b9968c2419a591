// Order update flow: apply the provided fields, then co-write the updated
// row with its `order_updated` event.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::command::UpdateOrder;
use crate::modules::orders::core::events;
use crate::modules::orders::core::order::Order;
use crate::modules::orders::core::ports::OrderStore;
use crate::shared::core::errors::AppError;

pub struct UpdateOrderHandler {
    orders: Arc<dyn OrderStore>,
}

impl UpdateOrderHandler {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    pub async fn handle(&self, command: UpdateOrder) -> Result<Order, AppError> {
        let mut order = self.orders.get(&command.order_id).await?;

        if let Some(customer_id) = command.customer_id {
            if customer_id.trim().is_empty() {
                return Err(AppError::invalid_input("customer_id must not be empty"));
            }
            order.customer_id = customer_id;
        }
        if let Some(amount) = command.amount {
            if amount <= 0.0 {
                return Err(AppError::invalid_input("amount must be greater than zero"));
            }
            order.amount = amount;
        }
        if let Some(description) = command.description {
            order.description = description;
        }
        order.updated_at = Utc::now();

        let event = events::order_updated(&order)
            .map_err(|err| AppError::internal(format!("failed to serialize event: {err}")))?;

        let event_id = self.orders.update_with_event(&order, event).await?;

        info!(
            order_id = %order.id,
            outbox_id = event_id,
            "order updated with outbox message"
        );
        Ok(order)
    }
}
