// Create-order flow: validate, mint the order and its `order_created`
// event, and hand both to the store for the atomic co-write.

use std::sync::Arc;
use tracing::info;

use super::command::CreateOrder;
use crate::modules::orders::core::events;
use crate::modules::orders::core::order::Order;
use crate::modules::orders::core::ports::OrderStore;
use crate::shared::core::errors::AppError;

pub struct CreateOrderHandler {
    orders: Arc<dyn OrderStore>,
}

impl CreateOrderHandler {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    pub async fn handle(&self, command: CreateOrder) -> Result<Order, AppError> {
        if command.customer_id.trim().is_empty() {
            return Err(AppError::invalid_input("customer_id is required"));
        }
        if command.amount <= 0.0 {
            return Err(AppError::invalid_input("amount must be greater than zero"));
        }

        let order = Order::new(
            command.customer_id,
            command.amount,
            command.description,
        );
        let event = events::order_created(&order)
            .map_err(|err| AppError::internal(format!("failed to serialize event: {err}")))?;

        let event_id = self.orders.create_with_event(&order, event).await?;

        info!(
            order_id = %order.id,
            outbox_id = event_id,
            "order created with outbox message"
        );
        Ok(order)
    }
}
