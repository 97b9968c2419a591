// Status-change flow: load, short-circuit no-ops, then co-write the updated
// row with its `order_status_changed` event.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::command::UpdateOrderStatus;
use crate::modules::orders::core::events;
use crate::modules::orders::core::order::Order;
use crate::modules::orders::core::ports::OrderStore;
use crate::shared::core::errors::AppError;

pub struct UpdateOrderStatusHandler {
    orders: Arc<dyn OrderStore>,
}

impl UpdateOrderStatusHandler {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }

    pub async fn handle(&self, command: UpdateOrderStatus) -> Result<Order, AppError> {
        let mut order = self.orders.get(&command.order_id).await?;

        if order.status == command.new_status {
            return Ok(order);
        }

        let old_status = order.status;
        order.status = command.new_status;
        order.updated_at = Utc::now();

        let event = events::order_status_changed(&order, old_status)
            .map_err(|err| AppError::internal(format!("failed to serialize event: {err}")))?;

        let event_id = self.orders.update_with_event(&order, event).await?;

        info!(
            order_id = %order.id,
            old_status = old_status.as_str(),
            new_status = order.status.as_str(),
            outbox_id = event_id,
            "order status updated with outbox message"
        );
        Ok(order)
    }
}
