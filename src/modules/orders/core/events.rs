// Event construction for the order aggregate. Every constructor returns a
// pending outbox row whose payload is the serialized envelope the bus
// contract expects.

use chrono::Utc;
use serde_json::json;

use super::order::{generate_id, Order, OrderStatus};
use crate::shared::infrastructure::event_bus::EventEnvelope;
use crate::shared::infrastructure::outbox::OutboxMessage;

pub const AGGREGATE_TYPE: &str = "order";

pub const EVENT_ORDER_CREATED: &str = "order_created";
pub const EVENT_ORDER_UPDATED: &str = "order_updated";
pub const EVENT_ORDER_STATUS_CHANGED: &str = "order_status_changed";

fn envelope(event_type: &str, order_id: &str, data: serde_json::Value) -> EventEnvelope {
    EventEnvelope {
        event_type: event_type.to_string(),
        event_id: generate_id("evt"),
        aggregate_id: order_id.to_string(),
        occurred_at: Utc::now(),
        data,
    }
}

fn outbox_message(
    event_type: &str,
    order_id: &str,
    data: serde_json::Value,
) -> Result<OutboxMessage, serde_json::Error> {
    let payload = serde_json::to_vec(&envelope(event_type, order_id, data))?;
    Ok(OutboxMessage::pending(
        AGGREGATE_TYPE,
        order_id,
        event_type,
        payload,
    ))
}

pub fn order_created(order: &Order) -> Result<OutboxMessage, serde_json::Error> {
    outbox_message(
        EVENT_ORDER_CREATED,
        &order.id,
        serde_json::to_value(order)?,
    )
}

pub fn order_updated(order: &Order) -> Result<OutboxMessage, serde_json::Error> {
    outbox_message(
        EVENT_ORDER_UPDATED,
        &order.id,
        serde_json::to_value(order)?,
    )
}

pub fn order_status_changed(
    order: &Order,
    old_status: OrderStatus,
) -> Result<OutboxMessage, serde_json::Error> {
    outbox_message(
        EVENT_ORDER_STATUS_CHANGED,
        &order.id,
        json!({
            "order_id": order.id,
            "customer_id": order.customer_id,
            "old_status": old_status,
            "new_status": order.status,
        }),
    )
}
