use crate::modules::orders::core::order::OrderStatus;

#[derive(Debug, Clone)]
pub struct UpdateOrderStatus {
    pub order_id: String,
    pub new_status: OrderStatus,
}
