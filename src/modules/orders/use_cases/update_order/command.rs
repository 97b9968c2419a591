/// Partial update: absent fields keep their current value.
#[derive(Debug, Clone)]
pub struct UpdateOrder {
    pub order_id: String,
    pub customer_id: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
}
