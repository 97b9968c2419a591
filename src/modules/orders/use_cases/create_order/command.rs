#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub customer_id: String,
    pub amount: f64,
    pub description: String,
}
