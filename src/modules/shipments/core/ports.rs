use async_trait::async_trait;
use thiserror::Error;

use super::shipment::{Shipment, ShipmentStatus};
use crate::shared::core::errors::AppError;

#[derive(Debug, Error)]
pub enum ShipmentStoreError {
    #[error("shipment {0} not found")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<ShipmentStoreError> for AppError {
    fn from(err: ShipmentStoreError) -> Self {
        match err {
            ShipmentStoreError::NotFound(id) => {
                AppError::not_found(format!("shipment {id} not found"))
            }
            other => AppError::internal(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn create(&self, shipment: &Shipment) -> Result<(), ShipmentStoreError>;

    async fn get(&self, id: &str) -> Result<Shipment, ShipmentStoreError>;

    async fn get_by_order(&self, order_id: &str) -> Result<Vec<Shipment>, ShipmentStoreError>;

    async fn update_status(
        &self,
        id: &str,
        status: ShipmentStatus,
    ) -> Result<(), ShipmentStoreError>;
}
