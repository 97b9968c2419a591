use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::modules::shipments::core::ports::{ShipmentStore, ShipmentStoreError};
use crate::modules::shipments::core::shipment::{Shipment, ShipmentStatus};

#[derive(Default)]
pub struct InMemoryShipmentStore {
    shipments: Mutex<HashMap<String, Shipment>>,
}

impl InMemoryShipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Shipment> {
        self.shipments
            .lock()
            .expect("lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ShipmentStore for InMemoryShipmentStore {
    async fn create(&self, shipment: &Shipment) -> Result<(), ShipmentStoreError> {
        self.shipments
            .lock()
            .expect("lock poisoned")
            .insert(shipment.id.clone(), shipment.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Shipment, ShipmentStoreError> {
        self.shipments
            .lock()
            .expect("lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| ShipmentStoreError::NotFound(id.to_string()))
    }

    async fn get_by_order(&self, order_id: &str) -> Result<Vec<Shipment>, ShipmentStoreError> {
        let mut shipments: Vec<Shipment> = self
            .shipments
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|shipment| shipment.order_id == order_id)
            .cloned()
            .collect();
        shipments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(shipments)
    }

    async fn update_status(
        &self,
        id: &str,
        status: ShipmentStatus,
    ) -> Result<(), ShipmentStoreError> {
        let mut shipments = self.shipments.lock().expect("lock poisoned");
        let shipment = shipments
            .get_mut(id)
            .ok_or_else(|| ShipmentStoreError::NotFound(id.to_string()))?;
        shipment.status = status;
        shipment.updated_at = Utc::now();
        Ok(())
    }
}
