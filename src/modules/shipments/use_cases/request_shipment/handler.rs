// Shipment flow against the upstream warehouse. Requesting a shipment for
// an approved order also moves the order to shipped, co-writing the status
// event; syncing a delivered shipment does the same for the delivered
// transition.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::modules::orders::core::events;
use crate::modules::orders::core::order::OrderStatus;
use crate::modules::orders::core::ports::OrderStore;
use crate::modules::shipments::core::ports::ShipmentStore;
use crate::modules::shipments::core::shipment::{Shipment, ShipmentStatus};
use crate::shared::clients::warehouse::{ProductLine, ShipmentRequest, WarehouseApi};
use crate::shared::core::errors::AppError;

pub struct RequestShipmentHandler {
    orders: Arc<dyn OrderStore>,
    shipments: Arc<dyn ShipmentStore>,
    warehouse: Arc<dyn WarehouseApi>,
}

impl RequestShipmentHandler {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        shipments: Arc<dyn ShipmentStore>,
        warehouse: Arc<dyn WarehouseApi>,
    ) -> Self {
        Self {
            orders,
            shipments,
            warehouse,
        }
    }

    pub async fn handle(&self, order_id: &str) -> Result<Shipment, AppError> {
        let order = self.orders.get(order_id).await?;

        let request = ShipmentRequest {
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            products: vec![ProductLine {
                product_id: "prod-sample".into(),
                quantity: 1,
            }],
            shipping_address: None,
        };

        let response = self.warehouse.request_shipment(&request).await?;

        let shipment = Shipment::new(
            &order.id,
            response.shipment_id,
            response.tracking_number,
            ShipmentStatus::Pending,
        );
        self.shipments
            .create(&shipment)
            .await
            .map_err(AppError::from)?;

        if order.status == OrderStatus::Approved {
            let mut updated = order;
            updated.status = OrderStatus::Shipped;
            updated.updated_at = Utc::now();

            let event = events::order_status_changed(&updated, OrderStatus::Approved)
                .map_err(|err| AppError::internal(format!("failed to serialize event: {err}")))?;
            self.orders.update_with_event(&updated, event).await?;
        }

        info!(
            order_id,
            shipment_id = %shipment.id,
            warehouse_ref = %shipment.warehouse_ref,
            "shipment requested from warehouse"
        );
        Ok(shipment)
    }

    pub async fn list_for_order(&self, order_id: &str) -> Result<Vec<Shipment>, AppError> {
        // Surface a 404 for unknown orders instead of an empty list.
        self.orders.get(order_id).await?;
        self.shipments
            .get_by_order(order_id)
            .await
            .map_err(AppError::from)
    }

    /// Pulls the warehouse's view of the shipment and reconciles our row,
    /// cascading a delivered shipment into the order's delivered status.
    pub async fn sync(&self, shipment_id: &str) -> Result<Shipment, AppError> {
        let mut shipment = self.shipments.get(shipment_id).await?;

        let status = self.warehouse.shipment_status(&shipment.warehouse_ref).await?;
        let new_status = ShipmentStatus::from_warehouse(&status.status);

        if new_status != shipment.status {
            self.shipments
                .update_status(&shipment.id, new_status)
                .await
                .map_err(AppError::from)?;
            shipment.status = new_status;
            shipment.updated_at = Utc::now();

            if new_status == ShipmentStatus::Delivered {
                self.mark_order_delivered(&shipment.order_id).await?;
            }
        }

        Ok(shipment)
    }

    async fn mark_order_delivered(&self, order_id: &str) -> Result<(), AppError> {
        let order = match self.orders.get(order_id).await {
            Ok(order) => order,
            Err(err) => {
                warn!(order_id, error = %err, "delivered shipment references an unknown order");
                return Ok(());
            }
        };

        if order.status == OrderStatus::Delivered {
            return Ok(());
        }

        let old_status = order.status;
        let mut updated = order;
        updated.status = OrderStatus::Delivered;
        updated.updated_at = Utc::now();

        let event = events::order_status_changed(&updated, old_status)
            .map_err(|err| AppError::internal(format!("failed to serialize event: {err}")))?;
        self.orders.update_with_event(&updated, event).await?;
        Ok(())
    }
}
