use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::modules::orders::core::order::generate_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentStatus {
    Pending,
    Shipped,
    Delivered,
    Failed,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    /// Maps the warehouse's upper-case status vocabulary onto ours; anything
    /// unrecognized stays pending until the next sync.
    pub fn from_warehouse(raw: &str) -> Self {
        match raw {
            "SHIPPED" => Self::Shipped,
            "DELIVERED" => Self::Delivered,
            "FAILED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

impl FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pending" => Ok(Self::Pending),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown shipment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Shipment {
    pub id: String,
    pub order_id: String,
    /// Identifier the warehouse knows the shipment by.
    pub warehouse_ref: String,
    pub tracking_number: String,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn new(
        order_id: impl Into<String>,
        warehouse_ref: impl Into<String>,
        tracking_number: impl Into<String>,
        status: ShipmentStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id("shp"),
            order_id: order_id.into(),
            warehouse_ref: warehouse_ref.into(),
            tracking_number: tracking_number.into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod shipment_tests {
    use super::*;

    #[test]
    fn warehouse_statuses_map_onto_ours() {
        assert_eq!(
            ShipmentStatus::from_warehouse("SHIPPED"),
            ShipmentStatus::Shipped
        );
        assert_eq!(
            ShipmentStatus::from_warehouse("DELIVERED"),
            ShipmentStatus::Delivered
        );
        assert_eq!(
            ShipmentStatus::from_warehouse("SOMETHING_NEW"),
            ShipmentStatus::Pending
        );
    }

    #[test]
    fn new_shipments_get_a_prefixed_id() {
        let shipment = Shipment::new("ord-1", "wh-9", "TRACK123", ShipmentStatus::Pending);
        assert!(shipment.id.starts_with("shp-"));
        assert_eq!(shipment.order_id, "ord-1");
    }
}
