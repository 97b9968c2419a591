use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;

use crate::modules::shipments::core::ports::{ShipmentStore, ShipmentStoreError};
use crate::modules::shipments::core::shipment::{Shipment, ShipmentStatus};

#[derive(Clone)]
pub struct PgShipmentStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct ShipmentRow {
    id: String,
    order_id: String,
    warehouse_ref: String,
    tracking_number: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShipmentRow> for Shipment {
    type Error = ShipmentStoreError;

    fn try_from(row: ShipmentRow) -> Result<Self, Self::Error> {
        let status = ShipmentStatus::from_str(&row.status).map_err(ShipmentStoreError::Backend)?;
        Ok(Shipment {
            id: row.id,
            order_id: row.order_id,
            warehouse_ref: row.warehouse_ref,
            tracking_number: row.tracking_number,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn backend(err: sqlx::Error) -> ShipmentStoreError {
    ShipmentStoreError::Backend(err.to_string())
}

impl PgShipmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShipmentStore for PgShipmentStore {
    async fn create(&self, shipment: &Shipment) -> Result<(), ShipmentStoreError> {
        sqlx::query(
            r#"
            INSERT INTO shipments (id, order_id, warehouse_ref, tracking_number, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&shipment.id)
        .bind(&shipment.order_id)
        .bind(&shipment.warehouse_ref)
        .bind(&shipment.tracking_number)
        .bind(shipment.status.as_str())
        .bind(shipment.created_at)
        .bind(shipment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Shipment, ShipmentStoreError> {
        let row = sqlx::query_as::<_, ShipmentRow>(
            r#"
            SELECT id, order_id, warehouse_ref, tracking_number, status, created_at, updated_at
            FROM shipments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or_else(|| ShipmentStoreError::NotFound(id.to_string()))?;

        row.try_into()
    }

    async fn get_by_order(&self, order_id: &str) -> Result<Vec<Shipment>, ShipmentStoreError> {
        let rows = sqlx::query_as::<_, ShipmentRow>(
            r#"
            SELECT id, order_id, warehouse_ref, tracking_number, status, created_at, updated_at
            FROM shipments
            WHERE order_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(Shipment::try_from).collect()
    }

    async fn update_status(
        &self,
        id: &str,
        status: ShipmentStatus,
    ) -> Result<(), ShipmentStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE shipments
            SET status = $1, updated_at = $2
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(ShipmentStoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
