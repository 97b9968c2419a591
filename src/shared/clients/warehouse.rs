// HTTP client for the upstream warehouse service. Responses are classified
// into the application error taxonomy so the retry engine can distinguish
// transient warehouse trouble from permanent rejections.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::shared::core::errors::AppError;
use crate::shared::infrastructure::retry::{self, ExponentialBackoff, RetryPolicy};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Warehouse operations the rest of the service codes against; implemented
/// by the HTTP client below and by scripted fakes in tests.
#[async_trait]
pub trait WarehouseApi: Send + Sync {
    async fn request_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentResponse, AppError>;

    async fn shipment_status(
        &self,
        warehouse_ref: &str,
    ) -> Result<ShipmentStatusResponse, AppError>;
}

pub struct WarehouseClient {
    base_url: String,
    client: Client,
    retry_policy: RetryPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShipmentRequest {
    pub order_id: String,
    pub customer_id: String,
    pub products: Vec<ProductLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductLine {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentResponse {
    #[serde(default)]
    pub shipment_id: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tracking_number: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentStatusResponse {
    #[serde(default)]
    pub shipment_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl WarehouseClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AppError::internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
            retry_policy: RetryPolicy::new(
                3,
                Arc::new(ExponentialBackoff {
                    initial_interval: Duration::from_millis(500),
                    max_interval: Duration::from_secs(5),
                    multiplier: 1.5,
                    jitter_factor: 0.2,
                }),
            ),
        })
    }

}

#[async_trait]
impl WarehouseApi for WarehouseClient {
    async fn request_shipment(
        &self,
        request: &ShipmentRequest,
    ) -> Result<ShipmentResponse, AppError> {
        let url = format!("{}/api/v1/shipments", self.base_url);
        let cancel = CancellationToken::new();

        let result = retry::run_classified(&self.retry_policy, &cancel, AppError::is_retryable, || {
            let client = self.client.clone();
            let url = url.clone();
            let request = request.clone();
            async move {
                let response = client
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(classify_transport)?;

                let body: ShipmentResponse = parse_response(response).await?;
                check_body_error(&body.error, &body.code)?;
                Ok(body)
            }
        })
        .await;

        result.map_err(|err| {
            let err = err
                .into_inner()
                .unwrap_or_else(|| AppError::timeout("shipment request cancelled"));
            error!(error = %err, order_id = %request.order_id, "failed to create shipment in warehouse");
            err
        })
    }

    async fn shipment_status(
        &self,
        warehouse_ref: &str,
    ) -> Result<ShipmentStatusResponse, AppError> {
        let url = format!("{}/api/v1/shipments/{}", self.base_url, warehouse_ref);
        let cancel = CancellationToken::new();

        let result = retry::run_classified(&self.retry_policy, &cancel, AppError::is_retryable, || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client.get(&url).send().await.map_err(classify_transport)?;

                let body: ShipmentStatusResponse = parse_response(response).await?;
                check_body_error(&body.error, &body.code)?;
                Ok(body)
            }
        })
        .await;

        result.map_err(|err| {
            let err = err
                .into_inner()
                .unwrap_or_else(|| AppError::timeout("shipment status request cancelled"));
            error!(error = %err, warehouse_ref, "failed to fetch shipment status from warehouse");
            err
        })
    }
}

fn classify_transport(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::timeout("warehouse request timed out")
    } else {
        AppError::temporary(format!("failed to reach warehouse: {err}"))
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, AppError> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|err| AppError::internal(format!("failed to parse warehouse response: {err}")));
    }

    Err(match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            AppError::timeout("warehouse request timed out")
        }
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::INTERNAL_SERVER_ERROR => {
            AppError::temporary(format!("warehouse service error: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited("warehouse rate limited".into()),
        StatusCode::NOT_FOUND => AppError::not_found("warehouse resource not found"),
        StatusCode::CONFLICT => AppError::Conflict("warehouse rejected the request".into()),
        other => AppError::invalid_input(format!("warehouse returned error: {other}")),
    })
}

fn check_body_error(error: &Option<String>, code: &Option<String>) -> Result<(), AppError> {
    if let Some(message) = error {
        if code.as_deref() == Some("TIMEOUT") {
            return Err(AppError::timeout(message.clone()));
        }
        return Err(AppError::temporary(message.clone()));
    }
    Ok(())
}
