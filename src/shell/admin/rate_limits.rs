use axum::{
    extract::rejection::JsonRejection, extract::State, response::IntoResponse, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::shared::core::errors::AppError;
use crate::shell::http::ApiResponse;
use crate::shell::state::AppState;

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(json!({
        "global_metrics": state.admission.global.metrics(),
        "endpoint_limits": state.admission.per_endpoint.limits(),
    })))
}

#[derive(Deserialize)]
pub struct EndpointLimitBody {
    pub endpoint: String,
    pub max_tokens: f64,
    pub refill_rate: f64,
}

pub async fn set_endpoint_limit(
    State(state): State<AppState>,
    body: Result<Json<EndpointLimitBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(_) => return AppError::invalid_input("invalid request payload").into_response(),
    };

    if body.endpoint.is_empty() {
        return AppError::invalid_input("endpoint is required").into_response();
    }
    if body.max_tokens <= 0.0 || body.refill_rate <= 0.0 {
        return AppError::invalid_input("max_tokens and refill_rate must be greater than zero")
            .into_response();
    }

    state
        .admission
        .per_endpoint
        .set_limit(&body.endpoint, body.max_tokens, body.refill_rate);

    info!(
        endpoint = %body.endpoint,
        max_tokens = body.max_tokens,
        refill_rate = body.refill_rate,
        "endpoint rate limit updated"
    );

    Json(ApiResponse::ok(json!({
        "message": "rate limit updated successfully",
        "endpoint": body.endpoint,
        "max_tokens": body.max_tokens,
        "refill_rate": body.refill_rate,
    })))
    .into_response()
}
