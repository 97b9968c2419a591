use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::shell::http::ApiResponse;
use crate::shell::state::AppState;

pub async fn create(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.request_shipment.handle(&id).await {
        Ok(shipment) => (StatusCode::CREATED, Json(ApiResponse::ok(shipment))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn list_for_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.request_shipment.list_for_order(&id).await {
        Ok(shipments) => Json(ApiResponse::ok(shipments)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn sync(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.request_shipment.sync(&id).await {
        Ok(shipment) => Json(ApiResponse::ok(shipment)).into_response(),
        Err(err) => err.into_response(),
    }
}
