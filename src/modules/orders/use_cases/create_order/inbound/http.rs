use axum::{
    extract::rejection::JsonRejection, extract::State, http::StatusCode, response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::modules::orders::use_cases::create_order::command::CreateOrder;
use crate::shared::core::errors::AppError;
use crate::shell::http::ApiResponse;
use crate::shell::state::AppState;

#[derive(Deserialize)]
pub struct CreateOrderBody {
    pub customer_id: String,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
}

pub async fn handle(
    State(state): State<AppState>,
    body: Result<Json<CreateOrderBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(_) => return AppError::invalid_input("invalid request payload").into_response(),
    };

    let command = CreateOrder {
        customer_id: body.customer_id,
        amount: body.amount,
        description: body.description,
    };

    match state.create_order.handle(command).await {
        Ok(order) => (StatusCode::CREATED, Json(ApiResponse::ok(order))).into_response(),
        Err(err) => err.into_response(),
    }
}
