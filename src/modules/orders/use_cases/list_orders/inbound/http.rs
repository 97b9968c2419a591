use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::modules::orders::core::order::Order;
use crate::shared::core::errors::AppError;
use crate::shell::http::ApiResponse;
use crate::shell::state::AppState;

#[derive(Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub page_size: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64) {
        let page = self.page.filter(|page| *page >= 1).unwrap_or(1);
        let page_size = self
            .page_size
            .filter(|size| (1..=100).contains(size))
            .unwrap_or(10);
        (page, page_size)
    }
}

#[derive(Serialize)]
pub struct PaginatedOrders {
    pub items: Vec<Order>,
    pub total_count: i64,
    pub page: i64,
    pub page_size: i64,
}

pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> impl IntoResponse {
    let (page, page_size) = pagination.normalize();
    let offset = (page - 1) * page_size;

    let items = match state.orders.list(page_size, offset).await {
        Ok(items) => items,
        Err(err) => {
            error!(error = %err, "failed to list orders");
            return AppError::from(err).into_response();
        }
    };

    let total_count = match state.orders.count().await {
        Ok(count) => count,
        Err(err) => {
            error!(error = %err, "failed to count orders");
            items.len() as i64
        }
    };

    Json(ApiResponse::ok(PaginatedOrders {
        items,
        total_count,
        page,
        page_size,
    }))
    .into_response()
}

pub async fn get_by_id(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.orders.get(&id).await {
        Ok(order) => Json(ApiResponse::ok(order)).into_response(),
        Err(err) => AppError::from(err).into_response(),
    }
}
