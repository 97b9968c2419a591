// Operator surface over the dead-letter queue: inspect pending rows,
// re-enqueue one for the re-driver, or discard it for good.

use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::modules::orders::use_cases::list_orders::inbound::http::Pagination;
use crate::shared::core::errors::AppError;
use crate::shared::infrastructure::dead_letter::{
    DeadLetterMessage, DeadLetterStatus, DeadLetterStoreError,
};
use crate::shell::http::ApiResponse;
use crate::shell::state::AppState;

#[derive(Serialize)]
pub struct DeadLetterView {
    pub id: i64,
    pub original_message_id: i64,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub error_message: String,
    pub failure_reason: String,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub status: &'static str,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<DeadLetterMessage> for DeadLetterView {
    fn from(message: DeadLetterMessage) -> Self {
        Self {
            id: message.id,
            original_message_id: message.original_message_id,
            aggregate_type: message.aggregate_type,
            aggregate_id: message.aggregate_id,
            event_type: message.event_type,
            error_message: message.error_message,
            failure_reason: message.failure_reason,
            retry_count: message.retry_count,
            last_retry_at: message.last_retry_at,
            status: message.status.as_str(),
            created_at: message.created_at,
            resolved_at: message.resolved_at,
        }
    }
}

fn store_error(err: DeadLetterStoreError) -> AppError {
    match err {
        DeadLetterStoreError::NotFound(id) => {
            AppError::not_found(format!("dead letter message {id} not found"))
        }
        other => AppError::internal(other.to_string()),
    }
}

pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> impl IntoResponse {
    let (page, page_size) = pagination.normalize();

    let messages = match state.dead_letters.get_pending(page_size).await {
        Ok(messages) => messages,
        Err(err) => return store_error(err).into_response(),
    };

    let items: Vec<DeadLetterView> = messages.into_iter().map(DeadLetterView::from).collect();
    let total_count = items.len();

    Json(ApiResponse::ok(json!({
        "items": items,
        "total_count": total_count,
        "page": page,
        "page_size": page_size,
    })))
    .into_response()
}

pub async fn retry(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    let message = match state.dead_letters.get(id).await {
        Ok(message) => message,
        Err(err) => return store_error(err).into_response(),
    };

    let result = match message.status {
        DeadLetterStatus::Pending => state.dead_letters.mark_retrying(id).await,
        // A row stuck in retrying goes back to pending so the re-driver
        // picks it up on its next poll.
        DeadLetterStatus::Retrying => state.dead_letters.reset_to_retry(id).await,
        DeadLetterStatus::Resolved | DeadLetterStatus::Discarded => {
            return AppError::invalid_input("only pending or retrying messages can be retried")
                .into_response()
        }
    };

    if let Err(err) = result {
        return store_error(err).into_response();
    }

    Json(ApiResponse::ok(json!({
        "message": "dead letter message marked for retry",
        "id": id,
    })))
    .into_response()
}

#[derive(Deserialize)]
pub struct DiscardBody {
    #[serde(default)]
    pub reason: String,
}

pub async fn discard(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<DiscardBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(_) => return AppError::invalid_input("invalid request payload").into_response(),
    };

    let reason = if body.reason.is_empty() {
        "No reason provided".to_string()
    } else {
        body.reason
    };

    if let Err(err) = state.dead_letters.get(id).await {
        return store_error(err).into_response();
    }

    if let Err(err) = state.dead_letters.mark_discarded(id, &reason).await {
        return store_error(err).into_response();
    }

    Json(ApiResponse::ok(json!({
        "message": "dead letter message discarded",
        "id": id,
    })))
    .into_response()
}
