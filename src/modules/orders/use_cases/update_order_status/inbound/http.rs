use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::str::FromStr;

use crate::modules::orders::core::order::OrderStatus;
use crate::modules::orders::use_cases::update_order_status::command::UpdateOrderStatus;
use crate::shared::core::errors::AppError;
use crate::shell::http::ApiResponse;
use crate::shell::state::AppState;

#[derive(Deserialize)]
pub struct UpdateStatusBody {
    pub status: String,
}

pub async fn handle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(_) => return AppError::invalid_input("invalid request payload").into_response(),
    };

    let new_status = match OrderStatus::from_str(&body.status) {
        Ok(status) => status,
        Err(_) => return AppError::invalid_input("invalid status value").into_response(),
    };

    let command = UpdateOrderStatus {
        order_id: id,
        new_status,
    };

    match state.update_order_status.handle(command).await {
        Ok(order) => Json(ApiResponse::ok(order)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod update_order_status_http_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::shell::http::build_router;
    use crate::shell::state::test_support::{make_test_state, seed_order_via_router};

    #[tokio::test]
    async fn it_should_patch_the_status_and_record_the_event() {
        let (state, harness) = make_test_state();
        let router = build_router(state);
        let order_id = seed_order_via_router(&router).await;

        let response = router
            .clone()
            .oneshot(
                Request::patch(format!("/api/v1/orders/{order_id}/status"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"status":"approved"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["status"], "approved");

        let rows = harness.outbox.all();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].event_type, "order_status_changed");
    }

    #[tokio::test]
    async fn it_should_reject_an_unknown_status_value() {
        let (state, _harness) = make_test_state();
        let router = build_router(state);
        let order_id = seed_order_via_router(&router).await;

        let response = router
            .oneshot(
                Request::patch(format!("/api/v1/orders/{order_id}/status"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"status":"teleported"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn it_should_return_404_for_an_unknown_order() {
        let (state, _harness) = make_test_state();

        let response = build_router(state)
            .oneshot(
                Request::patch("/api/v1/orders/ord-missing/status")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"status":"approved"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
