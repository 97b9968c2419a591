use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::modules::orders::use_cases::update_order::command::UpdateOrder;
use crate::shared::core::errors::AppError;
use crate::shell::http::ApiResponse;
use crate::shell::state::AppState;

#[derive(Deserialize)]
pub struct UpdateOrderBody {
    pub customer_id: Option<String>,
    pub amount: Option<f64>,
    pub description: Option<String>,
}

pub async fn handle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UpdateOrderBody>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(_) => return AppError::invalid_input("invalid request payload").into_response(),
    };

    let command = UpdateOrder {
        order_id: id,
        customer_id: body.customer_id,
        amount: body.amount,
        description: body.description,
    };

    match state.update_order.handle(command).await {
        Ok(order) => Json(ApiResponse::ok(order)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod update_order_http_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::shell::http::build_router;
    use crate::shell::state::test_support::{make_test_state, seed_order_via_router};

    #[tokio::test]
    async fn it_should_update_the_order_and_record_the_event() {
        let (state, harness) = make_test_state();
        let router = build_router(state);
        let order_id = seed_order_via_router(&router).await;

        let response = router
            .oneshot(
                Request::put(format!("/api/v1/orders/{order_id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"amount":42.0,"description":"resized"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["amount"], 42.0);
        assert_eq!(json["data"]["description"], "resized");

        let rows = harness.outbox.all();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].event_type, "order_updated");
    }

    #[tokio::test]
    async fn it_should_reject_a_non_positive_amount() {
        let (state, _harness) = make_test_state();
        let router = build_router(state);
        let order_id = seed_order_via_router(&router).await;

        let response = router
            .oneshot(
                Request::put(format!("/api/v1/orders/{order_id}"))
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"amount":-1.0}"#))
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
                Request::put("/api/v1/orders/ord-missing")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"amount":5.0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
