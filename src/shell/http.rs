use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::modules::orders::use_cases::create_order::inbound::http as create_order_http;
use crate::modules::orders::use_cases::list_orders::inbound::http as list_orders_http;
use crate::modules::orders::use_cases::update_order::inbound::http as update_order_http;
use crate::modules::orders::use_cases::update_order_status::inbound::http as update_status_http;
use crate::modules::shipments::use_cases::request_shipment::inbound::http as shipments_http;
use crate::shell::admin;
use crate::shell::middleware::{degradation, endpoint_limit, rate_limit};
use crate::shell::state::AppState;

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Routes plus the admission stack. Layer order matters: requests pass the
/// trace layer, then global/IP admission, then the circuit breaker, then
/// the per-endpoint limiter, so the circuit decision sees post-rate-limit
/// traffic and the endpoint limiter runs last before the handler.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/orders",
            post(create_order_http::handle).get(list_orders_http::list),
        )
        .route(
            "/api/v1/orders/{id}",
            get(list_orders_http::get_by_id).put(update_order_http::handle),
        )
        .route(
            "/api/v1/orders/{id}/status",
            patch(update_status_http::handle),
        )
        .route(
            "/api/v1/orders/{id}/shipments",
            post(shipments_http::create).get(shipments_http::list_for_order),
        )
        .route("/api/v1/shipments/{id}/sync", post(shipments_http::sync))
        .route("/api/v1/admin/dead-letters", get(admin::dead_letters::list))
        .route(
            "/api/v1/admin/dead-letters/{id}/retry",
            post(admin::dead_letters::retry),
        )
        .route(
            "/api/v1/admin/dead-letters/{id}/discard",
            post(admin::dead_letters::discard),
        )
        .route("/api/v1/admin/rate-limits", get(admin::rate_limits::list))
        .route(
            "/api/v1/admin/rate-limits/endpoint",
            post(admin::rate_limits::set_endpoint_limit),
        )
        .route(
            "/api/v1/admin/circuit-breaker",
            get(admin::circuit_breaker::status),
        )
        .route(
            "/api/v1/admin/circuit-breaker/reset",
            post(admin::circuit_breaker::reset),
        )
        .layer(from_fn_with_state(
            state.clone(),
            endpoint_limit::endpoint_rate_limit,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            degradation::graceful_degradation,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            rate_limit::admission_rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database_up = state.health.ping().await;

    let body = json!({
        "status": if database_up { "ok" } else { "degraded" },
        "database": if database_up { "connected" } else { "disconnected" },
        "bus": if state.bus_configured { "configured" } else { "not_configured" },
        "timestamp": Utc::now(),
    });

    let status = if database_up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ApiResponse::ok(body)))
}

#[cfg(test)]
mod health_http_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::build_router;
    use crate::shell::state::test_support::make_test_state;

    #[tokio::test]
    async fn it_should_report_ok_when_the_database_answers() {
        let (state, _harness) = make_test_state();

        let response = build_router(state)
            .oneshot(
                Request::get("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["database"], "connected");
    }
}
