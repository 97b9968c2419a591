use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use tracing::info;

use crate::shell::http::ApiResponse;
use crate::shell::state::AppState;

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.admission.breaker.metrics()))
}

pub async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    state.admission.breaker.reset();
    info!("circuit breaker reset by operator");

    Json(ApiResponse::ok(json!({
        "message": "circuit breaker reset successfully",
    })))
}

#[cfg(test)]
mod circuit_breaker_admin_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::shared::infrastructure::circuit_breaker::{
        CircuitBreaker, CircuitBreakerConfig, CircuitState,
    };
    use crate::shell::http::build_router;
    use crate::shell::state::test_support::{make_test_state_with_admission, permissive_admission};

    #[tokio::test]
    async fn status_reports_the_breaker_state_and_counters() {
        let (state, _harness) = make_test_state_with_admission(permissive_admission());

        let response = build_router(state)
            .oneshot(
                Request::get("/api/v1/admin/circuit-breaker")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["data"]["state"], "closed");
        assert_eq!(json["data"]["failure_count"], 0);
    }

    #[tokio::test]
    async fn reset_forces_an_open_breaker_closed_and_restores_traffic() {
        let mut admission = permissive_admission();
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(300),
            half_open_max_calls: 1,
        }));
        admission.breaker = breaker.clone();
        let (state, _harness) = make_test_state_with_admission(admission);
        let router = build_router(state);

        breaker.failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        let response = router
            .clone()
            .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        // The admin surface stays reachable while the circuit is open.
        let response = router
            .clone()
            .oneshot(
                Request::post("/api/v1/admin/circuit-breaker/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(breaker.state(), CircuitState::Closed);

        let response = router
            .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
