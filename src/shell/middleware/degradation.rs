// Circuit-breaker-backed graceful degradation. Health and admin endpoints
// are essential and bypass the breaker entirely; everything else feeds its
// final status back into it, with 4xx responses counting as neither
// success nor failure.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::shell::state::AppState;

pub fn is_essential(path: &str) -> bool {
    path.starts_with("/api/v1/health") || path.starts_with("/api/v1/admin")
}

pub async fn graceful_degradation(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let essential = is_essential(request.uri().path());

    if !essential && !state.admission.breaker.allow() {
        warn!(
            method = %request.method(),
            path = request.uri().path(),
            state = state.admission.breaker.state().as_str(),
            "circuit is open, request rejected"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "30")],
            "Service is temporarily unavailable. Please try again later.",
        )
            .into_response();
    }

    let response = next.run(request).await;

    if !essential {
        let status = response.status().as_u16();
        if status >= 500 {
            state.admission.breaker.failure();
        } else if status < 400 {
            state.admission.breaker.success();
        }
    }

    response
}

#[cfg(test)]
mod degradation_middleware_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use super::is_essential;
    use crate::shared::infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use crate::shell::http::build_router;
    use crate::shell::state::test_support::{make_test_state_with_admission, permissive_admission};

    #[test]
    fn health_and_admin_paths_are_essential() {
        assert!(is_essential("/api/v1/health"));
        assert!(is_essential("/api/v1/admin/dead-letters"));
        assert!(!is_essential("/api/v1/orders"));
    }

    #[tokio::test]
    async fn repeated_failures_open_the_circuit_for_non_essential_paths_only() {
        let mut admission = permissive_admission();
        admission.breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }));
        let (state, harness) = make_test_state_with_admission(admission);
        let router = build_router(state);

        // Force 500s by taking the store offline.
        harness.orders.toggle_offline();
        for _ in 0..3 {
            let response = router
                .clone()
                .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }

        // The circuit is now open: non-essential traffic gets 503 with the
        // advisory header.
        let response = router
            .clone()
            .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()["retry-after"], "30");

        // Essential endpoints keep answering.
        let response = router
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn client_errors_do_not_feed_the_breaker() {
        let mut admission = permissive_admission();
        admission.breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(30),
            half_open_max_calls: 1,
        }));
        let (state, _harness) = make_test_state_with_admission(admission);
        let router = build_router(state);

        for _ in 0..5 {
            let response = router
                .clone()
                .oneshot(
                    Request::get("/api/v1/orders/ord-missing")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        // 404s are 4xx; the circuit must still be closed.
        let response = router
            .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
