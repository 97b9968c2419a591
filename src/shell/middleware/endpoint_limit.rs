// Per-endpoint admission keyed by `METHOD:PATH`, the innermost gate before
// the handler. Buckets spring into existence with the defaults; explicit
// limits arrive through the admin surface.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::shell::state::AppState;

pub fn endpoint_key(method: &axum::http::Method, path: &str) -> String {
    format!("{method}:{path}")
}

pub async fn endpoint_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = endpoint_key(request.method(), request.uri().path());

    if !state.admission.per_endpoint.allow(&key) {
        warn!(endpoint = %key, "endpoint rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "5")],
            "Endpoint rate limit exceeded. Please try again later.",
        )
            .into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod endpoint_limit_middleware_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::shared::infrastructure::ratelimit::KeyedRateLimiter;
    use crate::shell::http::build_router;
    use crate::shell::state::test_support::{make_test_state_with_admission, permissive_admission};

    #[tokio::test]
    async fn endpoints_are_limited_independently() {
        let mut admission = permissive_admission();
        admission.per_endpoint =
            Arc::new(KeyedRateLimiter::new(1.0, 0.0, Duration::from_secs(3600)));
        let (state, _harness) = make_test_state_with_admission(admission);
        let router = build_router(state);

        let response = router
            .clone()
            .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(Request::get("/api/v1/orders").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "5");

        // A different endpoint has its own bucket.
        let response = router
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
