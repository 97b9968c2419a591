// Global and per-client admission. The adaptive global limiter runs first;
// only traffic it admits is charged against the caller's IP bucket.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::warn;

use crate::shell::state::AppState;

pub async fn admission_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.admission.global.allow() {
        warn!(
            method = %request.method(),
            path = request.uri().path(),
            "global rate limit exceeded"
        );
        return rejection("10", "Global rate limit exceeded. Please try again later.");
    }

    let ip = client_ip(&request, state.admission.trust_forwarded_for);
    if !state.admission.per_ip.allow(&ip) {
        warn!(
            method = %request.method(),
            path = request.uri().path(),
            ip = %ip,
            "ip rate limit exceeded"
        );
        return rejection("60", "IP rate limit exceeded. Please try again later.");
    }

    next.run(request).await
}

fn rejection(retry_after: &'static str, message: &'static str) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after)],
        message,
    )
        .into_response()
}

/// Client address for the per-IP bucket: the first `X-Forwarded-For` entry
/// when the deployment trusts its proxy, otherwise the peer address with
/// the port stripped.
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        if let Some(forwarded) = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
        {
            if let Some(first) = forwarded.split(',').next() {
                let trimmed = first.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod rate_limit_middleware_tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::shared::infrastructure::ratelimit::{AdaptiveRateLimiter, KeyedRateLimiter};
    use crate::shell::http::build_router;
    use crate::shell::state::test_support::{make_test_state_with_admission, permissive_admission};

    fn get_orders() -> Request<Body> {
        Request::get("/api/v1/orders").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn it_should_reject_with_429_when_the_global_bucket_is_empty() {
        let mut admission = permissive_admission();
        admission.global = Arc::new(AdaptiveRateLimiter::new(2.0, 0.0, 0.0, 0.8));
        let (state, _harness) = make_test_state_with_admission(admission);
        let router = build_router(state);

        for _ in 0..2 {
            let response = router.clone().oneshot(get_orders()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router.oneshot(get_orders()).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "10");
    }

    #[tokio::test]
    async fn it_should_bucket_clients_by_forwarded_ip() {
        let mut admission = permissive_admission();
        admission.per_ip = Arc::new(KeyedRateLimiter::new(1.0, 0.0, Duration::from_secs(3600)));
        let (state, _harness) = make_test_state_with_admission(admission);
        let router = build_router(state);

        let from = |ip: &str| {
            Request::get("/api/v1/orders")
                .header("x-forwarded-for", ip)
                .body(Body::empty())
                .unwrap()
        };

        let response = router.clone().oneshot(from("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router.clone().oneshot(from("10.0.0.1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "60");

        // A different client is unaffected.
        let response = router.oneshot(from("10.0.0.2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
