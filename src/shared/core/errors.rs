// Application-wide error taxonomy. The variant decides both the HTTP status
// a handler translates to and whether the retry engine may re-attempt the
// operation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("temporary failure: {0}")]
    Temporary(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn temporary(message: impl Into<String>) -> Self {
        Self::Temporary(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Whether the retry engine may re-attempt an operation that failed with
    /// this error. Validation-style failures never heal on their own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::InvalidInput(_) | Self::Conflict(_) => false,
            Self::Temporary(_)
            | Self::Timeout(_)
            | Self::ServiceUnavailable(_)
            | Self::RateLimited(_)
            | Self::Internal(_) => true,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Temporary(_) | Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod app_error_tests {
    use super::*;

    #[test]
    fn it_should_not_retry_validation_style_errors() {
        assert!(!AppError::not_found("order").is_retryable());
        assert!(!AppError::invalid_input("amount").is_retryable());
        assert!(!AppError::Conflict("duplicate".into()).is_retryable());
    }

    #[test]
    fn it_should_retry_transient_errors() {
        assert!(AppError::temporary("warehouse 503").is_retryable());
        assert!(AppError::timeout("deadline").is_retryable());
        assert!(AppError::ServiceUnavailable("upstream down".into()).is_retryable());
        assert!(AppError::RateLimited("slow down".into()).is_retryable());
        assert!(AppError::internal("unclassified").is_retryable());
    }

    #[test]
    fn it_should_map_variants_onto_http_statuses() {
        assert_eq!(
            AppError::not_found("x").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::invalid_input("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Conflict("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::timeout("x").status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::RateLimited("x".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::internal("x").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
