use crate::rate_limit::middleware::{X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING};
use crate::rate_limit::StoreError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type for gatekeeper operations
pub type Result<T> = std::result::Result<T, GatekeeperError>;

/// Gatekeeper error types
#[derive(Error, Debug)]
pub enum GatekeeperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Counter store error: {0}")]
    Store(#[from] StoreError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64, limit: u32 },
}

impl GatekeeperError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatekeeperError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatekeeperError::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatekeeperError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatekeeperError::NotFound(_) => StatusCode::NOT_FOUND,
            GatekeeperError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatekeeperError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatekeeperError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatekeeperError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for GatekeeperError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let GatekeeperError::RateLimited {
            retry_after_secs,
            limit,
        } = self
        {
            let body = Json(json!({
                "error": self.to_string(),
                "status": status.as_u16(),
                "retry_after": retry_after_secs,
            }));
            let mut response = (status, body).into_response();
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u32));
            return response;
        }

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
