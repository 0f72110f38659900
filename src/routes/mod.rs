//! Handlers served by the gatekeeper itself.
//!
//! Application routes (posts, users, feeds, ...) are mounted by the embedding
//! service; the health check is the one route every deployment carries.

use crate::error::GatekeeperError;
use axum::{extract::State, http::Uri, Json};
use serde::Serialize;
use std::sync::Arc;

/// Shared state for the built-in handlers
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppInfo>,
}

#[derive(Debug)]
struct AppInfo {
    environment: String,
    version: &'static str,
}

impl AppState {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AppInfo {
                environment: environment.into(),
                version: env!("CARGO_PKG_VERSION"),
            }),
        }
    }
}

/// Health check response body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub env: String,
    pub version: &'static str,
}

/// `GET /v1/health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        env: state.inner.environment.clone(),
        version: state.inner.version,
    })
}

/// Fallback for unmatched paths
pub async fn not_found_handler(uri: Uri) -> GatekeeperError {
    GatekeeperError::NotFound(uri.path().to_string())
}
