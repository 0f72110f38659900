use crate::error::{GatekeeperError, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tracing::{debug, info};

/// Metrics service for collecting and exposing Prometheus metrics
#[derive(Clone)]
pub struct MetricsService {
    handle: Arc<PrometheusHandle>,
}

impl MetricsService {
    /// Install the global Prometheus recorder
    pub fn new() -> Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            GatekeeperError::Internal(format!("Failed to install metrics recorder: {}", e))
        })?;

        Self::register_metrics();

        info!("Metrics service initialized successfully");

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Register all metrics with descriptions
    fn register_metrics() {
        describe_counter!(
            "gatekeeper_rate_limit_decisions_total",
            "Admission decisions by outcome (allowed, denied, degraded)"
        );
        describe_counter!(
            "gatekeeper_rate_limit_exceeded_total",
            "Total number of requests rejected due to rate limiting"
        );
        describe_counter!(
            "gatekeeper_store_errors_total",
            "Counter store failures by kind"
        );

        debug!("All metrics registered with descriptions");
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Metrics endpoint handler
pub async fn metrics_handler(State(service): State<MetricsService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        service.render(),
    )
}

/// Record the outcome of an admission check
pub fn record_rate_limit_decision(outcome: &'static str) {
    let labels = [("outcome", outcome.to_string())];
    counter!("gatekeeper_rate_limit_decisions_total", &labels).increment(1);
}

/// Record rate limit exceeded
pub fn record_rate_limit_exceeded(path: &str) {
    let labels = [("path", sanitize_path(path))];
    counter!("gatekeeper_rate_limit_exceeded_total", &labels).increment(1);
}

/// Record a counter store failure
pub fn record_store_error(kind: &'static str) {
    let labels = [("kind", kind.to_string())];
    counter!("gatekeeper_store_errors_total", &labels).increment(1);
}

/// Replace id-like path segments so labels stay low-cardinality
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_likely_id(seg) { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a path segment is likely an ID (numeric, UUID, activation token)
fn is_likely_id(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    if segment.len() >= 32 && segment.contains('-') {
        return segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
    }

    if segment.len() > 10 && segment.chars().all(|c| c.is_ascii_alphanumeric()) {
        let has_numbers = segment.chars().any(|c| c.is_ascii_digit());
        let has_letters = segment.chars().any(|c| c.is_ascii_alphabetic());
        return has_numbers && has_letters;
    }

    false
}
