pub mod config;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod rate_limit;
pub mod routes;

use crate::config::{GatekeeperConfig, StoreBackend};
use crate::error::{GatekeeperError, Result};
use crate::metrics::{metrics_handler, MetricsService};
use crate::observability::{make_request_span, request_id_middleware};
use crate::rate_limit::{LocalCounterStore, RateLimiterService};
use crate::routes::{health_handler, not_found_handler, AppState};
use axum::{
    error_handling::HandleErrorLayer, middleware, routing::get, BoxError, Router as AxumRouter,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use observability::init_tracing;

/// Build the configured rate limiter, or `None` when rate limiting is disabled
pub async fn build_rate_limiter(
    config: &GatekeeperConfig,
) -> Result<Option<Arc<RateLimiterService>>> {
    let settings = &config.rate_limiting;
    if !settings.enabled {
        return Ok(None);
    }
    settings.validate()?;

    let limiter = match config.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(LocalCounterStore::new(settings.window()));
            // The sweeper holds a weak reference and exits once the limiter is dropped
            store.spawn_sweeper(settings.window());
            RateLimiterService::new(settings.clone(), store)
        }
        StoreBackend::Redis => {
            let redis = config.store.redis.clone().unwrap_or_default();
            RateLimiterService::with_redis(settings.clone(), &redis).await?
        }
    };

    Ok(Some(Arc::new(limiter)))
}

/// Assemble the HTTP application.
///
/// When a limiter is given, the rate limiting stage sits in front of the
/// `/v1` routes and the not-found fallback, so unmatched paths are counted
/// too. `/metrics` is never limited.
pub fn build_app(
    config: &GatekeeperConfig,
    limiter: Option<Arc<RateLimiterService>>,
    metrics: Option<MetricsService>,
) -> AxumRouter {
    let api = AxumRouter::new()
        .route("/v1/health", get(health_handler))
        .fallback(not_found_handler)
        .with_state(AppState::new(config.server.environment.clone()));

    let mut app = rate_limit::install(api, limiter);

    if let Some(metrics) = metrics {
        app = app.merge(
            AxumRouter::new()
                .route("/metrics", get(metrics_handler))
                .with_state(metrics),
        );
    }

    app.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(middleware::from_fn(request_id_middleware))
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.server.timeout_secs,
            ))),
    )
}

async fn handle_middleware_error(err: BoxError) -> GatekeeperError {
    if err.is::<tower::timeout::error::Elapsed>() {
        GatekeeperError::Timeout("request took too long".to_string())
    } else {
        GatekeeperError::Internal(err.to_string())
    }
}

/// Run the server until SIGINT / SIGTERM
pub async fn run_server(config: GatekeeperConfig) -> Result<()> {
    // Invalid settings are fatal before any traffic is served
    config.validate()?;

    info!("Starting gatekeeper ({})", config.server.environment);

    let limiter = build_rate_limiter(&config).await?;

    let metrics = match MetricsService::new() {
        Ok(service) => Some(service),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let app = build_app(&config, limiter, metrics);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| GatekeeperError::Internal(format!("Server error: {}", e)))?;

    info!("Server has stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
