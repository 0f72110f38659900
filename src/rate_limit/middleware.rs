use super::service::RateLimiterService;
use super::types::ClientIdentity;
use crate::error::GatekeeperError;
use crate::metrics::record_rate_limit_exceeded;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";
pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Install the rate limiting stage in front of every route of `router`.
///
/// `None` leaves the router untouched, so a disabled limiter costs nothing
/// per request.
pub fn install<S>(router: Router<S>, limiter: Option<Arc<RateLimiterService>>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    match limiter {
        Some(limiter) => {
            info!("Rate limiting stage installed");
            router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        }
        None => {
            info!("Rate limiting disabled, stage not installed");
            router
        }
    }
}

/// Axum middleware function for rate limiting
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiterService>>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(&request, limiter.config().trust_forwarded_headers);
    let decision = limiter.check_rate_limit(&identity).await;

    if !decision.allowed {
        record_rate_limit_exceeded(request.uri().path());
        return GatekeeperError::RateLimited {
            retry_after_secs: decision.retry_after_secs(),
            limit: decision.limit,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    if let Some(remaining) = decision.remaining() {
        add_rate_limit_headers(response.headers_mut(), decision.limit, remaining);
    }
    response
}

/// Resolve the caller's identity.
///
/// Forwarded headers win when trusted, then the transport peer address.
/// A request with neither maps to the shared unresolved identity.
pub fn client_identity(request: &Request, trust_forwarded_headers: bool) -> ClientIdentity {
    let forwarded = if trust_forwarded_headers {
        forwarded_client(request.headers())
    } else {
        None
    };

    let resolved = forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
    });

    match resolved {
        Some(address) => {
            debug!("Client identity resolved to {}", address);
            ClientIdentity::new(address)
        }
        None => {
            warn!(
                "Could not resolve client address for {}, using shared fallback identity",
                request.uri().path()
            );
            ClientIdentity::unresolved()
        }
    }
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`
fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    let first_hop = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    first_hop.or_else(real_ip).map(str::to_string)
}

/// Add rate limit headers to successful responses
pub fn add_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u64) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
}
