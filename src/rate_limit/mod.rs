//! Rate limiting module
//!
//! Fixed-window admission control keyed by client identity. Each identity's
//! window opens on its first request and lasts `window_secs`; requests past
//! `threshold` inside the window are rejected with `429 Too Many Requests`.
//!
//! # Components
//!
//! - **Counter stores**: [`LocalCounterStore`] (in-process) and
//!   [`RedisCounterStore`] (shared across instances), both behind
//!   [`CounterStore`]
//! - **Key derivation**: [`WindowKeyDeriver`] maps identities to counter keys
//! - **Policy engine**: [`RateLimiterService`] decides allow/deny and applies
//!   the fail-open / fail-closed policy when the store is unavailable
//! - **Middleware**: [`install`] puts the stage in front of an axum router
//!
//! # Example
//!
//! ```rust,no_run
//! use gatekeeper::rate_limit::{RateLimitConfig, RateLimiterService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = RateLimitConfig::new(100, 60);
//!
//!     // Create local-only rate limiter
//!     let limiter = Arc::new(RateLimiterService::local_only(config));
//!
//!     let app = gatekeeper::rate_limit::install(axum::Router::<()>::new(), Some(limiter));
//!     # let _ = app;
//! }
//! ```

pub mod key;
pub mod local;
pub mod lua_scripts;
pub mod middleware;
pub mod redis;
pub mod service;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use key::{WindowKey, WindowKeyDeriver};
pub use local::LocalCounterStore;
pub use middleware::{client_identity, install, rate_limit_middleware};
pub use redis::RedisCounterStore;
pub use service::RateLimiterService;
pub use store::{CounterStore, StoreError};
pub use types::{
    ClientIdentity, FailurePolicy, RateLimitConfig, RateLimitDecision, UNRESOLVED_IDENTITY,
};
