use super::key::{WindowKey, WindowKeyDeriver};
use super::local::LocalCounterStore;
use super::redis::RedisCounterStore;
use super::store::{CounterStore, StoreError};
use super::types::{ClientIdentity, FailurePolicy, RateLimitConfig, RateLimitDecision};
use crate::config::RedisConfig;
use crate::error::Result;
use crate::metrics::{record_rate_limit_decision, record_store_error};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Fixed-window policy engine.
///
/// Holds no mutable state of its own; every check is one increment (plus one
/// TTL read on denial) against the injected counter store.
pub struct RateLimiterService {
    store: Arc<dyn CounterStore>,
    keys: WindowKeyDeriver,
    config: RateLimitConfig,
}

impl RateLimiterService {
    /// Create a rate limiter over an already constructed store
    pub fn new(config: RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        info!(
            "Rate limiter using {} store: {} requests per {}s ({:?})",
            store.name(),
            config.threshold,
            config.window_secs,
            config.failure_policy
        );
        Self {
            keys: WindowKeyDeriver::new(config.key_prefix.clone()),
            store,
            config,
        }
    }

    /// Create a rate limiter backed by an in-process store
    pub fn local_only(config: RateLimitConfig) -> Self {
        let store = Arc::new(LocalCounterStore::new(config.window()));
        Self::new(config, store)
    }

    /// Create a rate limiter backed by Redis
    pub async fn with_redis(config: RateLimitConfig, redis: &RedisConfig) -> Result<Self> {
        let store = RedisCounterStore::connect(redis, config.window()).await?;
        Ok(Self::new(config, Arc::new(store)))
    }

    /// Count this request against the identity's window and decide
    pub async fn check_rate_limit(&self, identity: &ClientIdentity) -> RateLimitDecision {
        let key = self.keys.derive(identity);
        let limit = self.config.threshold;

        let count = match self.bounded(self.store.increment(&key)).await {
            Ok(count) => count,
            Err(e) => return self.on_store_error(identity, e),
        };

        if count <= i64::from(limit) {
            debug!(
                "Rate limit check passed for {}: {}/{}",
                identity, count, limit
            );
            record_rate_limit_decision("allowed");
            return RateLimitDecision::allowed(count, limit);
        }

        let retry_after = self.retry_after(&key).await;
        warn!(
            "Rate limit exceeded for {}: {}/{}, retry after {:?}",
            identity, count, limit, retry_after
        );
        record_rate_limit_decision("denied");
        RateLimitDecision::denied(Some(count), limit, retry_after)
    }

    /// Time until the window closes. Falls back to a full window when the
    /// key vanished between the increment and this read, or the read failed.
    async fn retry_after(&self, key: &WindowKey) -> Duration {
        match self.bounded(self.store.remaining_ttl(key)).await {
            Ok(Some(ttl)) => ttl,
            Ok(None) => self.config.window(),
            Err(e) => {
                error!("Failed to read window TTL for {}: {}", key, e);
                record_store_error(e.kind());
                self.config.window()
            }
        }
    }

    fn on_store_error(&self, identity: &ClientIdentity, e: StoreError) -> RateLimitDecision {
        record_store_error(e.kind());
        match self.config.failure_policy {
            FailurePolicy::FailOpen => {
                error!(
                    "Counter store error, admitting {} uncounted (fail-open): {}",
                    identity, e
                );
                record_rate_limit_decision("degraded");
                RateLimitDecision::degraded(self.config.threshold)
            }
            FailurePolicy::FailClosed => {
                error!(
                    "Counter store error, rejecting {} (fail-closed): {}",
                    identity, e
                );
                record_rate_limit_decision("denied");
                RateLimitDecision::denied(None, self.config.threshold, self.config.window())
            }
        }
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> std::result::Result<T, StoreError> {
        let timeout = self.config.store_timeout();
        match tokio::time::timeout(timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(timeout)),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}
