//! Counter store abstraction shared by the in-process and Redis backends.

use super::key::WindowKey;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failure to reach or use the counter store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("counter store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl StoreError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Timeout(_) => "timeout",
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Redis(_) => "redis",
        }
    }
}

/// Atomic fixed-window counters keyed by [`WindowKey`].
///
/// Implementations attach the window TTL when a key goes from 0 to 1 and
/// never touch it afterwards. Concurrent `increment` calls on one key must
/// linearize: each caller observes a distinct value.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` and return the new value.
    async fn increment(&self, key: &WindowKey) -> Result<i64, StoreError>;

    /// Time left in the key's window, `None` when no window is active.
    async fn remaining_ttl(&self, key: &WindowKey) -> Result<Option<Duration>, StoreError>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}
