use super::key::WindowKey;
use super::store::{CounterStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// A single window: the count so far and when it closes
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: i64,
    expires_at: Instant,
}

/// In-memory counter store.
///
/// Each key's read-modify-write happens under the dashmap shard lock held by
/// the entry guard, so increments on one key never interleave. Counters live
/// in this process only; running several instances multiplies the quota.
pub struct LocalCounterStore {
    counters: DashMap<String, WindowCounter>,
    window: Duration,
}

impl LocalCounterStore {
    /// Create a store whose windows last `window`
    pub fn new(window: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            window,
        }
    }

    fn bump(&self, key: &str) -> i64 {
        let now = Instant::now();
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| WindowCounter {
                count: 0,
                expires_at: now + self.window,
            });

        if entry.expires_at <= now {
            debug!("Window expired for key {}, starting a new one", key);
            *entry = WindowCounter {
                count: 0,
                expires_at: now + self.window,
            };
        }

        entry.count += 1;
        entry.count
    }

    /// Drop counters whose window has closed, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, counter| counter.expires_at > now);
        before.saturating_sub(self.counters.len())
    }

    /// Periodically purge expired counters until the store is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired rate limit windows", purged);
                }
            }
        })
    }

    /// Number of tracked keys, expired or not
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for LocalCounterStore {
    async fn increment(&self, key: &WindowKey) -> Result<i64, StoreError> {
        Ok(self.bump(key.as_str()))
    }

    async fn remaining_ttl(&self, key: &WindowKey) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(key.as_str())
            .and_then(|counter| counter.expires_at.checked_duration_since(now))
            .filter(|ttl| !ttl.is_zero()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
