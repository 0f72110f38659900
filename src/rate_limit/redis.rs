use super::key::WindowKey;
use super::lua_scripts::FIXED_WINDOW_INCREMENT_SCRIPT;
use super::store::{CounterStore, StoreError};
use crate::config::RedisConfig;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, IntoConnectionInfo, Script};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis-backed counter store shared by every instance pointing at it
pub struct RedisCounterStore {
    /// Redis connection manager (multiplexed, cheap to clone)
    connection: ConnectionManager,
    /// Increment-with-conditional-expiry script
    script: Script,
    /// Window length attached to newly created keys
    window: Duration,
}

impl RedisCounterStore {
    /// Connect to Redis and verify the connection
    pub async fn connect(config: &RedisConfig, window: Duration) -> Result<Self, StoreError> {
        let mut info = config.url.as_str().into_connection_info()?;
        if let Some(db) = config.db {
            info.redis.db = db;
        }
        if let Some(password) = &config.password {
            info.redis.password = Some(password.clone());
        }

        let client = redis::Client::open(info)?;
        let connection = ConnectionManager::new(client).await?;

        let mut store = Self {
            connection,
            script: Script::new(FIXED_WINDOW_INCREMENT_SCRIPT),
            window,
        };
        store.ping().await?;
        info!("Connected to Redis counter store at {}", config.url);

        Ok(store)
    }

    /// Test Redis connection
    pub async fn ping(&mut self) -> Result<(), StoreError> {
        redis::cmd("PING")
            .query_async::<_, ()>(&mut self.connection)
            .await
            .map_err(StoreError::from)
    }

    fn window_millis(&self) -> u64 {
        self.window.as_millis() as u64
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &WindowKey) -> Result<i64, StoreError> {
        let mut connection = self.connection.clone();
        let count = self
            .script
            .key(key.as_str())
            .arg(self.window_millis())
            .invoke_async::<_, i64>(&mut connection)
            .await?;

        debug!("Incremented {} to {}", key, count);
        Ok(count)
    }

    async fn remaining_ttl(&self, key: &WindowKey) -> Result<Option<Duration>, StoreError> {
        let mut connection = self.connection.clone();
        let ttl_ms: i64 = redis::cmd("PTTL")
            .arg(key.as_str())
            .query_async(&mut connection)
            .await?;

        // -2: no such key, -1: key without expiry
        match ttl_ms {
            ms if ms > 0 => Ok(Some(Duration::from_millis(ms as u64))),
            -1 => {
                warn!("Rate limit key {} has no expiry", key);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::key::WindowKeyDeriver;
    use crate::rate_limit::types::ClientIdentity;
    use std::collections::HashSet;
    use std::sync::Arc;

    // Note: These tests require a running Redis instance
    // They are ignored by default. Run with: cargo test -- --ignored

    async fn create_test_store(window: Duration) -> RedisCounterStore {
        let config = RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
            db: None,
            password: None,
        };

        RedisCounterStore::connect(&config, window)
            .await
            .expect("Failed to connect to Redis")
    }

    fn random_key(label: &str) -> WindowKey {
        WindowKeyDeriver::new("gatekeeper:test").derive(&ClientIdentity::new(format!(
            "{}-{}",
            label,
            rand::random::<u32>()
        )))
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_increment_sets_ttl_once() {
        let store = create_test_store(Duration::from_secs(2)).await;
        let key = random_key("ttl");

        assert_eq!(store.increment(&key).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.increment(&key).await.unwrap(), 2);

        let ttl = store.remaining_ttl(&key).await.unwrap().unwrap();
        assert!(ttl <= Duration::from_millis(1_500), "ttl was extended: {:?}", ttl);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_window_expires() {
        let store = create_test_store(Duration::from_secs(1)).await;
        let key = random_key("expiry");

        for _ in 0..3 {
            store.increment(&key).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(1_100)).await;

        assert_eq!(store.remaining_ttl(&key).await.unwrap(), None);
        assert_eq!(store.increment(&key).await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_remaining_ttl_missing_key() {
        let store = create_test_store(Duration::from_secs(60)).await;
        assert_eq!(
            store.remaining_ttl(&random_key("missing")).await.unwrap(),
            None
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore]
    async fn test_redis_concurrent_increments() {
        let store = Arc::new(create_test_store(Duration::from_secs(60)).await);
        let key = random_key("concurrent");

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let store = Arc::clone(&store);
                let key = key.clone();
                tokio::spawn(async move { store.increment(&key).await.unwrap() })
            })
            .collect();

        let mut values = HashSet::new();
        for handle in handles {
            assert!(values.insert(handle.await.unwrap()));
        }
        assert_eq!(values.len(), 200);
        assert_eq!(values.iter().max().copied(), Some(200));
    }

    #[tokio::test]
    #[ignore]
    async fn test_redis_connection() {
        let mut store = create_test_store(Duration::from_secs(60)).await;
        assert!(store.ping().await.is_ok());
    }
}
