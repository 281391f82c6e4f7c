//! Pooled Redis service.

use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::info;

use crate::{RedisConfig, RedisError, Result};

/// bb8 pool over multiplexed Redis connections.
pub type RedisPool = Pool<RedisConnectionManager>;

/// A connection checked out of the pool.
pub type RedisConnection<'a> = bb8::PooledConnection<'a, RedisConnectionManager>;

/// Redis service providing the connection pool and the typed operations the
/// presence and counter stores are built on. Every command is bounded by
/// the configured command timeout.
pub struct RedisService {
    config: RedisConfig,
    pool: RedisPool,
}

impl RedisService {
    /// Build the pool for `config` and probe it once via [`health_check`].
    ///
    /// [`health_check`]: RedisService::health_check
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.clone())
            .map_err(|e| RedisError::Connection(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .build(manager)
            .await
            .map_err(|e| RedisError::Pool(e.to_string()))?;

        let service = Self { config, pool };
        service.health_check().await?;
        info!(
            pool_size = service.config.pool_size,
            url = %service.config.url,
            "Redis pool ready"
        );
        Ok(service)
    }

    /// Create from an existing pool.
    pub fn from_pool(config: RedisConfig, pool: RedisPool) -> Self {
        Self { config, pool }
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Get a connection from the pool.
    pub async fn get(&self) -> Result<RedisConnection<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| RedisError::Pool(e.to_string()))
    }

    /// Run one command future under the configured command timeout.
    async fn bound<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.command_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(RedisError::Timeout),
        }
    }

    /// Check if the connection is healthy.
    pub async fn health_check(&self) -> Result<()> {
        self.bound(async {
            let mut conn = self.get().await?;
            let _: String = redis::cmd("PING")
                .query_async(&mut *conn)
                .await
                .map_err(|e| RedisError::Connection(e.to_string()))?;
            Ok(())
        })
        .await
    }

    /// Get a value.
    pub async fn get_value<T: redis::FromRedisValue>(&self, key: &str) -> Result<Option<T>> {
        self.bound(async {
            let mut conn = self.get().await?;
            let value: Option<T> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    /// Set a value.
    pub async fn set_value<T: redis::ToRedisArgs + Send + Sync>(
        &self,
        key: &str,
        value: T,
    ) -> Result<()> {
        self.bound(async {
            let mut conn = self.get().await?;
            let _: () = conn.set(key, value).await?;
            Ok(())
        })
        .await
    }

    /// Set a value with expiration.
    pub async fn set_ex<T: redis::ToRedisArgs + Send + Sync>(
        &self,
        key: &str,
        value: T,
        ttl: Duration,
    ) -> Result<()> {
        self.bound(async {
            let mut conn = self.get().await?;
            let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
            Ok(())
        })
        .await
    }

    /// Delete a key.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.bound(async {
            let mut conn = self.get().await?;
            let deleted: u32 = conn.del(key).await?;
            Ok(deleted > 0)
        })
        .await
    }

    /// Check if a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.bound(async {
            let mut conn = self.get().await?;
            let exists: bool = conn.exists(key).await?;
            Ok(exists)
        })
        .await
    }

    /// Collect the keys matching `pattern` via SCAN.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.bound(async {
            let mut conn = self.get().await?;
            let mut keys = Vec::new();
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            Ok(keys)
        })
        .await
    }

    /// Execute a Lua script.
    pub async fn eval<T: redis::FromRedisValue>(
        &self,
        script: &str,
        keys: &[&str],
        args: &[&str],
    ) -> Result<T> {
        self.bound(async {
            let mut conn = self.get().await?;
            let script = redis::Script::new(script);
            let result: T = script.key(keys).arg(args).invoke_async(&mut *conn).await?;
            Ok(result)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_basic_operations() {
        let config = RedisConfig::builder().url("redis://localhost:6379").build();
        let redis = RedisService::new(config).await.unwrap();

        redis.set_value("coauthor_test_key", "v").await.unwrap();
        let value: Option<String> = redis.get_value("coauthor_test_key").await.unwrap();
        assert_eq!(value, Some("v".to_string()));

        assert!(redis.exists("coauthor_test_key").await.unwrap());
        redis.delete("coauthor_test_key").await.unwrap();
        assert!(!redis.exists("coauthor_test_key").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_eval_script() {
        let config = RedisConfig::builder().url("redis://localhost:6379").build();
        let redis = RedisService::new(config).await.unwrap();

        let sum: i64 = redis
            .eval(
                "return tonumber(ARGV[1]) + tonumber(ARGV[2])",
                &[],
                &["2", "3"],
            )
            .await
            .unwrap();
        assert_eq!(sum, 5);
    }
}
