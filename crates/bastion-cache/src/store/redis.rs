//! Redis-backed key-value store.

use super::{KeyTtl, KeyValueStore};
use async_trait::async_trait;
use bastion_config::RedisConfig;
use bastion_core::{BastionError, BastionResult};
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 100;

/// Create a Redis connection pool and verify it with PING.
pub async fn create_pool(config: &RedisConfig) -> BastionResult<Pool> {
    info!("Creating Redis connection pool...");

    let pool = Config::from_url(&config.url)
        .builder()
        .map_err(|e| BastionError::Configuration(format!("Invalid Redis config: {e}")))?
        .max_size(config.pool_size as usize)
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| BastionError::Configuration(format!("Failed to create pool: {e}")))?;

    let mut conn = pool
        .get()
        .await
        .map_err(|e| BastionError::Cache(format!("Failed to get Redis connection: {e}")))?;
    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| BastionError::Cache(format!("Redis PING failed: {e}")))?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Redis-backed store.
///
/// A disabled store reads nothing and drops every write, so the cache
/// degrades to calling loaders directly.
#[derive(Clone)]
pub struct RedisStore {
    pool: Option<Arc<Pool>>,
}

impl RedisStore {
    /// Create a store over a pool.
    #[must_use]
    pub fn new(pool: Arc<Pool>) -> Self {
        Self { pool: Some(pool) }
    }

    /// Create a no-op store (for when Redis is disabled).
    #[must_use]
    pub fn disabled() -> Self {
        Self { pool: None }
    }

    async fn get_conn(&self) -> BastionResult<deadpool_redis::Connection> {
        match &self.pool {
            Some(pool) => pool
                .get()
                .await
                .map_err(|e| BastionError::Cache(format!("Failed to get Redis connection: {e}"))),
            None => Err(BastionError::Cache("Cache is disabled".to_string())),
        }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    async fn get(&self, key: &str) -> BastionResult<Option<String>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let mut conn = self.get_conn().await?;
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| BastionError::Cache(format!("Failed to get key '{key}': {e}")))?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let mut conn = self.get_conn().await?;
        let ttl_ms = ttl_millis(ttl);
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| BastionError::Cache(format!("Failed to set key '{key}': {e}")))?;

        debug!("Stored key '{}' with TTL {}ms", key, ttl_ms);
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }

        let mut conn = self.get_conn().await?;
        // SET NX replies OK when written and nil otherwise
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| BastionError::Cache(format!("Failed to set key '{key}': {e}")))?;

        Ok(reply.is_some())
    }

    async fn delete(&self, keys: &[String]) -> BastionResult<u64> {
        if !self.is_enabled() || keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.get_conn().await?;
        let deleted: u64 = conn
            .del(keys)
            .await
            .map_err(|e| BastionError::Cache(format!("Failed to delete keys {keys:?}: {e}")))?;

        debug!("Deleted {} of {} keys", deleted, keys.len());
        Ok(deleted)
    }

    async fn ttl(&self, key: &str) -> BastionResult<KeyTtl> {
        if !self.is_enabled() {
            return Ok(KeyTtl::Missing);
        }

        let mut conn = self.get_conn().await?;
        let millis: i64 = conn
            .pttl(key)
            .await
            .map_err(|e| BastionError::Cache(format!("Failed to read TTL of '{key}': {e}")))?;

        Ok(match millis {
            -2 => KeyTtl::Missing,
            -1 => KeyTtl::Persistent,
            ms => KeyTtl::Expires(Duration::from_millis(ms.unsigned_abs())),
        })
    }

    async fn scan(&self, pattern: &str) -> BastionResult<Vec<String>> {
        if !self.is_enabled() {
            return Ok(Vec::new());
        }

        let mut conn = self.get_conn().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| BastionError::Cache(format!("Failed to scan '{pattern}': {e}")))?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
