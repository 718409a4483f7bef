//! Cache-aside engine.
//!
//! Reads go through [`CacheManager::take_by_id`] or
//! [`CacheManager::take_by_index`]; writes go through the `exec_*` methods,
//! which run the write first and delete the affected keys only if it
//! succeeded.
//!
//! The store is an optimization, never a dependency: a failed read is
//! treated as a miss, and failed writes and deletes are logged and counted
//! but not returned. Only loader errors and index conversion errors reach
//! the caller.

use crate::codec::{decode, encode, is_decodable, is_placeholder, CachedValue, Cacheable, NOT_FOUND_PLACEHOLDER};
use crate::coalesce::Coalescer;
use crate::jitter::TtlPolicy;
use crate::keys::KeyBuilder;
use crate::metrics::{error_types, CacheMetrics};
use crate::store::KeyValueStore;
use bastion_config::CacheConfig;
use bastion_core::{BastionError, BastionResult};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Read-through cache over a shared key-value store.
///
/// Cloning is cheap and clones share the store and the in-flight table.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn KeyValueStore>,
    keys: KeyBuilder,
    ttl_policy: TtlPolicy,
    not_found_ttl: Duration,
    index_ttl_multiplier: u32,
    coalescer: Arc<Coalescer>,
}

impl CacheManager {
    /// Creates an engine with its own in-flight table.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        Self::with_coalescer(store, config, Arc::new(Coalescer::new()))
    }

    /// Creates an engine that coalesces through the given table.
    #[must_use]
    pub fn with_coalescer(store: Arc<dyn KeyValueStore>, config: &CacheConfig, coalescer: Arc<Coalescer>) -> Self {
        let config = config.clone().normalized();
        Self {
            store,
            keys: KeyBuilder::new(config.key_prefix.clone()),
            ttl_policy: TtlPolicy::from_config(&config),
            not_found_ttl: config.not_found_ttl(),
            index_ttl_multiplier: config.index_ttl_multiplier,
            coalescer,
        }
    }

    /// Replaces the TTL policy.
    #[must_use]
    pub fn with_ttl_policy(mut self, ttl_policy: TtlPolicy) -> Self {
        self.ttl_policy = ttl_policy;
        self
    }

    /// Returns the key builder.
    #[must_use]
    pub fn keys(&self) -> &KeyBuilder {
        &self.keys
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Returns the in-flight table.
    #[must_use]
    pub fn coalescer(&self) -> &Arc<Coalescer> {
        &self.coalescer
    }

    /// Key of an entity by primary identifier.
    #[must_use]
    pub fn build_key(&self, entity: &str, id: impl Display) -> String {
        self.keys.build_key(entity, id)
    }

    /// Key of a secondary index entry.
    #[must_use]
    pub fn build_index_key(&self, entity: &str, field: &str, value: impl Display) -> String {
        self.keys.build_index_key(entity, field, value)
    }

    /// Base TTL of index entries for entities cached with `base_ttl`.
    #[must_use]
    pub fn index_ttl(&self, base_ttl: Duration) -> Duration {
        base_ttl * self.index_ttl_multiplier
    }

    /// Returns the entity `id`, loading and caching it on a miss.
    ///
    /// A negative-cache marker yields `NotFound` without calling `loader`.
    /// Concurrent misses on the same key call `loader` once and all receive
    /// its outcome. A `NotFound` from `loader` is cached as a marker with
    /// the negative TTL; other loader errors are not cached.
    pub async fn take_by_id<T, F, Fut>(
        &self,
        entity: &'static str,
        id: impl Display,
        base_ttl: Duration,
        loader: F,
    ) -> BastionResult<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BastionResult<T>> + Send + 'static,
    {
        let id = id.to_string();
        let key = self.keys.build_key(entity, &id);

        let raw = self
            .resolve(entity, key, &id, base_ttl, is_decodable::<T>, move || async move {
                let value = loader().await?;
                encode(&value)
            })
            .await?;

        match decode::<T>(&raw) {
            Ok(CachedValue::Present(value)) => Ok(value),
            Ok(CachedValue::Absent) => Err(BastionError::not_found(entity, id)),
            Err(e) => Err(BastionError::internal(format!(
                "cached {entity} {id} does not decode as the requested type: {e}"
            ))),
        }
    }

    /// Returns the entity whose `field` equals `value`.
    ///
    /// The index entry `field = value -> id` is cached like an entity (same
    /// coalescing, marker and jitter rules) with `index_ttl(base_ttl)`; the
    /// entity itself is then read through [`Self::take_by_id`]. A cached id
    /// that `parse_id` rejects is a `Conversion` error. If the id resolves
    /// but the entity is gone, the index entry is dropped so it cannot keep
    /// pointing at nothing.
    #[allow(clippy::too_many_arguments)]
    pub async fn take_by_index<T, I, E, FI, FutI, FD, FutD, P>(
        &self,
        entity: &'static str,
        field: &str,
        value: impl Display,
        base_ttl: Duration,
        index_loader: FI,
        data_loader: FD,
        parse_id: P,
    ) -> BastionResult<T>
    where
        T: Cacheable,
        I: Display + Send + 'static,
        E: Display,
        FI: FnOnce() -> FutI + Send + 'static,
        FutI: Future<Output = BastionResult<I>> + Send + 'static,
        FD: FnOnce(I) -> FutD + Send + 'static,
        FutD: Future<Output = BastionResult<T>> + Send + 'static,
        P: FnOnce(&str) -> Result<I, E> + Send,
    {
        let value = value.to_string();
        let index_key = self.keys.build_index_key(entity, field, &value);
        let index_ttl = self.index_ttl(base_ttl);

        let raw_id = self
            .resolve(entity, index_key.clone(), &value, index_ttl, accept_any, move || async move {
                let id = index_loader().await?;
                Ok(id.to_string())
            })
            .await?;

        let id = parse_id(&raw_id).map_err(|e| {
            CacheMetrics::error("take_by_index", error_types::CONVERSION);
            BastionError::conversion(format!("index entry '{index_key}' holds '{raw_id}': {e}"))
        })?;

        let result = self
            .take_by_id(entity, id.to_string(), base_ttl, move || data_loader(id))
            .await;

        if let Err(e) = &result {
            if e.is_not_found() {
                debug!(key = %index_key, "Index points at a missing {}, dropping it", entity);
                self.invalidate(entity, &[index_key]).await;
            }
        }
        result
    }

    /// Runs a write, then deletes the entity's primary entry.
    ///
    /// A failed write leaves the cache untouched and its error is returned
    /// unchanged.
    pub async fn exec_by_id<R, F, Fut>(&self, entity: &'static str, id: impl Display, exec: F) -> BastionResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BastionResult<R>>,
    {
        let key = self.keys.build_key(entity, id);
        let result = exec().await?;
        self.invalidate(entity, &[key]).await;
        Ok(result)
    }

    /// Runs a write, then deletes the primary entry and `index_keys` in one call.
    ///
    /// Pass the index keys for both the old and the new value of every
    /// indexed field the write changed.
    pub async fn exec_by_id_with_indexes<R, F, Fut>(
        &self,
        entity: &'static str,
        id: impl Display,
        index_keys: Vec<String>,
        exec: F,
    ) -> BastionResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BastionResult<R>>,
    {
        let mut keys = Vec::with_capacity(index_keys.len() + 1);
        keys.push(self.keys.build_key(entity, id));
        keys.extend(index_keys);
        self.exec_by_indexes(entity, keys, exec).await
    }

    /// Runs a write, then deletes exactly `keys` in one call.
    pub async fn exec_by_indexes<R, F, Fut>(&self, entity: &'static str, keys: Vec<String>, exec: F) -> BastionResult<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BastionResult<R>>,
    {
        let result = exec().await?;
        self.invalidate(entity, &keys).await;
        Ok(result)
    }

    /// Deletes `keys`, returning how many existed.
    ///
    /// Failures are logged and counted; the already-applied write stands and
    /// stale entries expire on their own.
    pub async fn invalidate(&self, entity: &str, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }

        match self.store.delete(keys).await {
            Ok(deleted) => {
                CacheMetrics::delete(entity, deleted);
                debug!(entity = %entity, keys = ?keys, deleted, "Invalidated cache entries");
                deleted
            }
            Err(e) => {
                warn!(entity = %entity, keys = ?keys, error = %e, "Cache invalidation failed");
                CacheMetrics::error("delete", error_types::WRITE);
                0
            }
        }
    }

    /// Shared get-or-load over raw strings.
    ///
    /// `accept` tells usable raw values from corrupt ones; the marker is
    /// handled here and never reaches it.
    async fn resolve<F, Fut>(
        &self,
        entity: &'static str,
        key: String,
        id: &str,
        base_ttl: Duration,
        accept: fn(&str) -> bool,
        load: F,
    ) -> BastionResult<String>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = BastionResult<String>> + Send + 'static,
    {
        match self.store.get(&key).await {
            Ok(Some(raw)) if is_placeholder(&raw) => {
                CacheMetrics::hit(entity);
                trace!(key = %key, "Negative cache hit");
                return Err(BastionError::not_found(entity, id));
            }
            Ok(Some(raw)) if accept(&raw) => {
                CacheMetrics::hit(entity);
                trace!(key = %key, "Cache hit");
                return Ok(raw);
            }
            Ok(Some(_)) => {
                warn!(key = %key, "Discarding undecodable cache entry");
                CacheMetrics::error("get", error_types::DESERIALIZE);
                self.invalidate(entity, &[key.clone()]).await;
                CacheMetrics::miss(entity);
            }
            Ok(None) => {
                CacheMetrics::miss(entity);
                trace!(key = %key, "Cache miss");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, falling back to loader");
                CacheMetrics::error("get", error_types::READ);
                CacheMetrics::miss(entity);
            }
        }

        let store = Arc::clone(&self.store);
        let ttl = self.ttl_policy.apply(base_ttl);
        let not_found_ttl = self.not_found_ttl;
        let load_key = key.clone();

        let outcome = self
            .coalescer
            .run(&key, move || async move {
                // a writer may have filled the key since the first read
                if let Ok(Some(raw)) = store.get(&load_key).await {
                    if is_placeholder(&raw) || accept(&raw) {
                        return Ok(raw);
                    }
                }

                match load().await {
                    Ok(encoded) => {
                        populate(store.as_ref(), entity, &load_key, &encoded, ttl).await;
                        Ok(encoded)
                    }
                    Err(e) if e.is_not_found() => {
                        populate(store.as_ref(), entity, &load_key, NOT_FOUND_PLACEHOLDER, not_found_ttl).await;
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            })
            .await;

        if outcome.shared {
            CacheMetrics::coalesced(entity);
        }

        let raw = outcome.result?;
        if is_placeholder(&raw) {
            return Err(BastionError::not_found(entity, id));
        }
        Ok(raw)
    }
}

fn accept_any(_raw: &str) -> bool {
    true
}

async fn populate(store: &dyn KeyValueStore, entity: &str, key: &str, value: &str, ttl: Duration) {
    match store.set(key, value, ttl).await {
        Ok(()) => {
            CacheMetrics::set(entity);
            trace!(key = %key, ttl = ?ttl, "Cache entry written");
        }
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to write cache entry");
            CacheMetrics::error("set", error_types::WRITE);
        }
    }
}
