//! Distributed task lock.
//!
//! Acquire is a create-if-absent with a TTL; release is an unconditional
//! delete. There is no owner token: a holder whose TTL lapsed may delete a
//! lock that another instance has since taken, which at worst lets one
//! extra run start.

use crate::store::KeyValueStore;
use bastion_core::BastionResult;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default lock key prefix.
pub const DEFAULT_LOCK_PREFIX: &str = "task:lock:";

/// Mutual exclusion over the shared store.
#[derive(Clone)]
pub struct TaskLock {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl TaskLock {
    /// Creates a lock namespace.
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Key guarding `name`.
    #[must_use]
    pub fn key(&self, name: &str) -> String {
        format!("{}{name}", self.prefix)
    }

    /// Tries to take the lock for `name` for at most `ttl`.
    ///
    /// Returns `None` if another holder has it. With the store disabled
    /// there is nothing to coordinate through and the lock is always granted.
    pub async fn try_acquire(&self, name: &str, ttl: Duration) -> BastionResult<Option<LockGuard>> {
        let key = self.key(name);

        if self.store.is_enabled() {
            let stamp = Utc::now().timestamp().to_string();
            if !self.store.set_nx(&key, &stamp, ttl).await? {
                debug!(lock = %key, "Lock held elsewhere");
                return Ok(None);
            }
        }

        debug!(lock = %key, ttl = ?ttl, "Lock acquired");
        Ok(Some(LockGuard {
            store: Arc::clone(&self.store),
            key,
            released: false,
        }))
    }

    /// Runs `work` while holding the lock for `name`.
    ///
    /// Returns `Ok(None)` without running `work` if the lock is taken. The
    /// lock is released once `work` finishes, whatever its outcome.
    pub async fn run_exclusive<R, F, Fut>(&self, name: &str, ttl: Duration, work: F) -> BastionResult<Option<R>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        let Some(guard) = self.try_acquire(name, ttl).await? else {
            return Ok(None);
        };

        let result = work().await;
        guard.release().await;
        Ok(Some(result))
    }
}

/// Held lock. Release it with [`LockGuard::release`]; dropping it unreleased
/// (on panic or cancellation) schedules the delete on the runtime instead.
pub struct LockGuard {
    store: Arc<dyn KeyValueStore>,
    key: String,
    released: bool,
}

impl LockGuard {
    /// Key of the held lock.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Deletes the lock key. Failures are logged; the TTL bounds the damage.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.store.delete(&[self.key.clone()]).await {
            warn!(lock = %self.key, error = %e, "Failed to release lock");
        } else {
            debug!(lock = %self.key, "Lock released");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.delete(&[key.clone()]).await {
                        warn!(lock = %key, error = %e, "Failed to release abandoned lock");
                    }
                });
            }
            Err(_) => warn!(lock = %key, "Lock dropped outside a runtime, it will expire on its own"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RedisStore};
    use tokio_test::assert_ok;

    fn lock(store: &Arc<MemoryStore>) -> TaskLock {
        let store: Arc<dyn KeyValueStore> = store.clone();
        TaskLock::new(store, DEFAULT_LOCK_PREFIX)
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock(&store);

        let guard = lock.try_acquire("cleanup", Duration::from_secs(60)).await.unwrap();
        assert!(guard.is_some());
        assert!(lock.try_acquire("cleanup", Duration::from_secs(60)).await.unwrap().is_none());
        assert!(lock.try_acquire("stats", Duration::from_secs(60)).await.unwrap().is_some());

        guard.unwrap().release().await;
        assert!(lock.try_acquire("cleanup", Duration::from_secs(60)).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_with_ttl() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock(&store);

        let _held = lock.try_acquire("cleanup", Duration::from_secs(10)).await.unwrap().unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(lock.try_acquire("cleanup", Duration::from_secs(10)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_run_exclusive_releases_after_failure() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock(&store);

        let out: Option<Result<(), &str>> = lock
            .run_exclusive("stats", Duration::from_secs(60), || async { Err("boom") })
            .await
            .unwrap();
        assert_eq!(out, Some(Err("boom")));
        assert_eq!(store.get("task:lock:stats").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_exclusive_skips_when_held() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock(&store);
        let _held = lock.try_acquire("stats", Duration::from_secs(60)).await.unwrap().unwrap();

        let out = assert_ok!(lock.run_exclusive("stats", Duration::from_secs(60), || async { 1 }).await);
        assert_eq!(out, None);
    }

    #[tokio::test]
    async fn test_dropped_guard_releases_in_background() {
        let store = Arc::new(MemoryStore::new());
        let lock = lock(&store);

        drop(lock.try_acquire("cleanup", Duration::from_secs(60)).await.unwrap().unwrap());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.get("task:lock:cleanup").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_disabled_store_always_grants() {
        let lock = TaskLock::new(Arc::new(RedisStore::disabled()), DEFAULT_LOCK_PREFIX);
        let first = lock.try_acquire("cleanup", Duration::from_secs(60)).await.unwrap();
        let second = lock.try_acquire("cleanup", Duration::from_secs(60)).await.unwrap();
        assert!(first.is_some() && second.is_some());
    }
}
