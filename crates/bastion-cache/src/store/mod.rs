//! Key-value store abstraction.
//!
//! The cache only needs plain string values with per-key expiry. The
//! production backend is Redis; the in-memory backend serves tests and
//! single-process development setups.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{create_pool, RedisStore};

use async_trait::async_trait;
use bastion_core::BastionResult;
use std::time::Duration;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after the given duration.
    Expires(Duration),
}

/// Shared key-value store used by the cache and the task lock.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a key.
    async fn get(&self, key: &str) -> BastionResult<Option<String>>;

    /// Writes a key with an expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<()>;

    /// Writes a key only if it does not exist. Returns true when written.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<bool>;

    /// Deletes keys in one call, returning how many existed.
    async fn delete(&self, keys: &[String]) -> BastionResult<u64>;

    /// Inspects the remaining lifetime of a key.
    async fn ttl(&self, key: &str) -> BastionResult<KeyTtl>;

    /// Lists keys matching a glob pattern (`*` and `?`).
    async fn scan(&self, pattern: &str) -> BastionResult<Vec<String>>;

    /// Checks if the store is enabled.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Matches `key` against a glob pattern supporting `*` and `?`.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while k < key.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, k));
                p += 1;
            }
            Some(&c) if c == '?' || c == key[k] => {
                p += 1;
                k += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    k = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
