//! # Bastion Cache
//!
//! Read-through cache for entities that live in an authoritative store.
//!
//! ```text
//! Repository
//!   ↓  take_by_id / take_by_index / exec_*
//! CacheManager            (cache-aside engine)
//!   ├─ Coalescer          (one load per key at a time)
//!   ├─ TtlPolicy          (jittered expiry)
//!   └─ Arc<dyn KeyValueStore>
//!        ├─ RedisStore    (deadpool-redis)
//!        └─ MemoryStore   (tests, local runs)
//! ```
//!
//! Keys look like `cache:user:42` for entities and
//! `cache:user:email:a@example.com` for index entries. A confirmed absence
//! is cached as `*` for a short TTL so repeated lookups of missing records
//! stay off the database.
//!
//! [`TaskLock`] reuses the same store for cross-instance mutual exclusion of
//! scheduled tasks.

pub mod codec;
pub mod coalesce;
pub mod jitter;
pub mod keys;
pub mod lock;
pub mod manager;
pub mod metrics;
pub mod store;

pub use codec::{CachedValue, Cacheable, NOT_FOUND_PLACEHOLDER};
pub use coalesce::{Coalesced, Coalescer};
pub use jitter::{TtlPolicy, MIN_TTL};
pub use keys::KeyBuilder;
pub use lock::{LockGuard, TaskLock, DEFAULT_LOCK_PREFIX};
pub use manager::CacheManager;
pub use metrics::{register_metrics, CacheMetrics};
pub use store::{create_pool, KeyTtl, KeyValueStore, MemoryStore, RedisStore};
