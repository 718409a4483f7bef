//! Process-local key-value store.

use super::{glob_match, KeyTtl, KeyValueStore};
use async_trait::async_trait;
use bastion_core::BastionResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-memory store with lazy expiry on the tokio clock.
///
/// Using `tokio::time::Instant` lets paused-clock tests advance time
/// deterministically.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a key without expiry.
    pub fn insert_persistent(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.lock().insert(
            key.into(),
            Entry {
                value: value.into(),
                expires_at: None,
            },
        );
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    /// Checks if there are no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> BastionResult<Option<String>> {
        Ok(self.live(key).map(|e| e.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> BastionResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, keys: &[String]) -> BastionResult<u64> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let deleted = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|e| e.is_live(now))
            .count();
        Ok(deleted as u64)
    }

    async fn ttl(&self, key: &str) -> BastionResult<KeyTtl> {
        Ok(match self.live(key) {
            None => KeyTtl::Missing,
            Some(Entry { expires_at: None, .. }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at), ..
            }) => KeyTtl::Expires(at.saturating_duration_since(Instant::now())),
        })
    }

    async fn scan(&self, pattern: &str) -> BastionResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set("k", "v", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_nx_respects_live_keys_only() {
        let store = MemoryStore::new();
        assert!(store.set_nx("lock", "1", Duration::from_secs(5)).await.unwrap());
        assert!(!store.set_nx("lock", "2", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.set_nx("lock", "3", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_multi_key_delete() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::from_secs(60)).await.unwrap();
        store.set("b", "2", Duration::from_secs(60)).await.unwrap();

        let deleted = store
            .delete(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_inspection() {
        let store = MemoryStore::new();
        store.set("a", "1", Duration::from_secs(60)).await.unwrap();
        store.insert_persistent("b", "2");

        assert_eq!(store.ttl("a").await.unwrap(), KeyTtl::Expires(Duration::from_secs(60)));
        assert_eq!(store.ttl("b").await.unwrap(), KeyTtl::Persistent);
        assert_eq!(store.ttl("c").await.unwrap(), KeyTtl::Missing);
    }

    #[tokio::test]
    async fn test_scan() {
        let store = MemoryStore::new();
        store.insert_persistent("temp:1", "x");
        store.insert_persistent("temp:2", "x");
        store.insert_persistent("cache:user:1", "x");

        assert_eq!(store.scan("temp:*").await.unwrap(), vec!["temp:1", "temp:2"]);
    }
}
