//! A bounded LRU map whose entries also expire with age.
//!
//! Recency and eviction come from [`lru::LruCache`]. On top of it every
//! entry remembers when it was stored, reads treat an entry past
//! `max_age` as absent and pop it, and a full map purges stale entries
//! before giving up a live one.

use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use serde_json::Value;
use tokio::time::Instant;

use crate::CacheConfig;

/// One cached result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached method result.
    pub value: Value,
    /// When the entry was stored. Reads don't refresh it.
    pub created_at: Instant,
}

impl CacheEntry {
    fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > max_age
    }
}

/// An LRU map with per-entry time-to-live.
///
/// All operations take `now` explicitly so the policy can be tested with
/// fixed instants. A `max_entries` of zero leaves the map without storage:
/// inserts are ignored and every read misses.
#[derive(Debug)]
pub struct ExpiringLru {
    config: CacheConfig,
    entries: Option<LruCache<String, CacheEntry>>,
}

impl ExpiringLru {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: NonZeroUsize::new(config.max_entries).map(LruCache::new),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the value for `key` if present and not stale.
    ///
    /// A hit counts as a use for LRU purposes. A stale entry is removed.
    pub fn get(&mut self, key: &str, now: Instant) -> Option<Value> {
        let max_age = self.config.max_age;
        let entries = self.entries.as_mut()?;
        let entry = entries.get(key)?;
        if !entry.is_stale(now, max_age) {
            return Some(entry.value.clone());
        }
        entries.pop(key);
        None
    }

    /// Stores `value` under `key`, evicting if the map is full.
    ///
    /// Returns the key that was evicted to make room, if any. Stale
    /// entries are dropped first, so a live entry only goes when every
    /// slot holds a live one.
    pub fn insert(&mut self, key: &str, value: Value, now: Instant) -> Option<String> {
        let max_age = self.config.max_age;
        let entries = self.entries.as_mut()?;

        if !entries.contains(key) && entries.len() >= entries.cap().get() {
            purge_stale(entries, now, max_age);
        }

        let entry = CacheEntry {
            value,
            created_at: now,
        };
        match entries.push(key.to_string(), entry) {
            // `push` also hands back the old value when the key was already there.
            Some((evicted, _)) if evicted != key => Some(evicted),
            _ => None,
        }
    }

    /// Drops one key. Returns `true` if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries
            .as_mut()
            .is_some_and(|entries| entries.pop(key).is_some())
    }

    pub fn clear(&mut self) {
        if let Some(entries) = self.entries.as_mut() {
            entries.clear();
        }
    }

    /// Number of stored entries, stale ones included until touched.
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn purge_stale(entries: &mut LruCache<String, CacheEntry>, now: Instant, max_age: Duration) {
    let stale: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| entry.is_stale(now, max_age))
        .map(|(key, _)| key.clone())
        .collect();
    for key in stale {
        entries.pop(&key);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn lru(max_entries: usize, max_age_secs: u64) -> ExpiringLru {
        ExpiringLru::new(CacheConfig::new(
            max_entries,
            Duration::from_secs(max_age_secs),
        ))
    }

    #[test]
    fn test_get_missing_returns_none() {
        let mut cache = lru(2, 60);
        assert!(cache.get("nope", Instant::now()).is_none());
    }

    #[test]
    fn test_get_within_max_age_returns_value() {
        let mut cache = lru(2, 60);
        let t0 = Instant::now();
        cache.insert("general", json!("GENERAL"), t0);

        let hit = cache.get("general", t0 + Duration::from_secs(59));

        assert_eq!(hit, Some(json!("GENERAL")));
    }

    #[test]
    fn test_get_after_max_age_returns_none_and_removes() {
        let mut cache = lru(2, 60);
        let t0 = Instant::now();
        cache.insert("general", json!("GENERAL"), t0);

        let hit = cache.get("general", t0 + Duration::from_secs(61));

        assert!(hit.is_none());
        assert!(cache.is_empty(), "stale entry should be dropped on read");
    }

    #[test]
    fn test_insert_past_capacity_evicts_least_recently_used() {
        let mut cache = lru(2, 60);
        let t0 = Instant::now();
        cache.insert("a", json!(1), t0);
        cache.insert("b", json!(2), t0);
        // Reading "a" makes "b" the least recently used.
        cache.get("a", t0);

        let evicted = cache.insert("c", json!(3), t0);

        assert_eq!(evicted.as_deref(), Some("b"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a", t0).is_some());
        assert!(cache.get("c", t0).is_some());
    }

    #[test]
    fn test_insert_past_capacity_prefers_purging_stale_entries() {
        let mut cache = lru(2, 10);
        let t0 = Instant::now();
        cache.insert("old", json!(1), t0);
        let t1 = t0 + Duration::from_secs(5);
        cache.insert("fresh", json!(2), t1);
        cache.get("old", t1);

        // "old" is now stale, so it goes even though it was used last.
        let evicted = cache.insert("new", json!(3), t0 + Duration::from_secs(11));

        assert!(evicted.is_none(), "no live entry had to be evicted");
        assert_eq!(cache.len(), 2);
        assert!(cache.get("fresh", t0 + Duration::from_secs(11)).is_some());
    }

    #[test]
    fn test_insert_existing_key_replaces_without_eviction() {
        let mut cache = lru(1, 60);
        let t0 = Instant::now();
        cache.insert("a", json!(1), t0);

        let evicted = cache.insert("a", json!(2), t0);

        assert!(evicted.is_none());
        assert_eq!(cache.get("a", t0), Some(json!(2)));
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = lru(0, 60);
        let t0 = Instant::now();
        cache.insert("a", json!(1), t0);
        assert!(cache.is_empty());
        assert!(cache.get("a", t0).is_none());
    }
}
