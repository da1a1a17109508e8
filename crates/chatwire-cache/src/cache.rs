//! The per-method registry of caches.

use std::collections::HashMap;

use serde_json::Value;
use tokio::time::Instant;

use crate::{CacheConfig, ExpiringLru};

/// A set of independent caches, one per remote method name.
///
/// `MethodCache` is a plain data structure; it never calls the server
/// itself. The driver looks a key up, calls the transport on a miss, and
/// inserts the result only when the call succeeded, so a failed lookup
/// can't poison later attempts.
#[derive(Debug, Default)]
pub struct MethodCache {
    caches: HashMap<String, ExpiringLru>,
}

impl MethodCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables caching for `method`.
    ///
    /// Calling it again for the same method replaces the old cache (and
    /// drops its entries) with a fresh one using the new settings.
    pub fn create(&mut self, method: &str, config: CacheConfig) {
        if self
            .caches
            .insert(method.to_string(), ExpiringLru::new(config))
            .is_some()
        {
            tracing::debug!(method, "method cache re-created");
        } else {
            tracing::debug!(
                method,
                max_entries = config.max_entries,
                max_age_ms = config.max_age.as_millis() as u64,
                "method cache created"
            );
        }
    }

    /// Returns `true` if `method` has a cache.
    pub fn has(&self, method: &str) -> bool {
        self.caches.contains_key(method)
    }

    /// Looks up a live entry.
    pub fn get(&mut self, method: &str, key: &str) -> Option<Value> {
        let hit = self.caches.get_mut(method)?.get(key, Instant::now());
        if hit.is_some() {
            tracing::trace!(method, key, "method cache hit");
        }
        hit
    }

    /// Stores a result. Returns `false` if `method` has no cache.
    pub fn insert(&mut self, method: &str, key: &str, value: Value) -> bool {
        let Some(cache) = self.caches.get_mut(method) else {
            return false;
        };
        if let Some(evicted) = cache.insert(key, value, Instant::now()) {
            tracing::trace!(method, %evicted, "method cache evicted entry");
        }
        true
    }

    /// Drops one key, or every entry of `method` when `key` is `None`.
    pub fn reset(&mut self, method: &str, key: Option<&str>) {
        let Some(cache) = self.caches.get_mut(method) else {
            return;
        };
        match key {
            Some(key) => {
                cache.remove(key);
            }
            None => cache.clear(),
        }
    }

    /// Empties every cache but keeps them registered.
    pub fn reset_all(&mut self) {
        for cache in self.caches.values_mut() {
            cache.clear();
        }
    }

    /// Number of entries held for `method` (0 if not registered).
    pub fn len(&self, method: &str) -> usize {
        self.caches.get(method).map_or(0, ExpiringLru::len)
    }
}
