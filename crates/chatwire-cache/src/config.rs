//! Per-method cache settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Size and age bounds for one method's cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries kept. 0 disables storage entirely.
    pub max_entries: usize,

    /// How long an entry stays valid after it was stored.
    pub max_age: Duration,
}

impl CacheConfig {
    pub fn new(max_entries: usize, max_age: Duration) -> Self {
        Self {
            max_entries,
            max_age,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10,
            max_age: Duration::from_secs(300),
        }
    }
}
