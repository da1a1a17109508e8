//! Integration tests for `MethodCache`.
//!
//! Uses `tokio::time::pause()` (through `start_paused`) so `max_age` can be
//! crossed with `advance` instead of real sleeps.

use std::time::Duration;

use chatwire_cache::{CacheConfig, MethodCache};
use serde_json::json;

const ROOM_ID: &str = "getRoomIdByNameOrId";

fn cache_with_room_method(max_entries: usize, max_age: Duration) -> MethodCache {
    let mut cache = MethodCache::new();
    cache.create(ROOM_ID, CacheConfig::new(max_entries, max_age));
    cache
}

#[test]
fn test_has_reports_only_registered_methods() {
    let cache = cache_with_room_method(10, Duration::from_secs(60));
    assert!(cache.has(ROOM_ID));
    assert!(!cache.has("sendMessage"));
}

#[test]
fn test_insert_unregistered_method_is_ignored() {
    let mut cache = MethodCache::new();
    assert!(!cache.insert("sendMessage", "x", json!(1)));
    assert!(cache.get("sendMessage", "x").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_get_within_max_age_then_expired_after() {
    let mut cache = cache_with_room_method(10, Duration::from_millis(500));
    cache.insert(ROOM_ID, "general", json!("GENERAL"));

    tokio::time::advance(Duration::from_millis(400)).await;
    assert_eq!(cache.get(ROOM_ID, "general"), Some(json!("GENERAL")));

    tokio::time::advance(Duration::from_millis(200)).await;
    assert!(cache.get(ROOM_ID, "general").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_reads_do_not_extend_max_age() {
    let mut cache = cache_with_room_method(10, Duration::from_millis(500));
    cache.insert(ROOM_ID, "general", json!("GENERAL"));

    for _ in 0..4 {
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(cache.get(ROOM_ID, "general").is_some());
    }
    tokio::time::advance(Duration::from_millis(150)).await;

    assert!(cache.get(ROOM_ID, "general").is_none());
}

#[test]
fn test_n_plus_one_keys_evicts_exactly_the_lru_entry() {
    let mut cache = cache_with_room_method(3, Duration::from_secs(60));
    cache.insert(ROOM_ID, "a", json!("A"));
    cache.insert(ROOM_ID, "b", json!("B"));
    cache.insert(ROOM_ID, "c", json!("C"));
    // Touch in the order c, a → b is now least recently used.
    cache.get(ROOM_ID, "c");
    cache.get(ROOM_ID, "a");

    cache.insert(ROOM_ID, "d", json!("D"));

    assert_eq!(cache.len(ROOM_ID), 3);
    assert!(cache.get(ROOM_ID, "b").is_none(), "b was least recently used");
    assert!(cache.get(ROOM_ID, "a").is_some());
    assert!(cache.get(ROOM_ID, "c").is_some());
    assert!(cache.get(ROOM_ID, "d").is_some());
}

#[test]
fn test_methods_are_cached_independently() {
    let mut cache = cache_with_room_method(1, Duration::from_secs(60));
    cache.create("createDirectMessage", CacheConfig::new(1, Duration::from_secs(60)));

    cache.insert(ROOM_ID, "alice", json!("room-id"));
    cache.insert("createDirectMessage", "alice", json!({ "rid": "dm" }));

    assert_eq!(cache.get(ROOM_ID, "alice"), Some(json!("room-id")));
    assert_eq!(
        cache.get("createDirectMessage", "alice"),
        Some(json!({ "rid": "dm" }))
    );
}

#[test]
fn test_reset_single_key_and_whole_method() {
    let mut cache = cache_with_room_method(10, Duration::from_secs(60));
    cache.insert(ROOM_ID, "a", json!(1));
    cache.insert(ROOM_ID, "b", json!(2));

    cache.reset(ROOM_ID, Some("a"));
    assert!(cache.get(ROOM_ID, "a").is_none());
    assert!(cache.get(ROOM_ID, "b").is_some());

    cache.reset(ROOM_ID, None);
    assert_eq!(cache.len(ROOM_ID), 0);
    assert!(cache.has(ROOM_ID), "reset keeps the method registered");
}

#[test]
fn test_reset_all_empties_every_method() {
    let mut cache = cache_with_room_method(10, Duration::from_secs(60));
    cache.create("getRoomNameById", CacheConfig::default());
    cache.insert(ROOM_ID, "a", json!(1));
    cache.insert("getRoomNameById", "a", json!("general"));

    cache.reset_all();

    assert_eq!(cache.len(ROOM_ID), 0);
    assert_eq!(cache.len("getRoomNameById"), 0);
}

#[test]
fn test_create_again_replaces_entries() {
    let mut cache = cache_with_room_method(10, Duration::from_secs(60));
    cache.insert(ROOM_ID, "a", json!(1));

    cache.create(ROOM_ID, CacheConfig::new(5, Duration::from_secs(5)));

    assert_eq!(cache.len(ROOM_ID), 0);
}
