//! Method-result cache for chatwire.
//!
//! Some remote methods are called over and over with the same argument and
//! return the same answer: "what is the id of room `general`?", "give me
//! the DM room with `alice`". [`MethodCache`] remembers those answers.
//!
//! # Rules
//!
//! - Only methods registered with [`MethodCache::create`] are cached, each
//!   with its own [`CacheConfig`].
//! - Entries are keyed by the call's single string argument. Calls with
//!   zero or several arguments are never cached (the driver decides that
//!   before it ever reaches this crate).
//! - An entry older than `max_age` is treated as absent.
//! - Inserting past `max_entries` evicts the least-recently-used entry.
//! - Failures are never stored: the caller only inserts successful results.
//!
//! Time comes from `tokio::time::Instant`, so tests can pause and advance
//! the clock instead of sleeping.

mod cache;
mod config;
mod expiring;

pub use cache::MethodCache;
pub use config::CacheConfig;
pub use expiring::{CacheEntry, ExpiringLru};
