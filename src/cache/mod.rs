//! Cache Module
//!
//! The key/value cache port the core consumes, and an in-memory
//! implementation with per-key TTL.

mod entry;
mod memory;
mod stats;

#[cfg(test)]
mod property_tests;

use async_trait::async_trait;

use crate::error::Result;

// Re-export public types
pub use entry::CacheEntry;
pub use memory::{CacheStore, MemoryCache};
pub use stats::CacheStats;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB

// == Cache Port ==
/// Key/value store with per-key TTL.
///
/// Values are serialized JSON. Every write carries a TTL; there are no
/// permanent entries.
#[async_trait]
pub trait CachePort: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes every key matching a glob where `*` matches any run of
    /// characters. Returns the number of keys removed.
    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64>;
}

// == Pattern Matching ==
/// Glob match supporting `*` wildcards only.
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if key.len() < first.len() + last.len() || !key.starts_with(first) || !key.ends_with(last) {
        return false;
    }

    let mut rest = &key[first.len()..key.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    true
}
