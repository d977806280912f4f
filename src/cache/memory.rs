//! In-Memory Cache Module
//!
//! HashMap-backed cache with per-key TTL, implementing `CachePort`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::{pattern_matches, CacheEntry, CachePort, CacheStats, MAX_KEY_LENGTH, MAX_VALUE_SIZE};
use crate::error::{DataError, Result};

// == Cache Store ==
/// Synchronous cache core: entries plus statistics.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    // == Set ==
    /// Stores a value, overwriting any previous entry and resetting its TTL.
    pub fn set(&mut self, key: String, value: String, ttl_secs: u64) -> Result<()> {
        if key.is_empty() || key.len() > MAX_KEY_LENGTH {
            return Err(DataError::Cache(format!(
                "Key must be 1..={} bytes",
                MAX_KEY_LENGTH
            )));
        }
        if value.len() > MAX_VALUE_SIZE {
            return Err(DataError::Cache(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            )));
        }
        if ttl_secs == 0 {
            return Err(DataError::Cache("TTL must be positive".to_string()));
        }

        self.entries.insert(key, CacheEntry::new(value, ttl_secs));
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    // == Get ==
    /// Returns the live value for `key`. Expired entries are removed.
    pub fn get(&mut self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired() => {
                self.entries.remove(key);
                self.stats.record_expiration();
                self.stats.record_miss();
                self.stats.set_total_entries(self.entries.len());
                None
            }
            Some(entry) => {
                self.stats.record_hit();
                Some(entry.value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes `key`, returning whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    // == Delete By Pattern ==
    /// Removes every key matching the glob `pattern`.
    pub fn delete_by_pattern(&mut self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern_matches(pattern, key));
        self.stats.set_total_entries(self.entries.len());
        before - self.entries.len()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before - self.entries.len();
        for _ in 0..removed {
            self.stats.record_expiration();
        }
        self.stats.set_total_entries(self.entries.len());
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| !e.is_expired())
    }
}

// == Memory Cache ==
/// Shareable async wrapper around a `CacheStore`.
#[derive(Debug, Default)]
pub struct MemoryCache {
    store: RwLock<CacheStore>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.store.read().await.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.store.write().await.cleanup_expired()
    }

    /// Drops every entry; the cache is advisory so nothing is lost.
    pub async fn clear(&self) {
        *self.store.write().await = CacheStore::new();
    }
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        // Write lock: lookups update stats and drop expired entries
        Ok(self.store.write().await.get(key))
    }

    async fn set(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        self.store.write().await.set(key.to_string(), value, ttl_secs)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.write().await.delete(key);
        Ok(())
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<u64> {
        Ok(self.store.write().await.delete_by_pattern(pattern) as u64)
    }
}
