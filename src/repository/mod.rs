//! Repository Module
//!
//! Cache-aware CRUD over one entity type. The entity store is the source of
//! truth; the cache is advisory, so cache failures are logged and never fail
//! an operation.

mod keys;

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CachePort;
use crate::error::{DataError, Result};
use crate::executor::RetryPolicy;
use crate::store::{Entity, EntityStore, FindOptions};
use crate::validation::Validator;

pub use keys::{entity_key, list_key, list_pattern, named_list_key};

// == Repository Config ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// TTL in seconds for cached records and lists
    pub cache_ttl: u64,
    /// Policy for direct store calls
    pub store_retry: RetryPolicy,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl: 300,
            store_retry: RetryPolicy::single(),
        }
    }
}

// == Repository ==
pub struct Repository<E: Entity> {
    store: Arc<dyn EntityStore<E>>,
    cache: Arc<dyn CachePort>,
    validator: Validator,
    config: RepositoryConfig,
}

impl<E: Entity> Repository<E> {
    pub fn new(
        store: Arc<dyn EntityStore<E>>,
        cache: Arc<dyn CachePort>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            store,
            cache,
            validator: Validator::new(E::meta()),
            config,
        }
    }

    // == Find By Id ==
    /// Returns the record, serving it from cache when possible.
    pub async fn find_by_id_cached(&self, id: &str) -> Result<E> {
        let key = entity_key(E::meta(), id);
        if let Some(entity) = self.cache_get::<E>(&key).await {
            debug!("Cache hit: {}", key);
            return Ok(entity);
        }

        let entity = self.load(id).await?;
        self.cache_put(&key, &entity).await;
        Ok(entity)
    }

    // == Create ==
    /// Validates and persists a new record, assigning an id when absent.
    pub async fn create_entity(&self, mut data: Map<String, Value>) -> Result<E> {
        self.validator
            .validate(&data)
            .map_err(DataError::Validation)?;

        let id_field = E::meta().id_field;
        if data.get(id_field).map_or(true, Value::is_null) {
            data.insert(id_field.to_string(), Value::String(Uuid::new_v4().to_string()));
        }

        let entity: E = serde_json::from_value(Value::Object(data))?;
        let saved = self
            .config
            .store_retry
            .run("save", || self.store.save(&entity))
            .await?;

        self.invalidate_lists().await;
        debug!("Created {} {}", E::meta().name, saved.id());
        Ok(saved)
    }

    // == Update ==
    /// Merges `data` into the stored record, validates the result and saves it.
    ///
    /// The identity field is never overwritten.
    pub async fn update_entity(&self, id: &str, data: Map<String, Value>) -> Result<E> {
        let current = self.load(id).await?;
        let meta = E::meta();

        let mut merged = match serde_json::to_value(&current)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (field, value) in data {
            if field != meta.id_field {
                merged.insert(field, value);
            }
        }

        self.validator
            .validate(&merged)
            .map_err(DataError::Validation)?;

        let entity: E = serde_json::from_value(Value::Object(merged))?;
        let saved = self
            .config
            .store_retry
            .run("save", || self.store.save(&entity))
            .await?;

        self.invalidate(id).await;
        Ok(saved)
    }

    // == Delete ==
    pub async fn delete_entity(&self, id: &str) -> Result<()> {
        let current = self.load(id).await?;
        self.config
            .store_retry
            .run("remove", || self.store.remove(&current))
            .await?;

        self.invalidate(id).await;
        debug!("Deleted {} {}", E::meta().name, id);
        Ok(())
    }

    // == Find With Cache ==
    /// Lists records, caching the result under `cache_key` or a key derived
    /// from `options`.
    pub async fn find_with_cache(
        &self,
        options: &FindOptions,
        cache_key: Option<&str>,
    ) -> Result<Vec<E>> {
        let key = match cache_key {
            Some(name) => named_list_key(E::meta(), name),
            None => list_key(E::meta(), options),
        };
        if let Some(list) = self.cache_get::<Vec<E>>(&key).await {
            debug!("Cache hit: {}", key);
            return Ok(list);
        }

        let list = self
            .config
            .store_retry
            .run("find", || self.store.find(options))
            .await?;
        self.cache_put(&key, &list).await;
        Ok(list)
    }

    /// Uncached load that fails with `NotFound`.
    async fn load(&self, id: &str) -> Result<E> {
        self.config
            .store_retry
            .run("find_one", || self.store.find_one(id))
            .await?
            .ok_or_else(|| DataError::NotFound(format!("{} {}", E::meta().name, id)))
    }

    // == Cache Helpers ==
    async fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    if let Err(e) = self.cache.delete(key).await {
                        warn!("Cache delete failed for {}: {}", key, e);
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn cache_put<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to encode cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.cache.set(key, raw, self.config.cache_ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    async fn invalidate(&self, id: &str) {
        let key = entity_key(E::meta(), id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!("Cache delete failed for {}: {}", key, e);
        }
        self.invalidate_lists().await;
    }

    async fn invalidate_lists(&self) {
        let pattern = list_pattern(E::meta());
        match self.cache.delete_by_pattern(&pattern).await {
            Ok(removed) => debug!("Invalidated {} cached list(s) for {}", removed, pattern),
            Err(e) => warn!("Cache pattern delete failed for {}: {}", pattern, e),
        }
    }
}
