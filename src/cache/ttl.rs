use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::CacheSettings;
use crate::error::{Result, SearchError};
use crate::metrics::CACHE_LOOKUPS_TOTAL;

/// TTL cache storing bincode-encoded values with single-flight loading.
///
/// A disabled cache computes every request. A failed computation is never
/// stored; every waiter of a coalesced load receives the same error.
#[derive(Clone)]
pub struct TtlCache<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    name: &'static str,
    cache: Option<Cache<K, Arc<Vec<u8>>>>,
}

impl<K> TtlCache<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            name,
            cache: Some(cache),
        }
    }

    pub fn disabled(name: &'static str) -> Self {
        Self { name, cache: None }
    }

    pub fn from_settings(name: &'static str, settings: &CacheSettings) -> Self {
        if settings.enabled {
            Self::new(name, settings.max_capacity, settings.ttl())
        } else {
            Self::disabled(name)
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    fn record(&self, outcome: &str) {
        CACHE_LOOKUPS_TOTAL
            .with_label_values(&[self.name, outcome])
            .inc();
    }

    fn encode<V: Serialize>(value: &V) -> Result<Arc<Vec<u8>>> {
        Ok(Arc::new(bincode::serialize(value)?))
    }

    fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Cached value for `key`; a corrupted entry is evicted and reported as absent
    pub async fn get<V: DeserializeOwned>(&self, key: &K) -> Option<V> {
        let cache = self.cache.as_ref()?;
        let bytes = cache.get(key).await?;
        match Self::decode(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(cache = self.name, error = %e, "Dropping corrupted cache entry");
                self.record("corrupt");
                cache.invalidate(key).await;
                None
            }
        }
    }

    pub async fn insert<V: Serialize>(&self, key: K, value: &V) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.insert(key, Self::encode(value)?).await;
        }
        Ok(())
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// With `skip_cache` the read is bypassed but the fresh value is still
    /// stored. Concurrent misses on one key share a single computation.
    pub async fn get_or_compute<V, F, Fut>(&self, key: K, skip_cache: bool, compute: F) -> Result<V>
    where
        V: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let Some(cache) = &self.cache else {
            return compute().await;
        };

        if skip_cache {
            self.record("skip");
            let value = compute().await?;
            cache.insert(key, Self::encode(&value)?).await;
            return Ok(value);
        }

        let loaded = AtomicBool::new(false);
        let bytes = cache
            .try_get_with(key.clone(), async {
                loaded.store(true, Ordering::Relaxed);
                let value = compute().await?;
                Self::encode(&value)
            })
            .await
            .map_err(|e: Arc<SearchError>| (*e).clone())?;

        if loaded.load(Ordering::Relaxed) {
            debug!(cache = self.name, "Cache miss");
            self.record("miss");
        } else {
            debug!(cache = self.name, "Cache hit");
            self.record("hit");
        }

        match Self::decode(&bytes) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(cache = self.name, error = %e, "Corrupted cache entry, recomputing");
                self.record("corrupt");
                cache.invalidate(&key).await;
                let value = compute().await?;
                cache.insert(key, Self::encode(&value)?).await;
                Ok(value)
            }
        }
    }

    pub async fn invalidate(&self, key: &K) {
        if let Some(cache) = &self.cache {
            cache.invalidate(key).await;
        }
    }

    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }

    pub async fn entry_count(&self) -> u64 {
        match &self.cache {
            Some(cache) => {
                cache.run_pending_tasks().await;
                cache.entry_count()
            }
            None => 0,
        }
    }
}
