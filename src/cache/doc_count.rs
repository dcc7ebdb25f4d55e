use std::sync::Arc;
use tracing::debug;

use crate::cache::TtlCache;
use crate::config::CacheSettings;
use crate::error::Result;
use crate::index::{IndexConvention, IndexEngine};
use crate::resilience::UpstreamPolicy;

/// Per-entity document counts, refreshed on TTL expiry or after a write
pub struct DocCountCache {
    engine: Arc<dyn IndexEngine>,
    convention: Arc<IndexConvention>,
    cache: TtlCache<String>,
    policy: UpstreamPolicy,
}

impl DocCountCache {
    pub fn new(
        engine: Arc<dyn IndexEngine>,
        convention: Arc<IndexConvention>,
        settings: &CacheSettings,
        policy: UpstreamPolicy,
    ) -> Self {
        Self {
            engine,
            convention,
            cache: TtlCache::from_settings("doc_count", settings),
            policy,
        }
    }

    /// Number of documents indexed for `entity`
    pub async fn count(&self, entity: &str) -> Result<u64> {
        let key = entity.to_lowercase();
        let index = self.convention.entity_index_name(&key);
        self.cache
            .get_or_compute(key, false, || {
                let index = index.clone();
                async move {
                    let count = self
                        .policy
                        .read("count", || self.engine.count(&index))
                        .await?;
                    debug!(index = %index, count, "Refreshed document count");
                    Ok(count)
                }
            })
            .await
    }

    /// Drop the cached count after a write to `entity`
    pub async fn invalidate(&self, entity: &str) {
        self.cache.invalidate(&entity.to_lowercase()).await;
    }
}
