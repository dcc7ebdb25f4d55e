//! Shared doubles for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lineage_search::config::Config;
use lineage_search::error::{Result, SearchError};
use lineage_search::index::{EngineResponse, IndexEngine, InMemoryIndexEngine, WriteOperation};
use lineage_search::models::{
    EntityLineageResult, EntityRegistry, EntitySpec, FieldType, LineageRelationship, SearchableField,
    Urn,
};
use lineage_search::query::CompiledQuery;
use lineage_search::search::{GraphTraversal, LineageQuery, SearchService};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Take one pending failure, if any are left
fn take_failure(failures: &AtomicUsize) -> bool {
    failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Graph returning a fixed relationship list and counting calls
#[derive(Default)]
pub struct CountingGraph {
    relationships: Mutex<Vec<LineageRelationship>>,
    calls: AtomicUsize,
    failures: AtomicUsize,
}

impl CountingGraph {
    pub fn new(relationships: Vec<LineageRelationship>) -> Arc<Self> {
        Arc::new(Self {
            relationships: Mutex::new(relationships),
            calls: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        })
    }

    /// Fail the next `times` traversals
    pub fn fail_next(&self, times: usize) {
        self.failures.store(times, Ordering::SeqCst);
    }

    pub fn set(&self, relationships: Vec<LineageRelationship>) {
        *self.relationships.lock() = relationships;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GraphTraversal for CountingGraph {
    async fn get_lineage(&self, query: &LineageQuery) -> Result<EntityLineageResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures) {
            return Err(SearchError::GraphUnavailable("graph down".into()));
        }
        let relationships: Vec<LineageRelationship> = self
            .relationships
            .lock()
            .iter()
            .filter(|r| query.max_hops.map_or(true, |max| r.degree <= max))
            .cloned()
            .collect();
        Ok(EntityLineageResult::new(relationships))
    }
}

/// In-memory engine that counts searches
#[derive(Default)]
pub struct CountingEngine {
    inner: InMemoryIndexEngine,
    searches: AtomicUsize,
    failures: AtomicUsize,
}

impl CountingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    /// Fail the next `times` searches
    pub fn fail_next(&self, times: usize) {
        self.failures.store(times, Ordering::SeqCst);
    }
}

#[async_trait]
impl IndexEngine for CountingEngine {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn search(&self, indices: &[String], query: &CompiledQuery) -> Result<EngineResponse> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures) {
            return Err(SearchError::IndexUnavailable("index down".into()));
        }
        self.inner.search(indices, query).await
    }

    async fn count(&self, index: &str) -> Result<u64> {
        self.inner.count(index).await
    }

    async fn bulk_write(&self, operations: Vec<WriteOperation>) -> Result<()> {
        self.inner.bulk_write(operations).await
    }
}

pub fn dataset_urn(name: &str) -> Urn {
    Urn::new(format!(
        "urn:li:dataset:(urn:li:dataPlatform:hive,{},PROD)",
        name
    ))
}

pub fn registry() -> Arc<EntityRegistry> {
    let fields = || {
        vec![
            SearchableField::new("urn", FieldType::UrnPartial).boost(10.0),
            SearchableField::new("name", FieldType::TextPartial).boost(10.0),
            SearchableField::new("textFieldOverride", FieldType::Text),
            SearchableField::new("platform", FieldType::Keyword).filterable(),
            SearchableField::new("tags", FieldType::UrnPartial)
                .filterable()
                .edited_as("editedTags"),
            SearchableField::new("upstreams", FieldType::UrnPartial).lineage(),
            SearchableField::new("removed", FieldType::Boolean),
        ]
    };
    Arc::new(EntityRegistry::new(vec![
        EntitySpec::new("dataset", fields()),
        EntitySpec::new("chart", fields()),
    ]))
}

/// Config with the given lightning threshold
pub fn config(lightning_threshold: i64) -> Config {
    let mut config = Config::default();
    config.cache.lineage.lightning_threshold = lightning_threshold;
    config
}

pub fn service(
    config: &Config,
    engine: Arc<CountingEngine>,
    graph: Arc<CountingGraph>,
) -> SearchService {
    SearchService::new(config, registry(), engine, graph)
}
