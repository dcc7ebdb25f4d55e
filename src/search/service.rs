//! Main search service implementation

use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::cache::DocCountCache;
use crate::config::Config;
use crate::error::Result;
use crate::index::{IndexConvention, IndexEngine, IndexReader, IndexWriter};
use crate::metrics::record_search;
use crate::models::entity::EntityRegistry;
use crate::models::request::{LineageSearchRequest, SearchRequest};
use crate::models::result::{BrowseResult, LineageSearchResult, SearchResult};
use crate::query::{CompiledQuery, QueryCompiler};
use crate::resilience::{Upstream, UpstreamPolicy};
use crate::search::aggregator::{CachingEntitySearchAggregator, EntitySearchAggregator};
use crate::search::graph::GraphTraversal;
use crate::search::lineage::LineageSearchService;
use crate::search::ranker::{Ranker, SimpleRanker};

/// Entry point for entity search, lineage search and browse.
///
/// Every cache and collaborator is built once here and shared by handle.
pub struct SearchService {
    registry: Arc<EntityRegistry>,
    convention: Arc<IndexConvention>,
    compiler: Arc<QueryCompiler>,
    reader: IndexReader,
    writer: IndexWriter,
    aggregator: CachingEntitySearchAggregator,
    lineage: LineageSearchService,
}

impl SearchService {
    pub fn new(
        config: &Config,
        registry: Arc<EntityRegistry>,
        engine: Arc<dyn IndexEngine>,
        graph: Arc<dyn GraphTraversal>,
    ) -> Self {
        Self::with_ranker(config, registry, engine, graph, Arc::new(SimpleRanker))
    }

    pub fn with_ranker(
        config: &Config,
        registry: Arc<EntityRegistry>,
        engine: Arc<dyn IndexEngine>,
        graph: Arc<dyn GraphTraversal>,
        ranker: Arc<dyn Ranker>,
    ) -> Self {
        let convention = Arc::new(IndexConvention::new(config.index.prefix.as_deref()));
        let index_policy = UpstreamPolicy::new(Upstream::Index, &config.upstream);
        let graph_policy = UpstreamPolicy::new(Upstream::Graph, &config.upstream);
        let compiler = Arc::new(QueryCompiler::new(config.search.clone()));

        let doc_counts = Arc::new(DocCountCache::new(
            engine.clone(),
            convention.clone(),
            &config.cache.doc_count,
            index_policy.clone(),
        ));
        let reader = IndexReader::new(engine.clone(), convention.clone(), index_policy.clone());
        let writer = IndexWriter::new(engine.clone(), convention.clone(), index_policy)
            .with_doc_counts(doc_counts.clone());

        let aggregator = Arc::new(EntitySearchAggregator::new(
            registry.clone(),
            compiler.clone(),
            reader.clone(),
            doc_counts,
            ranker.clone(),
        ));
        let lineage = LineageSearchService::new(
            graph,
            aggregator.clone(),
            ranker,
            graph_policy,
            config.lineage.clone(),
            config.cache.lineage.clone(),
        );

        info!(
            engine = engine.name(),
            prefix = ?config.index.prefix,
            entities = registry.entity_names().len(),
            "Search service initialized"
        );

        Self {
            registry,
            convention,
            compiler,
            reader,
            writer,
            aggregator: CachingEntitySearchAggregator::new(aggregator, &config.cache.entity_search),
            lineage,
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn convention(&self) -> &IndexConvention {
        &self.convention
    }

    /// Writer whose writes refresh the document-count cache
    pub fn writer(&self) -> &IndexWriter {
        &self.writer
    }

    /// Search the given entity types; none means all
    pub async fn search(&self, entity_types: &[String], request: &SearchRequest) -> Result<SearchResult> {
        let started = Instant::now();
        let outcome = self.aggregator.search(entity_types, request).await;
        observe("entity", started, &outcome);
        outcome
    }

    /// Cursor-paged search over several entity types at once
    pub async fn scroll_across_entities(
        &self,
        entity_types: &[String],
        request: &SearchRequest,
    ) -> Result<SearchResult> {
        let started = Instant::now();
        let outcome = self
            .aggregator
            .inner()
            .scroll_across_entities(entity_types, request)
            .await;
        observe("scroll", started, &outcome);
        outcome
    }

    pub async fn search_across_lineage(
        &self,
        request: &LineageSearchRequest,
    ) -> Result<LineageSearchResult> {
        let started = Instant::now();
        let outcome = self.lineage.search_across_lineage(request).await;
        observe("lineage", started, &outcome);
        outcome
    }

    pub async fn browse(
        &self,
        entity: &str,
        path: &str,
        from: usize,
        size: usize,
    ) -> Result<BrowseResult> {
        let started = Instant::now();
        let outcome = match self.registry.require(entity) {
            Ok(spec) => self.reader.browse(&spec.name, path, from, size).await,
            Err(e) => Err(e),
        };
        observe("browse", started, &outcome);
        outcome
    }

    /// The query `request` compiles to for one entity type
    pub fn compile(&self, entity: &str, request: &SearchRequest) -> Result<CompiledQuery> {
        let spec = self.registry.require(entity)?;
        self.compiler.compile(&spec, request)
    }
}

fn observe<T>(kind: &str, started: Instant, outcome: &Result<T>) {
    if let Err(e) = outcome {
        error!(kind, error = %e, code = e.error_code(), "Search failed");
    }
    record_search(kind, started.elapsed().as_secs_f64(), outcome.is_ok());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::index::InMemoryIndexEngine;
    use crate::models::entity::{EntitySpec, FieldType, SearchableField};
    use crate::models::urn::Urn;
    use crate::search::graph::InMemoryGraph;
    use serde_json::json;

    fn service() -> SearchService {
        let registry = Arc::new(EntityRegistry::new(vec![EntitySpec::new(
            "dataset",
            vec![
                SearchableField::new("urn", FieldType::UrnPartial),
                SearchableField::new("name", FieldType::Text).boost(10.0),
                SearchableField::new("browsePaths", FieldType::BrowsePath),
            ],
        )]));
        SearchService::new(
            &Config::default(),
            registry,
            Arc::new(InMemoryIndexEngine::new()),
            Arc::new(InMemoryGraph::new()),
        )
    }

    #[tokio::test]
    async fn test_write_then_search_and_browse() {
        let service = service();
        let urn = Urn::new("urn:li:dataset:orders");
        service
            .writer()
            .upsert("dataset", &urn, json!({ "name": "orders", "browsePaths": ["/prod/hive"] }))
            .await
            .unwrap();

        let found = service
            .search(&["dataset".to_string()], &SearchRequest::new("orders"))
            .await
            .unwrap();
        assert_eq!(found.num_entities, 1);
        assert_eq!(found.entities[0].urn, urn);

        let browsed = service.browse("dataset", "/prod/hive", 0, 10).await.unwrap();
        assert_eq!(browsed.entities, vec![urn]);
    }

    #[tokio::test]
    async fn test_unknown_entity_rejected() {
        let service = service();
        assert!(matches!(
            service.compile("nope", &SearchRequest::default()),
            Err(SearchError::InvalidRequest(_))
        ));
        assert!(service.browse("nope", "/", 0, 10).await.is_err());
    }
}
