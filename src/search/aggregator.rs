use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{DocCountCache, EntitySearchKey, TtlCache};
use crate::config::CacheSettings;
use crate::error::Result;
use crate::index::{compare_tuples, IndexReader};
use crate::models::entity::{EntityRegistry, EntitySpec};
use crate::models::request::{Page, SearchRequest};
use crate::models::result::{merge_facets, FacetMetadata, SearchEntity, SearchResult};
use crate::query::{CompiledQuery, QueryCompiler};
use crate::search::ranker::Ranker;

/// Facet holding per-entity-type totals of a multi-entity search
pub const ENTITY_FACET: &str = "entity";

/// Fans one request out to every entity index and merges the hits
pub struct EntitySearchAggregator {
    registry: Arc<EntityRegistry>,
    compiler: Arc<QueryCompiler>,
    reader: IndexReader,
    doc_counts: Arc<DocCountCache>,
    ranker: Arc<dyn Ranker>,
}

impl EntitySearchAggregator {
    pub fn new(
        registry: Arc<EntityRegistry>,
        compiler: Arc<QueryCompiler>,
        reader: IndexReader,
        doc_counts: Arc<DocCountCache>,
        ranker: Arc<dyn Ranker>,
    ) -> Self {
        Self {
            registry,
            compiler,
            reader,
            doc_counts,
            ranker,
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn compiler(&self) -> &QueryCompiler {
        &self.compiler
    }

    /// Specs for the requested types; no types means every registered type
    pub fn resolve_types(&self, entity_types: &[String]) -> Result<Vec<Arc<EntitySpec>>> {
        if entity_types.is_empty() {
            return self
                .registry
                .entity_names()
                .iter()
                .map(|name| self.registry.require(name))
                .collect();
        }
        let mut specs: Vec<Arc<EntitySpec>> = Vec::with_capacity(entity_types.len());
        for name in entity_types {
            let spec = self.registry.require(name)?;
            if !specs.iter().any(|known| known.name == spec.name) {
                specs.push(spec);
            }
        }
        Ok(specs)
    }

    /// Requested types whose index holds at least one document, counted concurrently
    pub async fn populated_types(&self, entity_types: &[String]) -> Result<Vec<Arc<EntitySpec>>> {
        let specs = self.resolve_types(entity_types)?;
        let counts = try_join_all(specs.iter().map(|spec| self.doc_counts.count(&spec.name))).await?;
        Ok(specs
            .into_iter()
            .zip(counts)
            .filter_map(|(spec, count)| {
                if count == 0 {
                    debug!(entity = %spec.name, "Skipping empty entity index");
                    None
                } else {
                    Some(spec)
                }
            })
            .collect())
    }

    /// Search one or more entity types.
    ///
    /// Scroll pages are served by [`Self::scroll_across_entities`].
    pub async fn search(&self, entity_types: &[String], request: &SearchRequest) -> Result<SearchResult> {
        request.validate(self.compiler.config().max_page_size)?;
        if matches!(request.page, Page::Scroll { .. }) {
            return self.scroll_across_entities(entity_types, request).await;
        }

        let from = request.page.from();
        let size = request.page.size();
        let specs = self.populated_types(entity_types).await?;
        match specs.as_slice() {
            [] => Ok(SearchResult::empty(from, size)),
            [spec] => self.search_entity(spec, request.clone()).await,
            _ => self.search_many(&specs, request, from, size).await,
        }
    }

    async fn search_entity(&self, spec: &EntitySpec, request: SearchRequest) -> Result<SearchResult> {
        let query = self.compiler.compile(spec, &request)?;
        let index = self.reader.convention().entity_index_name(&spec.name);
        self.reader.search(&[index], query, &request).await
    }

    /// Query every type for the window `[0, from + size)`, then order and slice the union.
    ///
    /// Without an explicit sort the union is ranked; with one the per-type pages
    /// are merged on their sort tuples so the requested order holds across types.
    async fn search_many(
        &self,
        specs: &[Arc<EntitySpec>],
        request: &SearchRequest,
        from: usize,
        size: usize,
    ) -> Result<SearchResult> {
        let window = from
            .saturating_add(size)
            .min(self.compiler.config().max_page_size);
        let per_entity = request.clone().with_page(0, window);

        let pages = try_join_all(
            specs
                .iter()
                .map(|spec| self.search_entity_keyed(spec, per_entity.clone())),
        )
        .await?;

        let mut num_entities = 0;
        let mut by_entity: BTreeMap<String, u64> = BTreeMap::new();
        let mut keyed: Vec<(Vec<serde_json::Value>, SearchEntity)> = Vec::new();
        let mut facet_lists = Vec::with_capacity(pages.len());
        for (spec, (result, sort_keys)) in specs.iter().zip(pages) {
            num_entities += result.num_entities;
            by_entity.insert(spec.name.clone(), result.num_entities);
            keyed.extend(sort_keys.into_iter().zip(result.entities));
            facet_lists.push(result.facets);
        }

        let mut facets = merge_facets(facet_lists);
        if !request.flags.skip_aggregates {
            facets.push(FacetMetadata::new(ENTITY_FACET, by_entity));
        }

        let ordered: Vec<SearchEntity> = if request.sort.is_empty() {
            self.ranker
                .rank(keyed.into_iter().map(|(_, entity)| entity).collect())
        } else {
            let clauses = self.compiler.sort(request);
            keyed.sort_by(|a, b| compare_tuples(&a.0, &b.0, &clauses));
            keyed.into_iter().map(|(_, entity)| entity).collect()
        };

        debug!(
            entity_types = specs.len(),
            num_entities,
            sorted = !request.sort.is_empty(),
            "Merged multi-entity search"
        );

        Ok(SearchResult {
            num_entities,
            from,
            page_size: size,
            entities: ordered.into_iter().skip(from).take(size).collect(),
            facets,
            scroll_id: None,
        })
    }

    async fn search_entity_keyed(
        &self,
        spec: &EntitySpec,
        request: SearchRequest,
    ) -> Result<(SearchResult, Vec<Vec<serde_json::Value>>)> {
        let query = self.compiler.compile(spec, &request)?;
        let index = self.reader.convention().entity_index_name(&spec.name);
        self.reader.search_with_sort_keys(&[index], query, &request).await
    }

    /// One cursor-paged query over every populated index, using the union of their specs
    pub async fn scroll_across_entities(
        &self,
        entity_types: &[String],
        request: &SearchRequest,
    ) -> Result<SearchResult> {
        request.validate(self.compiler.config().max_page_size)?;
        let specs = self.populated_types(entity_types).await?;
        if specs.is_empty() {
            return Ok(SearchResult::empty(0, request.page.size()));
        }

        let query = self.compile_across(&specs, request)?;
        let indices: Vec<String> = specs
            .iter()
            .map(|spec| self.reader.convention().entity_index_name(&spec.name))
            .collect();
        self.reader.search(&indices, query, request).await
    }

    fn compile_across(&self, specs: &[Arc<EntitySpec>], request: &SearchRequest) -> Result<CompiledQuery> {
        match specs {
            [spec] => self.compiler.compile(spec, request),
            _ => {
                let merged = EntitySpec::merged("merged", specs);
                self.compiler.compile(&merged, request)
            }
        }
    }
}

/// [`EntitySearchAggregator`] behind a TTL result cache.
///
/// Scroll pages always go to the index since their cursor is single use.
pub struct CachingEntitySearchAggregator {
    inner: Arc<EntitySearchAggregator>,
    cache: TtlCache<EntitySearchKey>,
}

impl CachingEntitySearchAggregator {
    pub fn new(inner: Arc<EntitySearchAggregator>, settings: &CacheSettings) -> Self {
        Self {
            inner,
            cache: TtlCache::from_settings("entity_search", settings),
        }
    }

    pub fn inner(&self) -> &Arc<EntitySearchAggregator> {
        &self.inner
    }

    pub async fn search(&self, entity_types: &[String], request: &SearchRequest) -> Result<SearchResult> {
        request.validate(self.inner.compiler().config().max_page_size)?;
        if matches!(request.page, Page::Scroll { .. }) {
            return self.inner.scroll_across_entities(entity_types, request).await;
        }

        let key = EntitySearchKey::new(entity_types, request);
        self.cache
            .get_or_compute(key, request.flags.skip_cache, || {
                self.inner.search(entity_types, request)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SearchConfig, UpstreamConfig};
    use crate::error::SearchError;
    use crate::index::{IndexConvention, IndexEngine, InMemoryIndexEngine, WriteOperation};
    use crate::models::entity::{FieldType, SearchableField};
    use crate::models::urn::Urn;
    use crate::resilience::{Upstream, UpstreamPolicy};
    use crate::search::ranker::SimpleRanker;
    use serde_json::json;

    fn registry() -> Arc<EntityRegistry> {
        let fields = || {
            vec![
                SearchableField::new("urn", FieldType::UrnPartial),
                SearchableField::new("name", FieldType::Text).boost(10.0),
                SearchableField::new("platform", FieldType::Keyword).filterable(),
            ]
        };
        Arc::new(EntityRegistry::new(vec![
            EntitySpec::new("dataset", fields()),
            EntitySpec::new("chart", fields()),
            EntitySpec::new("dashboard", fields()),
        ]))
    }

    async fn setup() -> (Arc<EntitySearchAggregator>, Arc<InMemoryIndexEngine>) {
        let engine = Arc::new(InMemoryIndexEngine::new());
        let docs = [
            ("dataset_index_v2", "urn:li:dataset:orders", "orders", "hive"),
            ("dataset_index_v2", "urn:li:dataset:orders_daily", "orders daily", "hive"),
            ("chart_index_v2", "urn:li:chart:orders_chart", "orders", "looker"),
        ];
        engine
            .bulk_write(
                docs.iter()
                    .map(|(index, urn, name, platform)| WriteOperation::Upsert {
                        index: index.to_string(),
                        id: urn.to_string(),
                        document: json!({ "urn": urn, "name": name, "platform": platform }),
                    })
                    .collect(),
            )
            .await
            .unwrap();

        let convention = Arc::new(IndexConvention::new(None));
        let policy = UpstreamPolicy::new(Upstream::Index, &UpstreamConfig::default());
        let doc_counts = Arc::new(DocCountCache::new(
            engine.clone(),
            convention.clone(),
            &CacheSettings::default(),
            policy.clone(),
        ));
        let aggregator = EntitySearchAggregator::new(
            registry(),
            Arc::new(QueryCompiler::new(SearchConfig::default())),
            IndexReader::new(engine.clone(), convention, policy),
            doc_counts,
            Arc::new(SimpleRanker),
        );
        (Arc::new(aggregator), engine)
    }

    #[tokio::test]
    async fn test_all_types_merge_and_sum_totals() {
        let (aggregator, _) = setup().await;
        let result = aggregator
            .search(&[], &SearchRequest::new("orders").with_page(0, 10))
            .await
            .unwrap();

        assert_eq!(result.num_entities, 3);
        assert_eq!(result.entities.len(), 3);
        let entity_facet = result.facet(ENTITY_FACET).unwrap();
        assert_eq!(entity_facet.count_of("dataset"), Some(2));
        assert_eq!(entity_facet.count_of("chart"), Some(1));
        assert_eq!(entity_facet.count_of("dashboard"), None);
        assert!(result.entities.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_page_slices_merged_window() {
        let (aggregator, _) = setup().await;
        let types = vec!["dataset".to_string(), "chart".to_string()];
        let first = aggregator
            .search(&types, &SearchRequest::new("*").with_page(0, 2))
            .await
            .unwrap();
        let second = aggregator
            .search(&types, &SearchRequest::new("*").with_page(2, 2))
            .await
            .unwrap();

        assert_eq!(first.num_entities, 3);
        assert_eq!(first.entities.len(), 2);
        assert_eq!(second.entities.len(), 1);
        assert!(!first.entities.iter().any(|e| e.urn == second.entities[0].urn));
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let (aggregator, _) = setup().await;
        let result = aggregator
            .search(&["nope".to_string()], &SearchRequest::new("x"))
            .await;
        assert!(matches!(result, Err(SearchError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_empty_indices_yield_empty_result() {
        let (aggregator, _) = setup().await;
        let result = aggregator
            .search(&["dashboard".to_string()], &SearchRequest::new("orders"))
            .await
            .unwrap();
        assert_eq!(result.num_entities, 0);
        assert!(result.entities.is_empty());
    }

    #[tokio::test]
    async fn test_scroll_across_entities_walks_every_hit() {
        let (aggregator, _) = setup().await;
        let mut seen: Vec<Urn> = Vec::new();
        let mut scroll_id = None;
        loop {
            let request = SearchRequest::new("*").with_scroll(scroll_id.clone(), "5m", 2);
            let page = aggregator.search(&[], &request).await.unwrap();
            seen.extend(page.entities.into_iter().map(|e| e.urn));
            match page.scroll_id {
                Some(next) => scroll_id = Some(next),
                None => break,
            }
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_caching_aggregator_serves_repeat_from_cache() {
        let (aggregator, engine) = setup().await;
        let caching = CachingEntitySearchAggregator::new(aggregator, &CacheSettings::default());
        let request = SearchRequest::new("orders").with_page(0, 10);

        let first = caching.search(&[], &request).await.unwrap();
        engine
            .bulk_write(vec![WriteOperation::Delete {
                index: "chart_index_v2".to_string(),
                id: "urn:li:chart:orders_chart".to_string(),
            }])
            .await
            .unwrap();
        let cached = caching.search(&[], &request).await.unwrap();
        assert_eq!(first, cached);

        let mut fresh_request = request.clone();
        fresh_request.flags.skip_cache = true;
        let fresh = caching.search(&[], &fresh_request).await.unwrap();
        assert_eq!(fresh.num_entities, 2);
    }
}
