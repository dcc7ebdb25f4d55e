//! Search within the lineage of one entity
//!
//! ```text
//! CACHE_CHECK ──hit──────────────────────────────────────────► RESPOND
//!     │ miss
//!     ▼
//! CANDIDATE_FETCH (graph, cached separately) ∥ doc-count warmup
//!     │
//!     ├── few candidates, wildcard input, no index filter ──► LIGHTNING
//!     └── otherwise ────────────────────────────────────────► FILTERED
//!                                                                │
//!                              RANK ◄────────────────────────────┘
//!                                │
//!                       store full result, RESPOND with the page
//! ```
//!
//! Pagination is never cached: the full reconciled result is stored once per
//! [`LineageCacheKey`] and every page is sliced from it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{GraphCacheKey, LineageCacheKey, TtlCache};
use crate::config::{LineageCacheConfig, LineageConfig};
use crate::error::{Result, SearchError};
use crate::metrics::LINEAGE_PATH_TOTAL;
use crate::models::filter::{Condition, ConjunctiveCriterion, Criterion, Filter};
use crate::models::lineage::EntityLineageResult;
use crate::models::request::{is_wildcard_input, LineageSearchRequest, Page, SearchRequest};
use crate::models::result::{
    FacetMetadata, LineageSearchEntity, LineageSearchResult, SearchResult,
};
use crate::models::urn::Urn;
use crate::query::URN_FIELD;
use crate::resilience::UpstreamPolicy;
use crate::search::aggregator::{EntitySearchAggregator, ENTITY_FACET};
use crate::search::graph::{GraphTraversal, LineageQuery};
use crate::search::lineage_filter::{self, Branch, DEGREE_FIELD};
use crate::search::ranker::Ranker;

/// Score given to every entity on the lightning path
const LIGHTNING_SCORE: f32 = 1.0;

/// Reconciliation path chosen for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineagePath {
    Lightning,
    Filtered,
}

impl LineagePath {
    fn label(&self) -> &'static str {
        match self {
            LineagePath::Lightning => "lightning",
            LineagePath::Filtered => "filtered",
        }
    }
}

/// Orchestrates graph traversal and index search for lineage queries
pub struct LineageSearchService {
    graph: Arc<dyn GraphTraversal>,
    aggregator: Arc<EntitySearchAggregator>,
    ranker: Arc<dyn Ranker>,
    graph_policy: UpstreamPolicy,
    lineage: LineageConfig,
    cache_config: LineageCacheConfig,
    results: TtlCache<LineageCacheKey>,
    graphs: TtlCache<GraphCacheKey>,
}

impl LineageSearchService {
    pub fn new(
        graph: Arc<dyn GraphTraversal>,
        aggregator: Arc<EntitySearchAggregator>,
        ranker: Arc<dyn Ranker>,
        graph_policy: UpstreamPolicy,
        lineage: LineageConfig,
        cache_config: LineageCacheConfig,
    ) -> Self {
        Self {
            graph,
            aggregator,
            ranker,
            graph_policy,
            results: lineage_cache(&cache_config, "lineage"),
            graphs: lineage_cache(&cache_config, "lineage_graph"),
            lineage,
            cache_config,
        }
    }

    /// Hop bound sent to the graph when the request sets none
    pub fn resolve_max_hops(&self, request: &LineageSearchRequest) -> u32 {
        request.max_hops.unwrap_or(self.lineage.default_max_hops)
    }

    /// Page `[from, from + size)` of the entities reachable from the root that
    /// also match the text and filter
    pub async fn search_across_lineage(
        &self,
        request: &LineageSearchRequest,
    ) -> Result<LineageSearchResult> {
        request.validate(self.aggregator.compiler().config().max_page_size)?;
        let max_hops = self.resolve_max_hops(request);
        let key = LineageCacheKey::new(request, max_hops);
        let key_ref = &key;

        let full: LineageSearchResult = self
            .results
            .get_or_compute(key.clone(), request.flags.skip_cache, move || {
                self.reconcile(request, key_ref)
            })
            .await?;
        Ok(full.page(request.from, request.size))
    }

    async fn reconcile(
        &self,
        request: &LineageSearchRequest,
        key: &LineageCacheKey,
    ) -> Result<LineageSearchResult> {
        // The doc-count lookups only warm the cache the filtered path reads
        let (lineage, entity_types) = tokio::try_join!(
            self.fetch_lineage(request, key),
            self.entity_types(&request.entity_types),
        )?;

        let reachable = lineage.candidates();
        let in_scope: Vec<(Urn, u32)> = reachable
            .iter()
            .filter(|(urn, _)| {
                urn.entity_type()
                    .map_or(false, |t| entity_types.contains(&t.to_lowercase()))
            })
            .cloned()
            .collect();

        let admitted: Vec<Admitted> = lineage_filter::branches(&request.filter)
            .into_iter()
            .filter_map(|branch| {
                let candidates: Vec<(Urn, u32)> = in_scope
                    .iter()
                    .filter(|(urn, degree)| branch.admits(urn, *degree))
                    .cloned()
                    .collect();
                (!candidates.is_empty()).then_some(Admitted { branch, candidates })
            })
            .collect();
        let admitted_urns: HashSet<&Urn> = admitted
            .iter()
            .flat_map(|a| a.candidates.iter().map(|(urn, _)| urn))
            .collect();
        let candidates: Vec<(Urn, u32)> = in_scope
            .iter()
            .filter(|(urn, _)| admitted_urns.contains(urn))
            .cloned()
            .collect();

        let path = self.choose_path(reachable.len(), request, &admitted);
        LINEAGE_PATH_TOTAL.with_label_values(&[path.label()]).inc();
        info!(
            root = %request.root_urn,
            direction = %request.direction,
            reachable = reachable.len(),
            candidates = candidates.len(),
            branches = admitted.len(),
            path = path.label(),
            "Reconciling lineage search"
        );

        let (entities, index_facets) = match path {
            LineagePath::Lightning => (self.lightning(&candidates), Vec::new()),
            LineagePath::Filtered => {
                self.filtered(request, &admitted, &candidates, &entity_types)
                    .await?
            }
        };

        // An explicit sort was applied by the index
        let entities = if request.sort.is_empty() {
            self.ranker.rank_lineage(entities)
        } else {
            entities
        };
        let mut facets = lineage_facets(&entities);
        facets.extend(
            index_facets
                .into_iter()
                .filter(|facet| facet.field != DEGREE_FIELD && facet.field != ENTITY_FACET),
        );

        Ok(LineageSearchResult {
            num_entities: entities.len() as u64,
            from: 0,
            page_size: entities.len(),
            entities,
            facets,
        })
    }

    /// Lightning only when the index has nothing left to decide
    fn choose_path(
        &self,
        reachable: usize,
        request: &LineageSearchRequest,
        admitted: &[Admitted],
    ) -> LineagePath {
        if self.cache_config.lightning_applies(reachable)
            && is_wildcard_input(request.input.as_deref())
            && request.sort.is_empty()
            && admitted.iter().all(|a| a.branch.index.is_empty())
        {
            LineagePath::Lightning
        } else {
            LineagePath::Filtered
        }
    }

    /// Graph traversal under the graph deadline, cached per traversal key
    async fn fetch_lineage(
        &self,
        request: &LineageSearchRequest,
        key: &LineageCacheKey,
    ) -> Result<EntityLineageResult> {
        let query = LineageQuery {
            root: request.root_urn.clone(),
            direction: request.direction,
            offset: 0,
            count: self.lineage.max_relationships,
            max_hops: Some(key.max_hops),
            start_time_millis: request.start_time_millis,
            end_time_millis: request.end_time_millis,
        };
        let policy = self.graph_policy.with_deadline(request.flags.timeout());
        let (policy, query) = (&policy, &query);

        self.graphs
            .get_or_compute(key.graph_key(), request.flags.skip_cache, move || async move {
                let result = policy
                    .read("get_lineage", || self.graph.get_lineage(query))
                    .await
                    .map_err(|e| match e {
                        SearchError::UpstreamTimeout(_) | SearchError::GraphUnavailable(_) => e,
                        SearchError::InvalidRequest(_) => e,
                        other => SearchError::GraphUnavailable(other.to_string()),
                    })?;
                debug!(
                    root = %query.root,
                    relationships = result.relationships.len(),
                    total = result.total,
                    "Fetched lineage"
                );
                Ok(result)
            })
            .await
    }

    /// Lower-cased names of the requested types, warming their document counts
    async fn entity_types(&self, requested: &[String]) -> Result<BTreeSet<String>> {
        let specs = self.aggregator.resolve_types(requested)?;
        let names: Vec<String> = specs.iter().map(|spec| spec.name.clone()).collect();
        self.aggregator.populated_types(&names).await?;
        Ok(names.into_iter().map(|name| name.to_lowercase()).collect())
    }

    fn lightning(&self, candidates: &[(Urn, u32)]) -> Vec<LineageSearchEntity> {
        candidates
            .iter()
            .map(|(urn, degree)| LineageSearchEntity {
                urn: urn.clone(),
                degree: *degree,
                score: LIGHTNING_SCORE,
                matched_fields: Vec::new(),
            })
            .collect()
    }

    /// Index search restricted to the candidate urns, annotated with degrees.
    ///
    /// Each admitted branch keeps its index criteria together with the urns it
    /// admitted, so a hit must satisfy both halves of one branch.
    async fn filtered(
        &self,
        request: &LineageSearchRequest,
        admitted: &[Admitted],
        candidates: &[(Urn, u32)],
        entity_types: &BTreeSet<String>,
    ) -> Result<(Vec<LineageSearchEntity>, Vec<FacetMetadata>)> {
        if candidates.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let degrees: HashMap<&Urn, u32> = candidates.iter().map(|(urn, d)| (urn, *d)).collect();
        let candidate_types: BTreeSet<String> = candidates
            .iter()
            .filter_map(|(urn, _)| urn.entity_type().map(str::to_lowercase))
            .collect();
        let types: Vec<String> = entity_types.intersection(&candidate_types).cloned().collect();

        let size = candidates
            .len()
            .min(self.aggregator.compiler().config().max_page_size);
        let search = SearchRequest {
            input: request.input.clone(),
            filter: branch_filter(admitted, candidates.len()),
            sort: request.sort.clone(),
            page: Page::Offset { from: 0, size },
            flags: request.flags.clone(),
            urn_restriction: Some(candidates.iter().map(|(urn, _)| urn.to_string()).collect()),
        };
        let SearchResult {
            entities, facets, ..
        } = self.aggregator.search(&types, &search).await?;

        let annotated = entities
            .into_iter()
            .filter_map(|entity| {
                let degree = *degrees.get(&entity.urn)?;
                Some(LineageSearchEntity {
                    urn: entity.urn,
                    degree,
                    score: entity.score,
                    matched_fields: entity.matched_fields,
                })
            })
            .collect();
        Ok((annotated, facets))
    }
}

fn lineage_cache<K>(config: &LineageCacheConfig, name: &'static str) -> TtlCache<K>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
{
    if config.enabled {
        TtlCache::new(name, config.max_capacity, config.ttl())
    } else {
        TtlCache::disabled(name)
    }
}

/// Candidates admitted by one filter branch
struct Admitted {
    branch: Branch,
    candidates: Vec<(Urn, u32)>,
}

/// Index filter with one conjunct per admitted branch.
///
/// A branch that admitted only part of the candidates is narrowed to its own
/// urns; one that admitted all of them relies on the request's urn restriction.
fn branch_filter(admitted: &[Admitted], total: usize) -> Filter {
    Filter {
        or: admitted
            .iter()
            .map(|a| {
                let mut criteria = a.branch.index.clone();
                if a.candidates.len() < total {
                    criteria.push(
                        Criterion::new(URN_FIELD, Condition::In)
                            .with_values(a.candidates.iter().map(|(urn, _)| urn.to_string())),
                    );
                }
                ConjunctiveCriterion::new(criteria)
            })
            .collect(),
    }
}

/// `degree` and `entity` facets over the reconciled entities
fn lineage_facets(entities: &[LineageSearchEntity]) -> Vec<FacetMetadata> {
    let mut degrees: BTreeMap<String, u64> = BTreeMap::new();
    let mut types: BTreeMap<String, u64> = BTreeMap::new();
    for entity in entities {
        *degrees.entry(entity.degree.to_string()).or_default() += 1;
        if let Some(entity_type) = entity.urn.entity_type() {
            *types.entry(entity_type.to_string()).or_default() += 1;
        }
    }
    vec![
        FacetMetadata::new(DEGREE_FIELD, degrees),
        FacetMetadata::new(ENTITY_FACET, types),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(urn: &str, degree: u32) -> LineageSearchEntity {
        LineageSearchEntity {
            urn: Urn::new(urn),
            degree,
            score: 1.0,
            matched_fields: Vec::new(),
        }
    }

    #[test]
    fn test_lineage_facets_count_degree_and_type() {
        let facets = lineage_facets(&[
            entity("urn:li:dataset:a", 1),
            entity("urn:li:dataset:b", 2),
            entity("urn:li:chart:c", 1),
        ]);
        assert_eq!(facets[0].field, "degree");
        assert_eq!(facets[0].count_of("1"), Some(2));
        assert_eq!(facets[1].count_of("dataset"), Some(2));
        assert_eq!(facets[1].count_of("chart"), Some(1));
    }

    #[test]
    fn test_branch_filter_narrows_partial_branches_to_their_urns() {
        let a = (Urn::new("urn:li:dataset:a"), 1);
        let b = (Urn::new("urn:li:dataset:b"), 2);
        let admitted = vec![
            Admitted {
                branch: Branch::default(),
                candidates: vec![a.clone()],
            },
            Admitted {
                branch: Branch {
                    lineage: Vec::new(),
                    index: vec![Criterion::equal("platform", "hive")],
                },
                candidates: vec![a, b],
            },
        ];

        let filter = branch_filter(&admitted, 2);
        assert_eq!(filter.or.len(), 2);
        assert_eq!(filter.or[0].and.len(), 1);
        assert_eq!(filter.or[0].and[0].field, URN_FIELD);
        assert_eq!(filter.or[0].and[0].values, vec!["urn:li:dataset:a".to_string()]);
        assert_eq!(filter.or[1].and, vec![Criterion::equal("platform", "hive")]);
    }

    #[test]
    fn test_path_labels() {
        assert_eq!(LineagePath::Lightning.label(), "lightning");
        assert_eq!(LineagePath::Filtered.label(), "filtered");
    }
}
