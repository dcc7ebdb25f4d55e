use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::index::fields::field_values;
use crate::index::{EngineResponse, IndexConvention, IndexEngine};
use crate::models::request::{Page, SearchRequest};
use crate::models::result::{BrowseGroup, BrowseResult, FacetMetadata, SearchEntity, SearchResult};
use crate::models::urn::Urn;
use crate::query::{
    BoolQuery, CompiledPage, CompiledQuery, PointInTime, QueryNode, ScrollCursor, SortClause,
    SortDirection, REMOVED_FIELD, URN_FIELD,
};
use crate::resilience::UpstreamPolicy;

/// Document field holding `/`-separated browse paths
pub const BROWSE_PATHS_FIELD: &str = "browsePaths";

/// Upper bound on documents read to assemble one browse level
const BROWSE_WINDOW: usize = 10_000;

/// Executes compiled queries against the index engine
#[derive(Clone)]
pub struct IndexReader {
    engine: Arc<dyn IndexEngine>,
    convention: Arc<IndexConvention>,
    policy: UpstreamPolicy,
}

impl IndexReader {
    pub fn new(
        engine: Arc<dyn IndexEngine>,
        convention: Arc<IndexConvention>,
        policy: UpstreamPolicy,
    ) -> Self {
        Self {
            engine,
            convention,
            policy,
        }
    }

    pub fn convention(&self) -> &IndexConvention {
        &self.convention
    }

    /// Raw engine search under the read deadline, retried once on a transient failure
    pub async fn execute(
        &self,
        indices: &[String],
        query: &CompiledQuery,
        deadline: Option<Duration>,
    ) -> Result<EngineResponse> {
        self.policy
            .with_deadline(deadline)
            .read("search", || self.engine.search(indices, query))
            .await
    }

    /// Run `query` over `indices` on behalf of `request`.
    ///
    /// Opens a point-in-time for the first page of a scroll when asked to and
    /// returns a next `scroll_id` only when the page came back full.
    pub async fn search(
        &self,
        indices: &[String],
        mut query: CompiledQuery,
        request: &SearchRequest,
    ) -> Result<SearchResult> {
        let deadline = request.flags.timeout();

        if let Page::Scroll {
            scroll_id: None,
            keep_alive,
            ..
        } = &request.page
        {
            if request.flags.point_in_time_creation {
                let opened = self
                    .policy
                    .with_deadline(deadline)
                    .read("open_point_in_time", || {
                        self.engine.open_point_in_time(indices, keep_alive)
                    })
                    .await?;
                if let (
                    Some(id),
                    CompiledPage::SearchAfter {
                        point_in_time, ..
                    },
                ) = (opened, &mut query.page)
                {
                    debug!(pit = %id, "Opened point-in-time");
                    *point_in_time = Some(PointInTime {
                        id,
                        keep_alive: keep_alive.clone(),
                    });
                }
            }
        }

        let response = self.execute(indices, &query, deadline).await?;
        to_search_result(response, &query, request)
    }

    /// A from/size page together with the sort tuple of each hit, in hit order
    pub async fn search_with_sort_keys(
        &self,
        indices: &[String],
        query: CompiledQuery,
        request: &SearchRequest,
    ) -> Result<(SearchResult, Vec<Vec<serde_json::Value>>)> {
        let response = self.execute(indices, &query, request.flags.timeout()).await?;
        let sort_keys = response.hits.iter().map(|hit| hit.sort_values.clone()).collect();
        Ok((to_search_result(response, &query, request)?, sort_keys))
    }

    /// Child paths and entities directly under `path` for one entity type
    pub async fn browse(
        &self,
        entity: &str,
        path: &str,
        from: usize,
        size: usize,
    ) -> Result<BrowseResult> {
        let path = normalize_path(path);
        let keyword = format!("{}.keyword", BROWSE_PATHS_FIELD);

        let located = if path.is_empty() {
            QueryNode::Exists {
                field: BROWSE_PATHS_FIELD.to_string(),
            }
        } else {
            BoolQuery::new()
                .should(QueryNode::term(keyword.clone(), path.clone()))
                .should(QueryNode::Prefix {
                    field: keyword,
                    value: format!("{}/", path),
                    boost: 1.0,
                })
                .minimum_should_match(1)
                .into_node()
        };
        let root = BoolQuery::new()
            .filter(located)
            .must_not(QueryNode::Match {
                field: REMOVED_FIELD.to_string(),
                query: "true".to_string(),
            })
            .into_node();

        let mut query = CompiledQuery::new(root, 0, BROWSE_WINDOW);
        query.sort = vec![SortClause::new(URN_FIELD, SortDirection::Asc)];

        let index = self.convention.entity_index_name(entity);
        let response = self.execute(&[index], &query, None).await?;

        let mut groups: BTreeMap<String, u64> = BTreeMap::new();
        let mut entities: Vec<Urn> = Vec::new();
        for hit in &response.hits {
            let mut children: BTreeSet<String> = BTreeSet::new();
            let mut here = false;
            for browse_path in field_values(&hit.source, BROWSE_PATHS_FIELD) {
                let browse_path = normalize_path(&browse_path);
                if browse_path == path {
                    here = true;
                } else if let Some(rest) = child_segment(&path, &browse_path) {
                    children.insert(rest.to_string());
                }
            }
            for child in children {
                *groups.entry(child).or_default() += 1;
            }
            if here {
                entities.push(Urn::new(hit.id.clone()));
            }
        }

        let num_entities = entities.len() as u64;
        Ok(BrowseResult {
            groups: groups
                .into_iter()
                .map(|(name, count)| BrowseGroup {
                    path: format!("{}/{}", path, name),
                    name,
                    count,
                })
                .collect(),
            entities: entities.into_iter().skip(from).take(size).collect(),
            path: if path.is_empty() { "/".to_string() } else { path },
            num_entities,
            from,
            page_size: size,
        })
    }
}

/// Leading `/`, no trailing `/`; the root is the empty string
fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// First segment of `candidate` below `parent`
fn child_segment<'a>(parent: &str, candidate: &'a str) -> Option<&'a str> {
    let rest = candidate.strip_prefix(parent)?.strip_prefix('/')?;
    rest.split('/').next().filter(|segment| !segment.is_empty())
}

/// Shape an engine response into a search page
pub(crate) fn to_search_result(
    response: EngineResponse,
    query: &CompiledQuery,
    request: &SearchRequest,
) -> Result<SearchResult> {
    let size = query.page.size();
    let scroll_id = match (&request.page, response.hits.last()) {
        (Page::Scroll { keep_alive, .. }, Some(last)) if size > 0 && response.hits.len() == size => {
            let cursor = ScrollCursor::new(
                last.sort_values.clone(),
                response.point_in_time.clone(),
                keep_alive,
            )?;
            Some(cursor.encode()?)
        }
        _ => None,
    };

    let facets = response
        .aggregations
        .into_iter()
        .map(|(field, counts)| FacetMetadata::new(field, counts))
        .collect();

    let entities = response
        .hits
        .into_iter()
        .map(|hit| SearchEntity {
            urn: Urn::new(hit.id),
            score: hit.score,
            matched_fields: hit.matched_fields,
        })
        .collect();

    Ok(SearchResult {
        num_entities: response.total,
        from: request.page.from(),
        page_size: size,
        entities,
        facets,
        scroll_id,
    })
}
