//! Cache keys
//!
//! Keys hold every request field that changes the cached value. Lineage keys
//! leave out the page so every page of one request shares an entry.

use crate::models::filter::Filter;
use crate::models::request::{
    is_wildcard_input, LineageDirection, LineageSearchRequest, Page, SearchRequest, SortCriterion,
};
use crate::models::urn::Urn;

/// Lower-cased, sorted and de-duplicated entity types
fn normalize_entity_types(entity_types: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = entity_types.iter().map(|t| t.to_lowercase()).collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Wildcard inputs all mean "match everything"
fn normalize_input(input: Option<&str>) -> Option<String> {
    if is_wildcard_input(input) {
        None
    } else {
        input.map(|text| text.trim().to_string())
    }
}

/// Key of one (multi-)entity search page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntitySearchKey {
    pub entity_types: Vec<String>,
    pub input: Option<String>,
    pub filter: Filter,
    pub sort: Vec<SortCriterion>,
    pub page: Page,
    pub fulltext: bool,
    pub skip_highlighting: bool,
    pub skip_aggregates: bool,
    pub urn_restriction: Option<Vec<String>>,
}

impl EntitySearchKey {
    pub fn new(entity_types: &[String], request: &SearchRequest) -> Self {
        Self {
            entity_types: normalize_entity_types(entity_types),
            input: normalize_input(request.input.as_deref()),
            filter: request.filter.clone(),
            sort: request.sort.clone(),
            page: request.page.clone(),
            fulltext: request.flags.fulltext,
            skip_highlighting: request.flags.skip_highlighting,
            skip_aggregates: request.flags.skip_aggregates,
            urn_restriction: request.urn_restriction.clone(),
        }
    }
}

/// Key of a fully reconciled lineage result, independent of `from`/`size`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineageCacheKey {
    pub root: Urn,
    pub direction: LineageDirection,
    pub entity_types: Vec<String>,
    pub input: Option<String>,
    pub filter: Filter,
    pub sort: Vec<SortCriterion>,
    pub max_hops: u32,
    pub start_time_millis: Option<i64>,
    pub end_time_millis: Option<i64>,
    pub fulltext: bool,
    pub skip_highlighting: bool,
    pub skip_aggregates: bool,
}

impl LineageCacheKey {
    /// `max_hops` is the resolved bound, so an absent bound and the default share a key
    pub fn new(request: &LineageSearchRequest, max_hops: u32) -> Self {
        Self {
            root: request.root_urn.clone(),
            direction: request.direction,
            entity_types: normalize_entity_types(&request.entity_types),
            input: normalize_input(request.input.as_deref()),
            filter: request.filter.clone(),
            sort: request.sort.clone(),
            max_hops,
            start_time_millis: request.start_time_millis,
            end_time_millis: request.end_time_millis,
            fulltext: request.flags.fulltext,
            skip_highlighting: request.flags.skip_highlighting,
            skip_aggregates: request.flags.skip_aggregates,
        }
    }

    pub fn graph_key(&self) -> GraphCacheKey {
        GraphCacheKey {
            root: self.root.clone(),
            direction: self.direction,
            max_hops: self.max_hops,
            start_time_millis: self.start_time_millis,
            end_time_millis: self.end_time_millis,
        }
    }
}

/// Key of one graph traversal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphCacheKey {
    pub root: Urn,
    pub direction: LineageDirection,
    pub max_hops: u32,
    pub start_time_millis: Option<i64>,
    pub end_time_millis: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::filter::Filter;
    use crate::models::request::SearchFlags;

    fn request() -> LineageSearchRequest {
        LineageSearchRequest::new(Urn::new("urn:li:dataset:root"), LineageDirection::Downstream)
    }

    #[test]
    fn test_lineage_key_ignores_page() {
        let a = LineageCacheKey::new(&request().with_page(0, 10), 1000);
        let b = LineageCacheKey::new(&request().with_page(20, 5), 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lineage_key_normalizes() {
        let a = LineageCacheKey::new(
            &request().with_entity_types(vec!["Dataset", "chart"]).with_input("*"),
            1000,
        );
        let b = LineageCacheKey::new(&request().with_entity_types(vec!["chart", "dataset"]), 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_lineage_key_distinguishes_filter_and_hops() {
        let base = LineageCacheKey::new(&request(), 1000);
        let filtered = LineageCacheKey::new(
            &request().with_filter(Filter::new_filter("platform", "hive")),
            1000,
        );
        assert_ne!(base, filtered);
        assert_ne!(base, LineageCacheKey::new(&request(), 2));
        assert_eq!(base.graph_key(), filtered.graph_key());
    }

    #[test]
    fn test_lineage_key_distinguishes_result_shaping_flags() {
        let base = LineageCacheKey::new(&request(), 1000);
        let no_aggregates = LineageCacheKey::new(
            &request().with_flags(SearchFlags::default().with_skip_aggregates(true)),
            1000,
        );
        let no_highlights = LineageCacheKey::new(
            &request().with_flags(SearchFlags::default().with_skip_highlighting(true)),
            1000,
        );
        assert_ne!(base, no_aggregates);
        assert_ne!(base, no_highlights);
        assert_ne!(no_aggregates, no_highlights);
        assert_eq!(base.graph_key(), no_aggregates.graph_key());
    }

    #[test]
    fn test_entity_search_key_includes_page() {
        let request = SearchRequest::new("sales");
        let a = EntitySearchKey::new(&["dataset".to_string()], &request.clone().with_page(0, 10));
        let b = EntitySearchKey::new(&["dataset".to_string()], &request.with_page(10, 10));
        assert_ne!(a, b);
    }
}
