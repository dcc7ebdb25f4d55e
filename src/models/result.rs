//! Search responses

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::urn::Urn;

/// A highlighted field on a hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedField {
    pub name: String,
    pub value: String,
}

/// One hit of an entity search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchEntity {
    pub urn: Urn,

    pub score: f32,

    #[serde(default)]
    pub matched_fields: Vec<MatchedField>,
}

impl SearchEntity {
    pub fn new(urn: Urn, score: f32) -> Self {
        Self {
            urn,
            score,
            matched_fields: Vec::new(),
        }
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.urn.entity_type()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
}

/// Aggregated counts for one field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacetMetadata {
    pub field: String,
    pub display_name: String,
    pub buckets: Vec<FacetBucket>,
}

impl FacetMetadata {
    pub fn new(field: impl Into<String>, counts: BTreeMap<String, u64>) -> Self {
        let field = field.into();
        let mut buckets: Vec<FacetBucket> = counts
            .into_iter()
            .map(|(value, count)| FacetBucket { value, count })
            .collect();
        // Highest count first, then value for determinism
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        Self {
            display_name: field.clone(),
            field,
            buckets,
        }
    }

    pub fn count_of(&self, value: &str) -> Option<u64> {
        self.buckets
            .iter()
            .find(|bucket| bucket.value == value)
            .map(|bucket| bucket.count)
    }
}

/// Merge facet lists field by field, summing bucket counts
pub fn merge_facets(lists: impl IntoIterator<Item = Vec<FacetMetadata>>) -> Vec<FacetMetadata> {
    let mut merged: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
    for list in lists {
        for facet in list {
            let counts = merged.entry(facet.field).or_default();
            for bucket in facet.buckets {
                *counts.entry(bucket.value).or_default() += bucket.count;
            }
        }
    }
    merged
        .into_iter()
        .map(|(field, counts)| FacetMetadata::new(field, counts))
        .collect()
}

/// Result page of an entity search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResult {
    /// Total number of matches, independent of paging
    pub num_entities: u64,

    pub from: usize,

    pub page_size: usize,

    pub entities: Vec<SearchEntity>,

    #[serde(default)]
    pub facets: Vec<FacetMetadata>,

    /// Cursor for the next page of a scroll search
    #[serde(default)]
    pub scroll_id: Option<String>,
}

impl SearchResult {
    pub fn empty(from: usize, page_size: usize) -> Self {
        Self {
            from,
            page_size,
            ..Default::default()
        }
    }

    pub fn facet(&self, field: &str) -> Option<&FacetMetadata> {
        self.facets.iter().find(|facet| facet.field == field)
    }
}

/// A lineage hit annotated with its hop distance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineageSearchEntity {
    pub urn: Urn,

    pub degree: u32,

    pub score: f32,

    #[serde(default)]
    pub matched_fields: Vec<MatchedField>,
}

/// Result page of a lineage search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LineageSearchResult {
    /// Number of reachable entities that passed every filter
    pub num_entities: u64,

    pub from: usize,

    pub page_size: usize,

    pub entities: Vec<LineageSearchEntity>,

    #[serde(default)]
    pub facets: Vec<FacetMetadata>,
}

impl LineageSearchResult {
    pub fn facet(&self, field: &str) -> Option<&FacetMetadata> {
        self.facets.iter().find(|facet| facet.field == field)
    }

    /// Re-slice a complete result to `[from, from + size)`
    pub fn page(&self, from: usize, size: usize) -> LineageSearchResult {
        LineageSearchResult {
            num_entities: self.num_entities,
            from,
            page_size: size,
            entities: self.entities.iter().skip(from).take(size).cloned().collect(),
            facets: self.facets.clone(),
        }
    }
}

/// A child path under a browse path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowseGroup {
    pub name: String,
    pub path: String,
    pub count: u64,
}

/// Result of navigating the browse hierarchy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BrowseResult {
    pub path: String,

    pub groups: Vec<BrowseGroup>,

    /// Entities located directly at `path`
    pub entities: Vec<Urn>,

    pub num_entities: u64,

    pub from: usize,

    pub page_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facet(field: &str, buckets: &[(&str, u64)]) -> FacetMetadata {
        FacetMetadata::new(
            field,
            buckets.iter().map(|(v, c)| (v.to_string(), *c)).collect(),
        )
    }

    #[test]
    fn test_facet_buckets_sorted_by_count() {
        let facet = facet("platform", &[("hive", 1), ("kafka", 5), ("mysql", 5)]);
        let values: Vec<_> = facet.buckets.iter().map(|b| b.value.as_str()).collect();
        assert_eq!(values, vec!["kafka", "mysql", "hive"]);
    }

    #[test]
    fn test_merge_facets_sums_counts() {
        let merged = merge_facets(vec![
            vec![facet("platform", &[("hive", 2)])],
            vec![facet("platform", &[("hive", 3), ("kafka", 1)]), facet("origin", &[("PROD", 1)])],
        ]);
        assert_eq!(merged.len(), 2);
        let platform = merged.iter().find(|f| f.field == "platform").unwrap();
        assert_eq!(platform.count_of("hive"), Some(5));
        assert_eq!(platform.count_of("kafka"), Some(1));
    }

    #[test]
    fn test_lineage_page_slices() {
        let result = LineageSearchResult {
            num_entities: 3,
            from: 0,
            page_size: 3,
            entities: (1..=3)
                .map(|i| LineageSearchEntity {
                    urn: Urn::new(format!("urn:li:dataset:{}", i)),
                    degree: i,
                    score: 1.0,
                    matched_fields: Vec::new(),
                })
                .collect(),
            facets: Vec::new(),
        };

        let page = result.page(1, 5);
        assert_eq!(page.num_entities, 3);
        assert_eq!(page.entities.len(), 2);
        assert_eq!(page.entities[0].degree, 2);
        assert!(result.page(10, 5).entities.is_empty());
    }
}
