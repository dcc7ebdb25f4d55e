use tracing::debug;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::models::entity::EntitySpec;
use crate::models::request::{Page, SearchRequest, SortOrder};
use crate::query::cursor::ScrollCursor;
use crate::query::dsl::{
    BoolQuery, CompiledPage, CompiledQuery, PointInTime, QueryNode, SortClause, SortDirection,
    TermsAggregation,
};
use crate::query::filter::{compile_filter, keyword_field};
use crate::query::fulltext::compile_text_query;

/// Field carrying the entity urn in every document
pub const URN_FIELD: &str = "urn";

/// Compiles search requests against one entity spec into index queries
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    config: SearchConfig,
}

impl QueryCompiler {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Compile `request` for the index of `spec`
    pub fn compile(&self, spec: &EntitySpec, request: &SearchRequest) -> Result<CompiledQuery> {
        request.validate(self.config.max_page_size)?;

        let text = compile_text_query(
            spec,
            request.input.as_deref(),
            request.flags.fulltext,
            &self.config.exact_match,
        );
        let filter = compile_filter(&request.filter, Some(spec))?;

        let mut root = BoolQuery::new().must(text).must(filter);
        if let Some(urns) = &request.urn_restriction {
            root = root.filter(QueryNode::terms(URN_FIELD, urns.clone()));
        }

        let aggregations = if request.flags.skip_aggregates {
            Vec::new()
        } else {
            self.aggregations(spec)
        };
        let highlight_fields = if request.flags.skip_highlighting {
            Vec::new()
        } else {
            self.highlight_fields(spec)
        };

        let page = match &request.page {
            Page::Offset { from, size } => CompiledPage::Offset {
                from: *from,
                size: *size,
            },
            Page::Scroll {
                scroll_id,
                keep_alive,
                size,
            } => {
                let cursor = scroll_id.as_deref().map(ScrollCursor::decode).transpose()?;
                let (search_after, pit_id) = match cursor {
                    Some(cursor) => (Some(cursor.sort), cursor.pit_id),
                    None => (None, None),
                };
                CompiledPage::SearchAfter {
                    search_after,
                    size: *size,
                    point_in_time: pit_id.map(|id| PointInTime {
                        id,
                        keep_alive: keep_alive.clone(),
                    }),
                }
            }
        };

        debug!(
            entity = %spec.name,
            aggregations = aggregations.len(),
            highlights = highlight_fields.len(),
            "Compiled search request"
        );

        Ok(CompiledQuery {
            query: root.into_node(),
            aggregations,
            highlight_fields,
            sort: self.sort(request),
            page,
        })
    }

    /// One terms aggregation per facet field
    pub fn aggregations(&self, spec: &EntitySpec) -> Vec<TermsAggregation> {
        spec.fields
            .iter()
            .filter(|field| field.add_to_filters)
            .map(|field| TermsAggregation {
                name: field.name.clone(),
                field: keyword_field(&field.name),
                size: self.config.max_term_bucket_size,
            })
            .collect()
    }

    /// Every text field and its subfields, minus lineage relationship fields
    pub fn highlight_fields(&self, spec: &EntitySpec) -> Vec<String> {
        spec.text_fields()
            .filter(|field| !field.lineage)
            .flat_map(|field| [field.name.clone(), format!("{}.*", field.name)])
            .collect()
    }

    /// Requested sort (or relevance) with an `urn` tiebreaker
    pub fn sort(&self, request: &SearchRequest) -> Vec<SortClause> {
        let mut sort: Vec<SortClause> = if request.sort.is_empty() {
            vec![SortClause::score()]
        } else {
            request
                .sort
                .iter()
                .map(|criterion| {
                    SortClause::new(
                        criterion.field.clone(),
                        match criterion.order {
                            SortOrder::Ascending => SortDirection::Asc,
                            SortOrder::Descending => SortDirection::Desc,
                        },
                    )
                })
                .collect()
        };
        if !sort.iter().any(|clause| clause.field == URN_FIELD) {
            sort.push(SortClause::new(URN_FIELD, SortDirection::Asc));
        }
        sort
    }
}
