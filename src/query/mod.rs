//! Query compilation
//!
//! Turns a [`SearchRequest`](crate::models::SearchRequest) plus the entity's
//! spec into a [`CompiledQuery`]: the boolean query tree, facet aggregations,
//! highlighted fields, sort and pagination.

mod compiler;
mod cursor;
mod dsl;
mod filter;
mod fulltext;

pub use compiler::{QueryCompiler, URN_FIELD};
pub use cursor::{parse_keep_alive, ScrollCursor};
pub use dsl::{
    BoolQuery, CompiledPage, CompiledQuery, PointInTime, QueryNode, RangeBounds, SortClause,
    SortDirection, TermsAggregation,
};
pub use filter::{compile_criterion, compile_filter, edited_field_for, keyword_field, REMOVED_FIELD};
pub use fulltext::{compile_text_query, exact_match_group};
