//! Free-text and structured query compilation with exact-match boosting

use crate::config::ExactMatchConfig;
use crate::models::entity::EntitySpec;
use crate::models::request::is_wildcard_input;
use crate::query::dsl::{BoolQuery, QueryNode};
use crate::query::filter::keyword_field;

/// Compile the text part of a request.
///
/// Fulltext searches every searchable field weighted by its boost; structured
/// searches hit the entity's designated default field. Wildcard input matches all.
pub fn compile_text_query(
    spec: &EntitySpec,
    input: Option<&str>,
    fulltext: bool,
    exact_match: &ExactMatchConfig,
) -> QueryNode {
    let input = match input.map(str::trim) {
        Some(text) if !is_wildcard_input(Some(text)) => text,
        _ => return QueryNode::MatchAll,
    };

    if fulltext {
        let fields: Vec<(String, f32)> = spec
            .text_fields()
            .map(|field| (field.name.clone(), field.boost))
            .collect();
        let fuzzy = QueryNode::SimpleQueryString {
            query: input.to_string(),
            fields,
            boost: 1.0,
        };
        combine(fuzzy, exact_match_group(spec, input, exact_match), exact_match)
    } else {
        let structured = QueryNode::QueryString {
            query: input.to_string(),
            default_field: spec.structured_default_field(),
            boost: 1.0,
        };
        if exact_match.enable_structured {
            combine(structured, exact_match_group(spec, input, exact_match), exact_match)
        } else {
            structured
        }
    }
}

fn combine(fuzzy: QueryNode, exact: Option<QueryNode>, exact_match: &ExactMatchConfig) -> QueryNode {
    match exact {
        None => fuzzy,
        Some(exact) if exact_match.exclusive => exact,
        Some(exact) => BoolQuery::new()
            .should(fuzzy)
            .should(exact)
            .minimum_should_match(1)
            .into_node(),
    }
}

/// Exact, case-insensitive and prefix matches on keyword subfields.
///
/// Returns `None` when the spec has no text fields.
pub fn exact_match_group(
    spec: &EntitySpec,
    input: &str,
    exact_match: &ExactMatchConfig,
) -> Option<QueryNode> {
    let unquoted = input.trim_matches('"');
    let mut group = BoolQuery::new();

    for field in spec.text_fields() {
        let keyword = keyword_field(&field.name);
        group = group
            .should(QueryNode::Term {
                field: keyword.clone(),
                value: unquoted.to_string(),
                case_insensitive: false,
                boost: field.boost * exact_match.exact_factor,
            })
            .should(QueryNode::Term {
                field: keyword.clone(),
                value: unquoted.to_string(),
                case_insensitive: true,
                boost: field.boost
                    * exact_match.exact_factor
                    * exact_match.case_sensitivity_factor,
            });
        if exact_match.with_prefix {
            group = group.should(QueryNode::Prefix {
                field: keyword,
                value: unquoted.to_string(),
                boost: field.boost * exact_match.prefix_factor,
            });
        }
    }

    if group.should.is_empty() {
        None
    } else {
        Some(group.into_node())
    }
}
