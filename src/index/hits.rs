//! Sorting, paging, facets and highlights over fully matched hit sets
//!
//! Embedded engines find every matching document first and then hand the
//! matches here to shape the response the way a remote engine would.

use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::index::fields::{compare_values, field_values, resolve_field, tokenize};
use crate::index::{EngineResponse, IndexHit};
use crate::models::result::MatchedField;
use crate::query::{CompiledPage, CompiledQuery, SortClause, SortDirection};

/// A matched document before shaping
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub index: String,
    pub id: String,
    pub score: f32,
    pub source: Value,
}

fn sort_values(document: &ScoredDocument, sort: &[SortClause]) -> Vec<Value> {
    sort.iter()
        .map(|clause| {
            if clause.field == "_score" {
                json!(document.score)
            } else {
                let (base, _) = resolve_field(&clause.field);
                if base == "urn" && document.source.get("urn").is_none() {
                    return Value::String(document.id.clone());
                }
                field_values(&document.source, base)
                    .into_iter()
                    .next()
                    .map(Value::String)
                    .unwrap_or(Value::Null)
            }
        })
        .collect()
}

/// Compare sort tuples; missing values sort last in either direction
pub fn compare_tuples(a: &[Value], b: &[Value], sort: &[SortClause]) -> Ordering {
    for ((x, y), clause) in a.iter().zip(b.iter()).zip(sort.iter()) {
        let ordering = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = compare_values(x, y);
                match clause.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn aggregate(query: &CompiledQuery, documents: &[ScoredDocument]) -> BTreeMap<String, BTreeMap<String, u64>> {
    let mut aggregations = BTreeMap::new();
    for aggregation in &query.aggregations {
        let (base, _) = resolve_field(&aggregation.field);
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for document in documents {
            let distinct: BTreeSet<String> = field_values(&document.source, base).into_iter().collect();
            for value in distinct {
                *counts.entry(value).or_default() += 1;
            }
        }
        let mut buckets: Vec<(String, u64)> = counts.into_iter().collect();
        buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        buckets.truncate(aggregation.size);
        aggregations.insert(aggregation.name.clone(), buckets.into_iter().collect());
    }
    aggregations
}

fn highlight(query: &CompiledQuery, source: &Value, terms: &BTreeSet<String>) -> Vec<MatchedField> {
    if terms.is_empty() {
        return Vec::new();
    }
    let fields: BTreeSet<&str> = query
        .highlight_fields
        .iter()
        .map(|field| resolve_field(field).0)
        .collect();

    let mut matched = Vec::new();
    for field in fields {
        for value in field_values(source, field) {
            if tokenize(&value).iter().any(|token| terms.contains(token)) {
                matched.push(MatchedField {
                    name: field.to_string(),
                    value,
                });
            }
        }
    }
    matched
}

/// Shape the full match set into one response page
pub fn finish(query: &CompiledQuery, mut documents: Vec<ScoredDocument>) -> EngineResponse {
    let total = documents.len() as u64;
    let aggregations = aggregate(query, &documents);

    let mut keyed: Vec<(Vec<Value>, ScoredDocument)> = documents
        .drain(..)
        .map(|document| (sort_values(&document, &query.sort), document))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| compare_tuples(a, b, &query.sort));

    let page: Vec<(Vec<Value>, ScoredDocument)> = match &query.page {
        CompiledPage::Offset { from, size } => keyed.into_iter().skip(*from).take(*size).collect(),
        CompiledPage::SearchAfter {
            search_after, size, ..
        } => keyed
            .into_iter()
            .filter(|(values, _)| match search_after {
                Some(after) => compare_tuples(values, after, &query.sort) == Ordering::Greater,
                None => true,
            })
            .take(*size)
            .collect(),
    };

    let terms: BTreeSet<String> = if query.highlight_fields.is_empty() {
        BTreeSet::new()
    } else {
        query
            .query
            .highlight_terms()
            .iter()
            .flat_map(|text| tokenize(text))
            .collect()
    };

    let hits = page
        .into_iter()
        .map(|(sort_values, document)| IndexHit {
            matched_fields: highlight(query, &document.source, &terms),
            index: document.index,
            id: document.id,
            score: document.score,
            source: document.source,
            sort_values,
        })
        .collect();

    EngineResponse {
        total,
        hits,
        aggregations,
        point_in_time: query.point_in_time().map(|pit| pit.id.clone()),
    }
}
