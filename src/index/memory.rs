//! DashMap-backed engine that interprets the query tree directly

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

use crate::error::Result;
use crate::index::fields::{compare_scalars, field_values, resolve_field, tokenize, FieldVariant};
use crate::index::hits::{finish, ScoredDocument};
use crate::index::{index_matches, EngineResponse, IndexEngine, WriteOperation};
use crate::query::{CompiledQuery, QueryNode, RangeBounds};

/// In-memory document store keyed by index, then document id
#[derive(Debug, Default)]
pub struct InMemoryIndexEngine {
    indices: DashMap<String, HashMap<String, Value>>,
}

impl InMemoryIndexEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl IndexEngine for InMemoryIndexEngine {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn search(&self, indices: &[String], query: &CompiledQuery) -> Result<EngineResponse> {
        let mut matches = Vec::new();
        for entry in self.indices.iter() {
            if !indices.iter().any(|pattern| index_matches(pattern, entry.key())) {
                continue;
            }
            for (id, source) in entry.value() {
                if let Some(score) = evaluate(&query.query, source) {
                    matches.push(ScoredDocument {
                        index: entry.key().clone(),
                        id: id.clone(),
                        score,
                        source: source.clone(),
                    });
                }
            }
        }
        debug!(indices = ?indices, matches = matches.len(), "In-memory search");
        Ok(finish(query, matches))
    }

    async fn count(&self, index: &str) -> Result<u64> {
        Ok(self
            .indices
            .get(index)
            .map(|documents| documents.len() as u64)
            .unwrap_or(0))
    }

    async fn bulk_write(&self, operations: Vec<WriteOperation>) -> Result<()> {
        for operation in operations {
            match operation {
                WriteOperation::Upsert {
                    index,
                    id,
                    document,
                } => {
                    self.indices.entry(index).or_default().insert(id, document);
                }
                WriteOperation::Delete { index, id } => {
                    if let Some(mut documents) = self.indices.get_mut(&index) {
                        documents.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Score of `source` under `node`, `None` when it does not match
pub(crate) fn evaluate(node: &QueryNode, source: &Value) -> Option<f32> {
    match node {
        QueryNode::MatchAll => Some(1.0),
        QueryNode::MatchNone => None,
        QueryNode::Bool(bool_query) => {
            let mut score = 0.0;
            for clause in &bool_query.must {
                score += evaluate(clause, source)?;
            }
            for clause in &bool_query.filter {
                evaluate(clause, source)?;
            }
            if bool_query
                .must_not
                .iter()
                .any(|clause| evaluate(clause, source).is_some())
            {
                return None;
            }
            let mut matched = 0;
            for clause in &bool_query.should {
                if let Some(clause_score) = evaluate(clause, source) {
                    matched += 1;
                    score += clause_score;
                }
            }
            if matched < bool_query.required_should() {
                return None;
            }
            Some(score * bool_query.boost.unwrap_or(1.0))
        }
        QueryNode::Match { field, query } => text_match(source, field, query),
        QueryNode::MultiMatch { query, fields } => fields
            .iter()
            .filter_map(|(field, boost)| text_match(source, field, query).map(|score| score * boost))
            .max_by(|a, b| a.total_cmp(b)),
        QueryNode::Term {
            field,
            value,
            case_insensitive,
            boost,
        } => {
            let (base, variant) = resolve_field(field);
            field_values(source, base)
                .iter()
                .any(|candidate| {
                    let exact = if *case_insensitive {
                        candidate.eq_ignore_ascii_case(value)
                    } else {
                        candidate == value
                    };
                    exact
                        || (variant == FieldVariant::Text
                            && tokenize(candidate).iter().any(|token| token == value))
                })
                .then_some(*boost)
        }
        QueryNode::Terms { field, values } => {
            let (base, _) = resolve_field(field);
            field_values(source, base)
                .iter()
                .any(|candidate| values.contains(candidate))
                .then_some(1.0)
        }
        QueryNode::Prefix { field, value, boost } => {
            let (base, _) = resolve_field(field);
            field_values(source, base)
                .iter()
                .any(|candidate| candidate.starts_with(value.as_str()))
                .then_some(*boost)
        }
        QueryNode::Wildcard { field, value } => {
            let (base, _) = resolve_field(field);
            let pattern = glob_regex(value)?;
            field_values(source, base)
                .iter()
                .any(|candidate| pattern.is_match(candidate))
                .then_some(1.0)
        }
        QueryNode::Range { field, bounds } => {
            let (base, _) = resolve_field(field);
            field_values(source, base)
                .iter()
                .any(|candidate| in_range(candidate, bounds))
                .then_some(1.0)
        }
        QueryNode::Exists { field } => {
            let (base, _) = resolve_field(field);
            (!field_values(source, base).is_empty()).then_some(1.0)
        }
        QueryNode::SimpleQueryString {
            query,
            fields,
            boost,
        } => simple_query_string(source, query, fields).map(|score| score * boost),
        QueryNode::QueryString {
            query,
            default_field,
            boost,
        } => query_string(source, query, default_field).map(|score| score * boost),
    }
}

/// Analyzed match: any query token present (exact value for `.keyword`)
fn text_match(source: &Value, field: &str, query: &str) -> Option<f32> {
    let (base, variant) = resolve_field(field);
    let values = field_values(source, base);
    if values.is_empty() {
        return None;
    }

    if matches!(variant, FieldVariant::Keyword | FieldVariant::Any)
        && values.iter().any(|value| value == query)
    {
        return Some(1.0);
    }
    if variant == FieldVariant::Keyword {
        return None;
    }

    let query_tokens = tokenize(query);
    let value_tokens: Vec<String> = values.iter().flat_map(|value| tokenize(value)).collect();
    let matched = query_tokens
        .iter()
        .filter(|token| value_tokens.contains(token))
        .count();
    (matched > 0).then_some(matched as f32 / query_tokens.len().max(1) as f32)
}

/// Every term must match in some field; `term*` matches as a prefix
fn simple_query_string(source: &Value, query: &str, fields: &[(String, f32)]) -> Option<f32> {
    let terms: Vec<(String, bool)> = query
        .split_whitespace()
        .filter(|word| !matches!(*word, "+" | "|" | "AND" | "OR"))
        .flat_map(|word| {
            let prefix = word.ends_with('*');
            tokenize(word).into_iter().map(move |token| (token, prefix))
        })
        .collect();
    if terms.is_empty() {
        return Some(1.0);
    }

    let field_tokens: Vec<(Vec<String>, f32)> = fields
        .iter()
        .map(|(field, boost)| {
            let (base, _) = resolve_field(field);
            let tokens = field_values(source, base)
                .iter()
                .flat_map(|value| tokenize(value))
                .collect();
            (tokens, *boost)
        })
        .collect();

    let mut score = 0.0;
    for (term, prefix) in &terms {
        let best = field_tokens
            .iter()
            .filter(|(tokens, _)| {
                tokens
                    .iter()
                    .any(|token| token == term || (*prefix && token.starts_with(term.as_str())))
            })
            .map(|(_, boost)| *boost)
            .max_by(|a, b| a.total_cmp(b))?;
        score += best;
    }
    Some(score)
}

/// `field:value` or bare terms against the default field; any part may match
fn query_string(source: &Value, query: &str, default_field: &str) -> Option<f32> {
    let mut matched = 0;
    let mut parts = 0;
    for part in query.split_whitespace() {
        if matches!(part, "AND" | "OR" | "NOT") {
            continue;
        }
        parts += 1;
        let (field, value) = match part.split_once(':') {
            Some((field, value))
                if !field.is_empty()
                    && field.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.') =>
            {
                (field, value)
            }
            _ => (default_field, part),
        };
        let value = value.trim_matches('"');
        if value == "*" {
            if !field_values(source, resolve_field(field).0).is_empty() {
                matched += 1;
            }
        } else if text_match(source, field, value).is_some() {
            matched += 1;
        }
    }
    if parts == 0 {
        return Some(1.0);
    }
    (matched > 0).then_some(matched as f32)
}

fn glob_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

fn in_range(candidate: &str, bounds: &RangeBounds) -> bool {
    let check = |bound: &Option<String>, accept: &[Ordering]| {
        bound
            .as_deref()
            .map(|bound| accept.contains(&compare_scalars(candidate, bound)))
            .unwrap_or(true)
    };
    check(&bounds.gt, &[Ordering::Greater])
        && check(&bounds.gte, &[Ordering::Greater, Ordering::Equal])
        && check(&bounds.lt, &[Ordering::Less])
        && check(&bounds.lte, &[Ordering::Less, Ordering::Equal])
}
