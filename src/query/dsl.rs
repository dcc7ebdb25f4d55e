//! Engine-neutral query tree
//!
//! The compiler produces a [`CompiledQuery`]; each index engine either
//! interprets the tree directly or translates it into its own query objects.
//! [`CompiledQuery::to_json`] renders the Elasticsearch request body.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// One node of a compiled query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    MatchAll,

    MatchNone,

    Bool(BoolQuery),

    /// Analyzed match on one field
    Match {
        field: String,
        query: String,
    },

    /// Analyzed match across weighted fields; `f.*` addresses every subfield of `f`
    MultiMatch {
        query: String,
        fields: Vec<(String, f32)>,
    },

    /// Exact value
    Term {
        field: String,
        value: String,
        case_insensitive: bool,
        boost: f32,
    },

    /// Any of the exact values
    Terms {
        field: String,
        values: Vec<String>,
    },

    Prefix {
        field: String,
        value: String,
        boost: f32,
    },

    /// `*` and `?` glob
    Wildcard {
        field: String,
        value: String,
    },

    Range {
        field: String,
        bounds: RangeBounds,
    },

    Exists {
        field: String,
    },

    /// User text over weighted fields; all terms required
    SimpleQueryString {
        query: String,
        fields: Vec<(String, f32)>,
        boost: f32,
    },

    /// Lucene-style structured query against a default field
    QueryString {
        query: String,
        default_field: String,
        boost: f32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
}

/// Boolean combination of clauses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    pub must: Vec<QueryNode>,
    pub should: Vec<QueryNode>,
    pub must_not: Vec<QueryNode>,
    /// Like `must` but not scored
    pub filter: Vec<QueryNode>,
    pub minimum_should_match: Option<usize>,
    pub boost: Option<f32>,
}

impl BoolQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, clause: QueryNode) -> Self {
        self.must.push(clause);
        self
    }

    pub fn should(mut self, clause: QueryNode) -> Self {
        self.should.push(clause);
        self
    }

    pub fn must_not(mut self, clause: QueryNode) -> Self {
        self.must_not.push(clause);
        self
    }

    pub fn filter(mut self, clause: QueryNode) -> Self {
        self.filter.push(clause);
        self
    }

    pub fn minimum_should_match(mut self, count: usize) -> Self {
        self.minimum_should_match = Some(count);
        self
    }

    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = Some(boost);
        self
    }

    /// How many `should` clauses a document must satisfy
    pub fn required_should(&self) -> usize {
        match self.minimum_should_match {
            Some(count) => count,
            None if self.must.is_empty() && self.filter.is_empty() && !self.should.is_empty() => 1,
            None => 0,
        }
    }

    pub fn into_node(self) -> QueryNode {
        QueryNode::Bool(self)
    }
}

fn fields_json(fields: &[(String, f32)]) -> Vec<String> {
    fields
        .iter()
        .map(|(field, boost)| format!("{}^{}", field, boost))
        .collect()
}

impl QueryNode {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        QueryNode::Term {
            field: field.into(),
            value: value.into(),
            case_insensitive: false,
            boost: 1.0,
        }
    }

    pub fn terms(field: impl Into<String>, values: Vec<String>) -> Self {
        QueryNode::Terms {
            field: field.into(),
            values,
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, QueryNode::MatchAll)
    }

    /// Render as Elasticsearch query DSL
    pub fn to_json(&self) -> Value {
        match self {
            QueryNode::MatchAll => json!({ "match_all": {} }),
            QueryNode::MatchNone => json!({ "match_none": {} }),
            QueryNode::Bool(bool_query) => {
                let mut body = Map::new();
                for (name, clauses) in [
                    ("must", &bool_query.must),
                    ("should", &bool_query.should),
                    ("must_not", &bool_query.must_not),
                    ("filter", &bool_query.filter),
                ] {
                    if !clauses.is_empty() {
                        body.insert(
                            name.to_string(),
                            Value::Array(clauses.iter().map(QueryNode::to_json).collect()),
                        );
                    }
                }
                if let Some(count) = bool_query.minimum_should_match {
                    body.insert("minimum_should_match".to_string(), json!(count));
                }
                if let Some(boost) = bool_query.boost {
                    body.insert("boost".to_string(), json!(boost));
                }
                json!({ "bool": body })
            }
            QueryNode::Match { field, query } => json!({
                "match": { field.as_str(): { "query": query } }
            }),
            QueryNode::MultiMatch { query, fields } => json!({
                "multi_match": {
                    "query": query,
                    "fields": fields_json(fields),
                }
            }),
            QueryNode::Term {
                field,
                value,
                case_insensitive,
                boost,
            } => json!({
                "term": {
                    field.as_str(): {
                        "value": value,
                        "case_insensitive": case_insensitive,
                        "boost": boost,
                    }
                }
            }),
            QueryNode::Terms { field, values } => json!({
                "terms": { field.as_str(): values }
            }),
            QueryNode::Prefix { field, value, boost } => json!({
                "prefix": { field.as_str(): { "value": value, "boost": boost } }
            }),
            QueryNode::Wildcard { field, value } => json!({
                "wildcard": { field.as_str(): { "value": value } }
            }),
            QueryNode::Range { field, bounds } => {
                let mut range = Map::new();
                for (name, bound) in [
                    ("gt", &bounds.gt),
                    ("gte", &bounds.gte),
                    ("lt", &bounds.lt),
                    ("lte", &bounds.lte),
                ] {
                    if let Some(bound) = bound {
                        range.insert(name.to_string(), json!(bound));
                    }
                }
                json!({ "range": { field.as_str(): range } })
            }
            QueryNode::Exists { field } => json!({ "exists": { "field": field } }),
            QueryNode::SimpleQueryString {
                query,
                fields,
                boost,
            } => json!({
                "simple_query_string": {
                    "query": query,
                    "fields": fields_json(fields),
                    "default_operator": "and",
                    "analyze_wildcard": true,
                    "boost": boost,
                }
            }),
            QueryNode::QueryString {
                query,
                default_field,
                boost,
            } => json!({
                "query_string": {
                    "query": query,
                    "default_field": default_field,
                    "analyze_wildcard": true,
                    "boost": boost,
                }
            }),
        }
    }

    /// Free-text strings a highlighter should look for
    pub fn highlight_terms(&self) -> Vec<String> {
        let mut terms = Vec::new();
        self.collect_highlight_terms(&mut terms);
        terms
    }

    fn collect_highlight_terms(&self, terms: &mut Vec<String>) {
        match self {
            QueryNode::Bool(bool_query) => {
                for clause in bool_query.must.iter().chain(bool_query.should.iter()) {
                    clause.collect_highlight_terms(terms);
                }
            }
            QueryNode::SimpleQueryString { query, .. } | QueryNode::QueryString { query, .. } => {
                terms.push(query.clone())
            }
            _ => {}
        }
    }
}

/// `terms` aggregation backing one facet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsAggregation {
    /// Facet name as reported to callers
    pub name: String,
    /// Field counted, normally `name.keyword`
    pub field: String,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key; `_score` sorts by relevance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub direction: SortDirection,
}

impl SortClause {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn score() -> Self {
        Self::new("_score", SortDirection::Desc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointInTime {
    pub id: String,
    pub keep_alive: String,
}

/// Pagination of a compiled query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompiledPage {
    Offset {
        from: usize,
        size: usize,
    },
    SearchAfter {
        search_after: Option<Vec<Value>>,
        size: usize,
        point_in_time: Option<PointInTime>,
    },
}

impl CompiledPage {
    pub fn size(&self) -> usize {
        match self {
            CompiledPage::Offset { size, .. } | CompiledPage::SearchAfter { size, .. } => *size,
        }
    }
}

/// Everything the index needs to execute one search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub query: QueryNode,
    pub aggregations: Vec<TermsAggregation>,
    /// Fields to highlight; empty disables highlighting
    pub highlight_fields: Vec<String>,
    pub sort: Vec<SortClause>,
    pub page: CompiledPage,
}

impl CompiledQuery {
    /// Query with default relevance sort and no facets or highlights
    pub fn new(query: QueryNode, from: usize, size: usize) -> Self {
        Self {
            query,
            aggregations: Vec::new(),
            highlight_fields: Vec::new(),
            sort: vec![SortClause::score()],
            page: CompiledPage::Offset { from, size },
        }
    }

    pub fn point_in_time(&self) -> Option<&PointInTime> {
        match &self.page {
            CompiledPage::SearchAfter { point_in_time, .. } => point_in_time.as_ref(),
            CompiledPage::Offset { .. } => None,
        }
    }

    /// Elasticsearch `_search` request body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "query": self.query.to_json(),
            "track_total_hits": true,
            "sort": self
                .sort
                .iter()
                .map(|clause| json!({ clause.field.as_str(): { "order": clause.direction } }))
                .collect::<Vec<_>>(),
        });

        match &self.page {
            CompiledPage::Offset { from, size } => {
                body["from"] = json!(from);
                body["size"] = json!(size);
            }
            CompiledPage::SearchAfter {
                search_after,
                size,
                point_in_time,
            } => {
                body["size"] = json!(size);
                if let Some(search_after) = search_after {
                    body["search_after"] = json!(search_after);
                }
                if let Some(pit) = point_in_time {
                    body["pit"] = json!({ "id": pit.id, "keep_alive": pit.keep_alive });
                }
            }
        }

        if !self.aggregations.is_empty() {
            let aggregations: Map<String, Value> = self
                .aggregations
                .iter()
                .map(|aggregation| {
                    (
                        aggregation.name.clone(),
                        json!({ "terms": { "field": aggregation.field, "size": aggregation.size } }),
                    )
                })
                .collect();
            body["aggs"] = Value::Object(aggregations);
        }

        if !self.highlight_fields.is_empty() {
            let fields: Map<String, Value> = self
                .highlight_fields
                .iter()
                .map(|field| (field.clone(), json!({})))
                .collect();
            body["highlight"] = json!({
                "pre_tags": [""],
                "post_tags": [""],
                "fields": fields,
            });
        }

        body
    }
}
