//! Index naming, engines and the reader/writer adapters
//!
//! ```text
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │     IndexReader      │   │     IndexWriter      │
//! │  search / browse     │   │  upsert / delete     │
//! └──────────┬───────────┘   └──────────┬───────────┘
//!            └────────────┬─────────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │  dyn IndexEngine    │
//!              ├─────────────────────┤
//!              │ InMemoryIndexEngine │
//!              │ TantivyIndexEngine  │
//!              │ ElasticsearchEngine │
//!              └─────────────────────┘
//! ```

mod convention;
mod elasticsearch;
mod fields;
mod hits;
mod memory;
mod reader;
mod tantivy_engine;
mod writer;

pub use convention::IndexConvention;
pub use elasticsearch::ElasticsearchEngine;
pub use hits::compare_tuples;
pub use memory::InMemoryIndexEngine;
pub use reader::IndexReader;
pub use tantivy_engine::TantivyIndexEngine;
pub use writer::IndexWriter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::models::result::MatchedField;
use crate::query::CompiledQuery;

/// One hit returned by an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub index: String,
    /// Document id, the entity urn
    pub id: String,
    pub score: f32,
    pub source: Value,
    pub matched_fields: Vec<MatchedField>,
    pub sort_values: Vec<Value>,
}

/// Raw engine answer to a compiled query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    /// Every match, independent of paging
    pub total: u64,
    pub hits: Vec<IndexHit>,
    /// aggregation name -> value -> document count
    pub aggregations: BTreeMap<String, BTreeMap<String, u64>>,
    /// Point-in-time to continue with, when the engine keeps one
    pub point_in_time: Option<String>,
}

/// A bulk write operation, idempotent by document id
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    Upsert {
        index: String,
        id: String,
        document: Value,
    },
    Delete {
        index: String,
        id: String,
    },
}

impl WriteOperation {
    pub fn index(&self) -> &str {
        match self {
            WriteOperation::Upsert { index, .. } | WriteOperation::Delete { index, .. } => index,
        }
    }
}

/// Capability interface over a document index
#[async_trait]
pub trait IndexEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Execute `query` across `indices` (names or `*` globs)
    async fn search(&self, indices: &[String], query: &CompiledQuery) -> Result<EngineResponse>;

    /// Number of documents in one index; zero when it does not exist
    async fn count(&self, index: &str) -> Result<u64>;

    async fn bulk_write(&self, operations: Vec<WriteOperation>) -> Result<()>;

    /// Open a point-in-time; engines without snapshot support return `None`
    async fn open_point_in_time(&self, _indices: &[String], _keep_alive: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Whether an index name matches a name or `*` glob
pub(crate) fn index_matches(pattern: &str, index: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == index;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = index;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(remaining) => rest = remaining,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(position) => rest = &rest[position + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches() {
        assert!(index_matches("dataset_index_v2", "dataset_index_v2"));
        assert!(!index_matches("dataset_index_v2", "chart_index_v2"));
        assert!(index_matches("*index_v2", "chart_index_v2"));
        assert!(index_matches("p_*index_v2", "p_chart_index_v2"));
        assert!(!index_matches("p_*index_v2", "q_chart_index_v2"));
        assert!(!index_matches("*index_v2", "chart_aspect_v1"));
        assert!(index_matches("*", "anything"));
    }
}
