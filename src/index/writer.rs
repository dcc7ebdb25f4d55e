use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::cache::DocCountCache;
use crate::error::{Result, SearchError};
use crate::index::{IndexConvention, IndexEngine, WriteOperation};
use crate::models::urn::Urn;
use crate::query::URN_FIELD;
use crate::resilience::UpstreamPolicy;

/// Upserts and deletes entity documents, idempotent by urn.
///
/// Writes run under the index deadline and are never retried.
#[derive(Clone)]
pub struct IndexWriter {
    engine: Arc<dyn IndexEngine>,
    convention: Arc<IndexConvention>,
    policy: UpstreamPolicy,
    doc_counts: Option<Arc<DocCountCache>>,
}

impl IndexWriter {
    pub fn new(
        engine: Arc<dyn IndexEngine>,
        convention: Arc<IndexConvention>,
        policy: UpstreamPolicy,
    ) -> Self {
        Self {
            engine,
            convention,
            policy,
            doc_counts: None,
        }
    }

    /// Invalidate `doc_counts` after every write
    pub fn with_doc_counts(mut self, doc_counts: Arc<DocCountCache>) -> Self {
        self.doc_counts = Some(doc_counts);
        self
    }

    /// Index `document` for `urn`, replacing any previous version
    pub async fn upsert(&self, entity: &str, urn: &Urn, document: Value) -> Result<()> {
        let Value::Object(mut fields) = document else {
            return Err(SearchError::invalid("document must be a JSON object"));
        };
        fields.insert(URN_FIELD.to_string(), Value::String(urn.to_string()));

        let index = self.convention.entity_index_name(entity);
        self.write(
            entity,
            WriteOperation::Upsert {
                index: index.clone(),
                id: urn.to_string(),
                document: Value::Object(fields),
            },
        )
        .await?;
        info!(index = %index, urn = %urn, "Upserted document");
        Ok(())
    }

    /// Remove the document of `urn`; deleting a missing document succeeds
    pub async fn delete(&self, entity: &str, urn: &Urn) -> Result<()> {
        let index = self.convention.entity_index_name(entity);
        self.write(
            entity,
            WriteOperation::Delete {
                index: index.clone(),
                id: urn.to_string(),
            },
        )
        .await?;
        info!(index = %index, urn = %urn, "Deleted document");
        Ok(())
    }

    async fn write(&self, entity: &str, operation: WriteOperation) -> Result<()> {
        let outcome = self
            .policy
            .call("bulk_write", self.engine.bulk_write(vec![operation]))
            .await;
        if let Some(doc_counts) = &self.doc_counts {
            doc_counts.invalidate(entity).await;
        }
        outcome.map_err(|e| match e {
            SearchError::UpstreamTimeout(_) | SearchError::IndexUnavailable(_) => e,
            other => SearchError::IndexUnavailable(other.to_string()),
        })
    }
}
