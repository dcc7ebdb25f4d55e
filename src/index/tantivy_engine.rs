//! Embedded engine backed by one Tantivy index per physical index
//!
//! Every field of the entity spec is indexed three ways: analyzed text under
//! its own name, the raw value under `<field>__keyword` and the lower-cased
//! raw value under `<field>__lower`. The document itself is stored as JSON.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, ConstScoreQuery, DisjunctionMaxQuery, EmptyQuery, Occur,
    Query, RangeQuery, RegexQuery, TermQuery, TermSetQuery,
};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value as TantivyValue, STORED, STRING, TEXT};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, SearchError};
use crate::index::convention::IndexConvention;
use crate::index::fields::{field_values, resolve_field, FieldVariant};
use crate::index::hits::{finish, ScoredDocument};
use crate::index::{index_matches, EngineResponse, IndexEngine, WriteOperation};
use crate::models::entity::EntityRegistry;
use crate::query::{BoolQuery, CompiledQuery, QueryNode, RangeBounds};

const ID_FIELD: &str = "_id";
const SOURCE_FIELD: &str = "_source";
const WRITER_HEAP_SIZE: usize = 20_000_000;

#[derive(Debug, Clone, Copy)]
struct IndexedField {
    text: Field,
    keyword: Field,
    lower: Field,
}

/// One physical index
struct TantivyIndex {
    index: Index,
    fields: BTreeMap<String, IndexedField>,
    id: Field,
    source: Field,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
}

fn build_schema(field_names: &BTreeSet<String>) -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(ID_FIELD, STRING | STORED);
    builder.add_text_field(SOURCE_FIELD, STORED);
    for name in field_names {
        builder.add_text_field(name, TEXT);
        builder.add_text_field(&format!("{}__keyword", name), STRING);
        builder.add_text_field(&format!("{}__lower", name), STRING);
    }
    builder.build()
}

fn schema_field(schema: &Schema, name: &str) -> Result<Field> {
    schema
        .get_field(name)
        .map_err(|e| SearchError::IndexUnavailable(format!("missing field '{}': {}", name, e)))
}

impl TantivyIndex {
    fn open(path: Option<&Path>, field_names: BTreeSet<String>) -> Result<Self> {
        let schema = build_schema(&field_names);
        let index = match path {
            None => Index::create_in_ram(schema.clone()),
            Some(path) => {
                std::fs::create_dir_all(path).map_err(|e| {
                    SearchError::IndexUnavailable(format!("failed to create index directory: {}", e))
                })?;
                if path.join("meta.json").exists() {
                    Index::open_in_dir(path)?
                } else {
                    Index::create_in_dir(path, schema.clone())?
                }
            }
        };

        let schema = index.schema();
        let mut fields = BTreeMap::new();
        for name in field_names {
            let indexed = IndexedField {
                text: schema_field(&schema, &name)?,
                keyword: schema_field(&schema, &format!("{}__keyword", name))?,
                lower: schema_field(&schema, &format!("{}__lower", name))?,
            };
            fields.insert(name, indexed);
        }

        let writer = index.writer_with_num_threads(1, WRITER_HEAP_SIZE)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;

        Ok(Self {
            id: schema_field(&schema, ID_FIELD)?,
            source: schema_field(&schema, SOURCE_FIELD)?,
            index,
            fields,
            writer: Mutex::new(writer),
            reader,
        })
    }

    fn to_document(&self, id: &str, source: &serde_json::Value) -> Result<TantivyDocument> {
        let mut document = TantivyDocument::default();
        document.add_text(self.id, id);
        document.add_text(self.source, serde_json::to_string(source)?);
        for (name, field) in &self.fields {
            let mut values = field_values(source, name);
            if name == "urn" && values.is_empty() {
                values.push(id.to_string());
            }
            for value in values {
                document.add_text(field.text, &value);
                document.add_text(field.keyword, &value);
                document.add_text(field.lower, value.to_lowercase());
            }
        }
        Ok(document)
    }

    async fn write(&self, operations: Vec<WriteOperation>) -> Result<()> {
        let mut writer = self.writer.lock().await;
        for operation in operations {
            match operation {
                WriteOperation::Upsert { id, document, .. } => {
                    writer.delete_term(Term::from_field_text(self.id, &id));
                    writer.add_document(self.to_document(&id, &document)?)?;
                }
                WriteOperation::Delete { id, .. } => {
                    writer.delete_term(Term::from_field_text(self.id, &id));
                }
            }
        }
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }

    fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    fn search(&self, name: &str, query: &CompiledQuery) -> Result<Vec<ScoredDocument>> {
        let searcher = self.reader.searcher();
        let num_docs = searcher.num_docs() as usize;
        if num_docs == 0 {
            return Ok(Vec::new());
        }

        let tantivy_query = self.translate(&query.query)?;
        let top_docs = searcher.search(&*tantivy_query, &TopDocs::with_limit(num_docs))?;

        let mut documents = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let document: TantivyDocument = searcher.doc(address)?;
            let id = document
                .get_first(self.id)
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string();
            let source = match document.get_first(self.source).and_then(|value| value.as_str()) {
                Some(json) => serde_json::from_str(json)?,
                None => serde_json::Value::Null,
            };
            documents.push(ScoredDocument {
                index: name.to_string(),
                id,
                score,
                source,
            });
        }
        Ok(documents)
    }

    fn analyze(&self, field: Field, text: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        while let Some(token) = stream.next() {
            tokens.push(token.text.clone());
        }
        Ok(tokens)
    }

    fn field(&self, name: &str) -> Option<(IndexedField, FieldVariant)> {
        let (base, variant) = resolve_field(name);
        self.fields.get(base).map(|field| (*field, variant))
    }

    fn raw_term(field: Field, value: &str) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(field, value),
            IndexRecordOption::Basic,
        ))
    }

    fn regex(field: Field, pattern: &str) -> Result<Box<dyn Query>> {
        let query = RegexQuery::from_pattern(pattern, field)
            .map_err(|e| SearchError::invalid(format!("invalid pattern '{}': {}", pattern, e)))?;
        Ok(Box::new(query))
    }

    fn boosted(query: Box<dyn Query>, boost: f32) -> Box<dyn Query> {
        if (boost - 1.0).abs() < f32::EPSILON {
            query
        } else {
            Box::new(BoostQuery::new(query, boost))
        }
    }

    fn any_of(clauses: Vec<Box<dyn Query>>) -> Box<dyn Query> {
        match clauses.len() {
            0 => Box::new(EmptyQuery),
            _ => Box::new(BooleanQuery::new(
                clauses.into_iter().map(|clause| (Occur::Should, clause)).collect(),
            )),
        }
    }

    /// Analyzed match on a text field, or exact match on the raw value
    fn text_match(&self, field_name: &str, text: &str) -> Result<Box<dyn Query>> {
        let Some((field, variant)) = self.field(field_name) else {
            return Ok(Box::new(EmptyQuery));
        };
        let mut clauses = Vec::new();
        if matches!(variant, FieldVariant::Keyword | FieldVariant::Any) {
            clauses.push(Self::raw_term(field.keyword, text));
        }
        if variant != FieldVariant::Keyword {
            for token in self.analyze(field.text, text)? {
                clauses.push(Box::new(TermQuery::new(
                    Term::from_field_text(field.text, &token),
                    IndexRecordOption::WithFreqs,
                )) as Box<dyn Query>);
            }
        }
        Ok(Self::any_of(clauses))
    }

    fn translate(&self, node: &QueryNode) -> Result<Box<dyn Query>> {
        Ok(match node {
            QueryNode::MatchAll => Box::new(AllQuery),
            QueryNode::MatchNone => Box::new(EmptyQuery),
            QueryNode::Bool(bool_query) => self.translate_bool(bool_query)?,
            QueryNode::Match { field, query } => self.text_match(field, query)?,
            QueryNode::MultiMatch { query, fields } => {
                let mut disjuncts = Vec::with_capacity(fields.len());
                for (field, boost) in fields {
                    disjuncts.push(Self::boosted(self.text_match(field, query)?, *boost));
                }
                Box::new(DisjunctionMaxQuery::new(disjuncts))
            }
            QueryNode::Term {
                field,
                value,
                case_insensitive,
                boost,
            } => match self.field(field) {
                None => Box::new(EmptyQuery),
                Some((indexed, variant)) => {
                    let exact = if *case_insensitive {
                        Self::raw_term(indexed.lower, &value.to_lowercase())
                    } else {
                        Self::raw_term(indexed.keyword, value)
                    };
                    let query = if variant == FieldVariant::Text {
                        Self::any_of(vec![exact, self.text_match(field, value)?])
                    } else {
                        exact
                    };
                    Self::boosted(query, *boost)
                }
            },
            QueryNode::Terms { field, values } => match self.field(field) {
                None => Box::new(EmptyQuery),
                Some((indexed, _)) => Box::new(TermSetQuery::new(
                    values
                        .iter()
                        .map(|value| Term::from_field_text(indexed.keyword, value)),
                )),
            },
            QueryNode::Prefix { field, value, boost } => match self.field(field) {
                None => Box::new(EmptyQuery),
                Some((indexed, _)) => Self::boosted(
                    Self::regex(indexed.keyword, &format!("{}.*", regex::escape(value)))?,
                    *boost,
                ),
            },
            QueryNode::Wildcard { field, value } => match self.field(field) {
                None => Box::new(EmptyQuery),
                Some((indexed, _)) => Self::regex(indexed.keyword, &glob_pattern(value))?,
            },
            QueryNode::Range { field, bounds } => match self.field(field) {
                None => Box::new(EmptyQuery),
                Some(_) => range_query(field, bounds),
            },
            QueryNode::Exists { field } => match self.field(field) {
                None => Box::new(EmptyQuery),
                Some((indexed, _)) => Self::regex(indexed.keyword, ".+")?,
            },
            QueryNode::SimpleQueryString {
                query,
                fields,
                boost,
            } => Self::boosted(self.simple_query_string(query, fields)?, *boost),
            QueryNode::QueryString {
                query,
                default_field,
                boost,
            } => Self::boosted(self.query_string(query, default_field)?, *boost),
        })
    }

    fn translate_bool(&self, bool_query: &BoolQuery) -> Result<Box<dyn Query>> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for clause in &bool_query.must {
            clauses.push((Occur::Must, self.translate(clause)?));
        }
        for clause in &bool_query.filter {
            clauses.push((
                Occur::Must,
                Box::new(ConstScoreQuery::new(self.translate(clause)?, 0.0)),
            ));
        }

        let required_should = bool_query.required_should();
        if !bool_query.should.is_empty() {
            let mut shoulds = Vec::with_capacity(bool_query.should.len());
            for clause in &bool_query.should {
                shoulds.push(self.translate(clause)?);
            }
            if required_should > 0 && !clauses.is_empty() {
                // At least one should clause alongside must clauses
                clauses.push((Occur::Must, Self::any_of(shoulds)));
            } else {
                clauses.extend(shoulds.into_iter().map(|clause| (Occur::Should, clause)));
            }
        }

        for clause in &bool_query.must_not {
            clauses.push((Occur::MustNot, self.translate(clause)?));
        }
        if !clauses
            .iter()
            .any(|(occur, _)| matches!(occur, Occur::Must | Occur::Should))
        {
            clauses.push((Occur::Must, Box::new(AllQuery)));
        }

        let query: Box<dyn Query> = Box::new(BooleanQuery::new(clauses));
        Ok(Self::boosted(query, bool_query.boost.unwrap_or(1.0)))
    }

    /// Every word required in some field; `word*` is a prefix
    fn simple_query_string(&self, query: &str, fields: &[(String, f32)]) -> Result<Box<dyn Query>> {
        let mut required: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for word in query.split_whitespace() {
            if matches!(word, "+" | "|" | "AND" | "OR") {
                continue;
            }
            let prefix = word.ends_with('*');
            let mut per_field = Vec::new();
            for (field_name, boost) in fields {
                let Some((field, _)) = self.field(field_name) else {
                    continue;
                };
                for token in self.analyze(field.text, word)? {
                    let query = if prefix {
                        Self::regex(field.text, &format!("{}.*", regex::escape(&token)))?
                    } else {
                        Box::new(TermQuery::new(
                            Term::from_field_text(field.text, &token),
                            IndexRecordOption::WithFreqs,
                        )) as Box<dyn Query>
                    };
                    per_field.push(Self::boosted(query, *boost));
                }
            }
            if per_field.is_empty() {
                continue;
            }
            required.push((Occur::Must, Box::new(DisjunctionMaxQuery::new(per_field))));
        }
        if required.is_empty() {
            return Ok(Box::new(AllQuery));
        }
        Ok(Box::new(BooleanQuery::new(required)))
    }

    /// `field:value` or bare words against the default field; any may match
    fn query_string(&self, query: &str, default_field: &str) -> Result<Box<dyn Query>> {
        let mut clauses = Vec::new();
        for part in query.split_whitespace() {
            if matches!(part, "AND" | "OR" | "NOT") {
                continue;
            }
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
                clauses.push(self.translate(&QueryNode::Exists {
                    field: field.to_string(),
                })?);
            } else {
                clauses.push(self.text_match(field, value)?);
            }
        }
        if clauses.is_empty() {
            return Ok(Box::new(AllQuery));
        }
        Ok(Self::any_of(clauses))
    }
}

fn glob_pattern(glob: &str) -> String {
    let mut pattern = String::new();
    for c in glob.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern
}

/// Lexicographic range over the raw value
fn range_query(field: &str, bounds: &RangeBounds) -> Box<dyn Query> {
    let (base, _) = resolve_field(field);
    let lower = match (&bounds.gt, &bounds.gte) {
        (Some(gt), _) => Bound::Excluded(gt.as_str()),
        (None, Some(gte)) => Bound::Included(gte.as_str()),
        (None, None) => Bound::Unbounded,
    };
    let upper = match (&bounds.lt, &bounds.lte) {
        (Some(lt), _) => Bound::Excluded(lt.as_str()),
        (None, Some(lte)) => Bound::Included(lte.as_str()),
        (None, None) => Bound::Unbounded,
    };
    Box::new(RangeQuery::new_str_bounds(
        format!("{}__keyword", base),
        lower,
        upper,
    ))
}

/// Tantivy-backed engine; indices are created on first write
pub struct TantivyIndexEngine {
    registry: Arc<EntityRegistry>,
    convention: Arc<IndexConvention>,
    /// `None` keeps every index in RAM
    root: Option<PathBuf>,
    indices: DashMap<String, Arc<TantivyIndex>>,
}

impl TantivyIndexEngine {
    pub fn in_memory(registry: Arc<EntityRegistry>, convention: Arc<IndexConvention>) -> Self {
        Self {
            registry,
            convention,
            root: None,
            indices: DashMap::new(),
        }
    }

    pub fn open_in_dir(
        registry: Arc<EntityRegistry>,
        convention: Arc<IndexConvention>,
        root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            convention,
            root: Some(root.into()),
            indices: DashMap::new(),
        }
    }

    /// Open (or create, when `create` is set) the index for a physical name
    fn index(&self, name: &str, create: bool) -> Result<Option<Arc<TantivyIndex>>> {
        if let Some(index) = self.indices.get(name) {
            return Ok(Some(index.clone()));
        }

        let path = self.root.as_ref().map(|root| root.join(name));
        let exists_on_disk = path
            .as_ref()
            .map(|path| path.join("meta.json").exists())
            .unwrap_or(false);
        if !create && !exists_on_disk {
            return Ok(None);
        }

        let entity = self.convention.entity_name_from_index(name).ok_or_else(|| {
            SearchError::IndexUnavailable(format!("'{}' is not an entity index", name))
        })?;
        let spec = self.registry.get(&entity).ok_or_else(|| {
            SearchError::IndexUnavailable(format!("no entity spec for index '{}'", name))
        })?;

        let mut field_names: BTreeSet<String> =
            spec.fields.iter().map(|field| field.name.clone()).collect();
        field_names.insert("urn".to_string());

        let opened = Arc::new(TantivyIndex::open(path.as_deref(), field_names)?);
        info!(index = %name, entity = %spec.name, "Opened tantivy index");
        Ok(Some(
            self.indices
                .entry(name.to_string())
                .or_insert(opened)
                .clone(),
        ))
    }

    fn resolve(&self, indices: &[String]) -> Result<Vec<(String, Arc<TantivyIndex>)>> {
        let mut resolved = Vec::new();
        for pattern in indices {
            if pattern.contains('*') {
                for entry in self.indices.iter() {
                    if index_matches(pattern, entry.key()) {
                        resolved.push((entry.key().clone(), entry.value().clone()));
                    }
                }
            } else if let Some(index) = self.index(pattern, false)? {
                resolved.push((pattern.clone(), index));
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl IndexEngine for TantivyIndexEngine {
    fn name(&self) -> &'static str {
        "tantivy"
    }

    async fn search(&self, indices: &[String], query: &CompiledQuery) -> Result<EngineResponse> {
        let mut documents = Vec::new();
        for (name, index) in self.resolve(indices)? {
            documents.extend(index.search(&name, query)?);
        }
        debug!(indices = ?indices, matches = documents.len(), "Tantivy search");
        Ok(finish(query, documents))
    }

    async fn count(&self, index: &str) -> Result<u64> {
        Ok(self
            .index(index, false)?
            .map(|index| index.num_docs())
            .unwrap_or(0))
    }

    async fn bulk_write(&self, operations: Vec<WriteOperation>) -> Result<()> {
        let mut grouped: BTreeMap<String, Vec<WriteOperation>> = BTreeMap::new();
        for operation in operations {
            grouped
                .entry(operation.index().to_string())
                .or_default()
                .push(operation);
        }
        for (name, operations) in grouped {
            let index = self.index(&name, true)?.ok_or_else(|| {
                SearchError::IndexUnavailable(format!("index '{}' could not be opened", name))
            })?;
            index.write(operations).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::{EntitySpec, FieldType, SearchableField};
    use crate::query::{BoolQuery, CompiledQuery};
    use serde_json::json;

    fn engine() -> TantivyIndexEngine {
        let registry = EntityRegistry::new(vec![EntitySpec::new(
            "testEntity",
            vec![
                SearchableField::new("urn", FieldType::UrnPartial),
                SearchableField::new("keyPart1", FieldType::Text),
                SearchableField::new("platform", FieldType::UrnPartial),
                SearchableField::new("removed", FieldType::Boolean),
            ],
        )]);
        TantivyIndexEngine::in_memory(Arc::new(registry), Arc::new(IndexConvention::new(None)))
    }

    async fn seed(engine: &TantivyIndexEngine) {
        engine
            .bulk_write(vec![
                WriteOperation::Upsert {
                    index: "testentity_index_v2".to_string(),
                    id: "urn:li:testEntity:a".to_string(),
                    document: json!({ "urn": "urn:li:testEntity:a", "keyPart1": "alpha sales", "platform": "hive" }),
                },
                WriteOperation::Upsert {
                    index: "testentity_index_v2".to_string(),
                    id: "urn:li:testEntity:b".to_string(),
                    document: json!({ "urn": "urn:li:testEntity:b", "keyPart1": "beta", "platform": "kafka", "removed": true }),
                },
            ])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_count_and_match() {
        let engine = engine();
        seed(&engine).await;
        assert_eq!(engine.count("testentity_index_v2").await.unwrap(), 2);
        assert_eq!(engine.count("chart_index_v2").await.unwrap(), 0);

        let query = CompiledQuery::new(
            QueryNode::SimpleQueryString {
                query: "sales".to_string(),
                fields: vec![("keyPart1".to_string(), 1.0)],
                boost: 1.0,
            },
            0,
            10,
        );
        let response = engine
            .search(&["testentity_index_v2".to_string()], &query)
            .await
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.hits[0].id, "urn:li:testEntity:a");
        assert_eq!(response.hits[0].source["platform"], "hive");
    }

    #[tokio::test]
    async fn test_bool_filters() {
        let engine = engine();
        seed(&engine).await;

        let not_removed = BoolQuery::new()
            .must(QueryNode::MatchAll)
            .must_not(QueryNode::Match {
                field: "removed".to_string(),
                query: "true".to_string(),
            })
            .into_node();
        let response = engine
            .search(&["*index_v2".to_string()], &CompiledQuery::new(not_removed, 0, 10))
            .await
            .unwrap();
        assert_eq!(response.total, 1);

        let terms = QueryNode::terms("platform.keyword", vec!["kafka".to_string(), "x".to_string()]);
        let response = engine
            .search(&["testentity_index_v2".to_string()], &CompiledQuery::new(terms, 0, 10))
            .await
            .unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].id, "urn:li:testEntity:b");

        let insensitive = QueryNode::Term {
            field: "platform.keyword".to_string(),
            value: "HIVE".to_string(),
            case_insensitive: true,
            boost: 1.0,
        };
        let response = engine
            .search(&["testentity_index_v2".to_string()], &CompiledQuery::new(insensitive, 0, 10))
            .await
            .unwrap();
        assert_eq!(response.total, 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_removes() {
        let engine = engine();
        seed(&engine).await;
        engine
            .bulk_write(vec![
                WriteOperation::Upsert {
                    index: "testentity_index_v2".to_string(),
                    id: "urn:li:testEntity:a".to_string(),
                    document: json!({ "urn": "urn:li:testEntity:a", "keyPart1": "gamma" }),
                },
                WriteOperation::Delete {
                    index: "testentity_index_v2".to_string(),
                    id: "urn:li:testEntity:b".to_string(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(engine.count("testentity_index_v2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_index_rejected_on_write() {
        let engine = engine();
        let result = engine
            .bulk_write(vec![WriteOperation::Delete {
                index: "chart_index_v2".to_string(),
                id: "urn:li:chart:1".to_string(),
            }])
            .await;
        assert!(matches!(result, Err(SearchError::IndexUnavailable(_))));
    }
}
