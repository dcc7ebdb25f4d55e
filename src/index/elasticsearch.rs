//! Remote engine speaking the Elasticsearch REST API

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ElasticsearchConfig;
use crate::error::{Result, SearchError};
use crate::index::{EngineResponse, IndexEngine, IndexHit, WriteOperation};
use crate::models::result::MatchedField;
use crate::query::CompiledQuery;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHitsResponse,
    #[serde(default)]
    aggregations: BTreeMap<String, AggregationResponse>,
    #[serde(default)]
    pit_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHitsResponse {
    total: Option<SearchHitsTotalResponse>,
    hits: Vec<SearchHitResponse>,
}

#[derive(Debug, Deserialize)]
struct SearchHitsTotalResponse {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct SearchHitResponse {
    #[serde(rename = "_index")]
    index: String,

    #[serde(rename = "_id")]
    id: Option<String>,

    #[serde(rename = "_score")]
    score: Option<f64>,

    #[serde(rename = "_source")]
    source: Option<Value>,

    #[serde(default)]
    highlight: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    sort: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct AggregationResponse {
    #[serde(default)]
    buckets: Vec<BucketResponse>,
}

#[derive(Debug, Deserialize)]
struct BucketResponse {
    key: Value,
    doc_count: u64,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct PointInTimeResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

fn bucket_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Highlighted subfields (`name.delimited`) are reported under the base field
fn highlight_field_name(field: &str) -> &str {
    field.split('.').next().unwrap_or(field)
}

impl From<SearchResponse> for EngineResponse {
    fn from(response: SearchResponse) -> Self {
        let total = response
            .hits
            .total
            .map(|total| total.value)
            .unwrap_or(response.hits.hits.len() as u64);

        let hits = response
            .hits
            .hits
            .into_iter()
            .map(|hit| {
                let mut matched_fields: Vec<MatchedField> = Vec::new();
                for (field, fragments) in hit.highlight {
                    let name = highlight_field_name(&field).to_string();
                    for value in fragments {
                        if !matched_fields
                            .iter()
                            .any(|existing| existing.name == name && existing.value == value)
                        {
                            matched_fields.push(MatchedField {
                                name: name.clone(),
                                value,
                            });
                        }
                    }
                }
                IndexHit {
                    index: hit.index,
                    id: hit.id.unwrap_or_default(),
                    score: hit.score.unwrap_or_default() as f32,
                    source: hit.source.unwrap_or(Value::Null),
                    matched_fields,
                    sort_values: hit.sort,
                }
            })
            .collect();

        let aggregations = response
            .aggregations
            .into_iter()
            .map(|(name, aggregation)| {
                let buckets = aggregation
                    .buckets
                    .into_iter()
                    .map(|bucket| (bucket_key(&bucket.key), bucket.doc_count))
                    .collect();
                (name, buckets)
            })
            .collect();

        EngineResponse {
            total,
            hits,
            aggregations,
            point_in_time: response.pit_id,
        }
    }
}

/// Elasticsearch over HTTP
#[derive(Clone)]
pub struct ElasticsearchEngine {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchEngine {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SearchError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        }
    }

    async fn check(response: Response, operation: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(operation, status = %status, "Elasticsearch request failed");
        Err(match status {
            StatusCode::BAD_REQUEST => {
                SearchError::invalid(format!("{} rejected: {}", operation, body))
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                SearchError::UpstreamTimeout(format!("{} timed out", operation))
            }
            _ => SearchError::IndexUnavailable(format!("{} failed with {}: {}", operation, status, body)),
        })
    }

    fn bulk_body(operations: &[WriteOperation]) -> Result<String> {
        let mut body = String::new();
        for operation in operations {
            match operation {
                WriteOperation::Upsert {
                    index,
                    id,
                    document,
                } => {
                    body.push_str(&json!({ "index": { "_index": index, "_id": id } }).to_string());
                    body.push('\n');
                    body.push_str(&serde_json::to_string(document)?);
                    body.push('\n');
                }
                WriteOperation::Delete { index, id } => {
                    body.push_str(&json!({ "delete": { "_index": index, "_id": id } }).to_string());
                    body.push('\n');
                }
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl IndexEngine for ElasticsearchEngine {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn search(&self, indices: &[String], query: &CompiledQuery) -> Result<EngineResponse> {
        // A point-in-time already names its indices
        let path = if query.point_in_time().is_some() {
            "_search".to_string()
        } else {
            format!("{}/_search", indices.join(","))
        };
        let body = query.to_json();
        debug!(path = %path, body = %body, "Elasticsearch search");

        let response = self
            .request(reqwest::Method::POST, &path)
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, "search").await?;
        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.into())
    }

    async fn count(&self, index: &str) -> Result<u64> {
        let response = self
            .request(reqwest::Method::GET, &format!("{}/_count", index))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let response = Self::check(response, "count").await?;
        let parsed: CountResponse = response.json().await?;
        Ok(parsed.count)
    }

    async fn bulk_write(&self, operations: Vec<WriteOperation>) -> Result<()> {
        if operations.is_empty() {
            return Ok(());
        }
        let body = Self::bulk_body(&operations)?;
        let response = self
            .request(reqwest::Method::POST, "_bulk?refresh=true")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let response = Self::check(response, "bulk").await?;
        let parsed: BulkResponse = response.json().await?;
        if parsed.errors {
            let failed = parsed
                .items
                .iter()
                .filter(|item| {
                    item.as_object()
                        .and_then(|actions| actions.values().next())
                        .and_then(|action| action.get("error"))
                        .is_some()
                })
                .count();
            return Err(SearchError::IndexUnavailable(format!(
                "bulk write failed for {} of {} operations",
                failed,
                operations.len()
            )));
        }
        Ok(())
    }

    async fn open_point_in_time(&self, indices: &[String], keep_alive: &str) -> Result<Option<String>> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("{}/_pit?keep_alive={}", indices.join(","), keep_alive),
            )
            .send()
            .await?;
        let response = Self::check(response, "open point-in-time").await?;
        let parsed: PointInTimeResponse = response.json().await?;
        Ok(Some(parsed.id))
    }
}
