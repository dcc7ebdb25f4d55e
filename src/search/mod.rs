//! Entity search and lineage search
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              SearchService                      │
//! ├─────────────────────────────────────────────────┤
//! │  - search()          - search_across_lineage()  │
//! │  - browse()          - scroll_across_entities() │
//! └─────────────────────────────────────────────────┘
//!            │                          │
//!            ▼                          ▼
//! ┌──────────────────────┐   ┌──────────────────────┐
//! │ CachingEntitySearch  │   │ LineageSearchService │
//! │ Aggregator           │   │  graph ∥ doc counts  │
//! └──────────┬───────────┘   │  lightning/filtered  │
//!            │               └──────────┬───────────┘
//!            ▼                          │
//! ┌────────────────────────┐            │
//! │ EntitySearchAggregator │◄───────────┘
//! │  fan-out, merge, rank  │
//! └──────────┬─────────────┘
//!            ▼
//!   QueryCompiler → IndexReader → dyn IndexEngine
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lineage_search::config::Config;
//! use lineage_search::index::InMemoryIndexEngine;
//! use lineage_search::models::{EntityRegistry, LineageDirection, LineageSearchRequest, Urn};
//! use lineage_search::search::{InMemoryGraph, SearchService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = EntityRegistry::from_yaml_str(include_str!("../../config/entity-registry.yml"))?;
//!     let service = SearchService::new(
//!         &Config::default(),
//!         Arc::new(registry),
//!         Arc::new(InMemoryIndexEngine::new()),
//!         Arc::new(InMemoryGraph::new()),
//!     );
//!
//!     let request = LineageSearchRequest::new(
//!         Urn::new("urn:li:dataset:(urn:li:dataPlatform:hive,db.orders,PROD)"),
//!         LineageDirection::Downstream,
//!     )
//!     .with_max_hops(3);
//!     let result = service.search_across_lineage(&request).await?;
//!     println!("Found {} downstream entities", result.num_entities);
//!
//!     Ok(())
//! }
//! ```

mod aggregator;
mod graph;
mod lineage;
mod lineage_filter;
mod ranker;
mod service;

pub use aggregator::{CachingEntitySearchAggregator, EntitySearchAggregator, ENTITY_FACET};
pub use graph::{GraphTraversal, InMemoryGraph, LineageQuery};
pub use lineage::{LineagePath, LineageSearchService};
pub use lineage_filter::{is_lineage_criterion, DEGREE_FIELD};
pub use ranker::{Ranker, SimpleRanker};
pub use service::SearchService;
