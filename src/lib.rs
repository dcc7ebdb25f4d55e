//! Search query compilation and lineage-aware result caching over a document index.
//!
//! Requests flow through [`search::SearchService`]: entity searches are compiled
//! per entity type by [`query::QueryCompiler`] and fanned out across indices
//! named by [`index::IndexConvention`]; lineage searches reconcile a graph
//! traversal with the index and cache the reconciled result.

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod metrics;
pub mod models;
pub mod query;
pub mod resilience;
pub mod search;

pub use config::Config;
pub use error::{Result, SearchError};
pub use search::SearchService;
