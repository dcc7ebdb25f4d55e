//! Prometheus metrics for search, lineage and the caches.
//!
//! Metrics are created lazily and registered into [`PROMETHEUS_REGISTRY`]
//! by [`init_metrics`]; recording into an unregistered metric is harmless.
//!
//! # Example
//! ```no_run
//! use lineage_search::metrics::CACHE_LOOKUPS_TOTAL;
//!
//! CACHE_LOOKUPS_TOTAL
//!     .with_label_values(&["entity_search", "hit"])
//!     .inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search Metrics
    // ============================================================================

    /// Total number of search requests
    ///
    /// Labels: kind (entity, lineage, scroll, browse), status (success, error)
    pub static ref SEARCH_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_requests_total", "Total number of search requests")
            .namespace("lineage_search"),
        &["kind", "status"]
    ).expect("Failed to create SEARCH_REQUESTS_TOTAL metric");

    /// Search request duration in seconds
    ///
    /// Labels: kind
    pub static ref SEARCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "search_duration_seconds",
            "Search request duration in seconds"
        )
        .namespace("lineage_search")
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["kind"]
    ).expect("Failed to create SEARCH_DURATION_SECONDS metric");

    /// Lineage searches by reconciliation path
    ///
    /// Labels: path (lightning, filtered)
    pub static ref LINEAGE_PATH_TOTAL: CounterVec = CounterVec::new(
        Opts::new("lineage_path_total", "Lineage searches by reconciliation path")
            .namespace("lineage_search"),
        &["path"]
    ).expect("Failed to create LINEAGE_PATH_TOTAL metric");

    // ============================================================================
    // Cache Metrics
    // ============================================================================

    /// Cache lookups by outcome
    ///
    /// Labels: cache, outcome (hit, miss, skip, corrupt)
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("cache_lookups_total", "Cache lookups by outcome")
            .namespace("lineage_search"),
        &["cache", "outcome"]
    ).expect("Failed to create CACHE_LOOKUPS_TOTAL metric");

    // ============================================================================
    // Upstream Metrics
    // ============================================================================

    /// Upstream calls by collaborator and outcome
    ///
    /// Labels: upstream (index, graph), outcome (success, error, timeout, retried)
    pub static ref UPSTREAM_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("upstream_calls_total", "Upstream calls by collaborator and outcome")
            .namespace("lineage_search"),
        &["upstream", "outcome"]
    ).expect("Failed to create UPSTREAM_CALLS_TOTAL metric");

    /// Upstream call duration in seconds
    ///
    /// Labels: upstream
    pub static ref UPSTREAM_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "upstream_duration_seconds",
            "Upstream call duration in seconds"
        )
        .namespace("lineage_search")
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["upstream"]
    ).expect("Failed to create UPSTREAM_DURATION_SECONDS metric");
}

/// Register every metric with the global registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(LINEAGE_PATH_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CACHE_LOOKUPS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(UPSTREAM_CALLS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(UPSTREAM_DURATION_SECONDS.clone()))?;

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Render the registry in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Record one finished search request
pub fn record_search(kind: &str, elapsed_secs: f64, success: bool) {
    let status = if success { "success" } else { "error" };
    SEARCH_REQUESTS_TOTAL.with_label_values(&[kind, status]).inc();
    SEARCH_DURATION_SECONDS
        .with_label_values(&[kind])
        .observe(elapsed_secs);
}
