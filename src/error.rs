use thiserror::Error;

/// Errors surfaced by the search and lineage layer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// Malformed request, rejected before any upstream call
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An index or graph call exceeded its deadline
    #[error("Upstream call timed out: {0}")]
    UpstreamTimeout(String),

    /// The index engine failed or could not be reached
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// The graph traversal collaborator failed
    #[error("Graph unavailable: {0}")]
    GraphUnavailable(String),

    /// A cached entry could not be decoded
    #[error("Cache corruption: {0}")]
    CacheCorruption(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Get error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            SearchError::InvalidRequest(_) => "INVALID_REQUEST",
            SearchError::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            SearchError::IndexUnavailable(_) => "INDEX_UNAVAILABLE",
            SearchError::GraphUnavailable(_) => "GRAPH_UNAVAILABLE",
            SearchError::CacheCorruption(_) => "CACHE_CORRUPTION",
            SearchError::Configuration(_) => "CONFIGURATION_ERROR",
            SearchError::Serialization(_) => "SERIALIZATION_ERROR",
            SearchError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether an idempotent read may be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SearchError::UpstreamTimeout(_)
                | SearchError::IndexUnavailable(_)
                | SearchError::GraphUnavailable(_)
        )
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        SearchError::InvalidRequest(msg.into())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SearchError {
    fn from(err: serde_yaml::Error) -> Self {
        SearchError::Configuration(err.to_string())
    }
}

impl From<bincode::Error> for SearchError {
    fn from(err: bincode::Error) -> Self {
        SearchError::CacheCorruption(err.to_string())
    }
}

impl From<validator::ValidationErrors> for SearchError {
    fn from(err: validator::ValidationErrors) -> Self {
        SearchError::Configuration(err.to_string())
    }
}

impl From<config::ConfigError> for SearchError {
    fn from(err: config::ConfigError) -> Self {
        SearchError::Configuration(err.to_string())
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        SearchError::IndexUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SearchError::UpstreamTimeout(err.to_string())
        } else {
            SearchError::IndexUnavailable(err.to_string())
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SearchError::InvalidRequest("test".to_string()).error_code(),
            "INVALID_REQUEST"
        );
        assert_eq!(
            SearchError::UpstreamTimeout("test".to_string()).error_code(),
            "UPSTREAM_TIMEOUT"
        );
        assert_eq!(
            SearchError::CacheCorruption("test".to_string()).error_code(),
            "CACHE_CORRUPTION"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SearchError::IndexUnavailable("down".into()).is_retryable());
        assert!(SearchError::GraphUnavailable("down".into()).is_retryable());
        assert!(SearchError::UpstreamTimeout("slow".into()).is_retryable());
        assert!(!SearchError::InvalidRequest("bad".into()).is_retryable());
        assert!(!SearchError::CacheCorruption("bad".into()).is_retryable());
    }
}
