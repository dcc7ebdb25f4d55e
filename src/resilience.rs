//! Deadlines and the single fast retry for upstream reads.
//!
//! Every index and graph call runs under a deadline. Idempotent reads that
//! fail with a retryable error get exactly one more attempt after a short
//! backoff; writes are never retried.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::config::UpstreamConfig;
use crate::error::{Result, SearchError};
use crate::metrics::{UPSTREAM_CALLS_TOTAL, UPSTREAM_DURATION_SECONDS};

/// Which collaborator a call goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Index,
    Graph,
}

impl Upstream {
    fn label(&self) -> &'static str {
        match self {
            Upstream::Index => "index",
            Upstream::Graph => "graph",
        }
    }
}

/// Deadline and retry settings for one collaborator
#[derive(Debug, Clone)]
pub struct UpstreamPolicy {
    upstream: Upstream,
    deadline: Duration,
    retry_reads: bool,
    backoff: Duration,
}

impl UpstreamPolicy {
    pub fn new(upstream: Upstream, config: &UpstreamConfig) -> Self {
        let deadline = match upstream {
            Upstream::Index => config.index_timeout(),
            Upstream::Graph => config.graph_timeout(),
        };
        Self {
            upstream,
            deadline,
            retry_reads: config.retry_reads,
            backoff: config.retry_backoff(),
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Same policy with the caller's deadline, when one was supplied
    pub fn with_deadline(&self, deadline: Option<Duration>) -> Self {
        let mut policy = self.clone();
        if let Some(deadline) = deadline {
            policy.deadline = deadline;
        }
        policy
    }

    /// Run one call under the deadline
    pub async fn call<T, Fut>(&self, operation: &str, future: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let label = self.upstream.label();
        let started = Instant::now();
        let outcome = timeout(self.deadline, future).await;
        UPSTREAM_DURATION_SECONDS
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(value)) => {
                UPSTREAM_CALLS_TOTAL.with_label_values(&[label, "success"]).inc();
                Ok(value)
            }
            Ok(Err(e)) => {
                UPSTREAM_CALLS_TOTAL.with_label_values(&[label, "error"]).inc();
                Err(e)
            }
            Err(_) => {
                UPSTREAM_CALLS_TOTAL.with_label_values(&[label, "timeout"]).inc();
                Err(SearchError::UpstreamTimeout(format!(
                    "{} {} exceeded {:?}",
                    label, operation, self.deadline
                )))
            }
        }
    }

    /// Run an idempotent read, retrying once on a retryable failure
    pub async fn read<T, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.call(operation, attempt()).await {
            Err(e) if self.retry_reads && e.is_retryable() => {
                warn!(
                    upstream = self.upstream.label(),
                    operation,
                    error = %e,
                    "Upstream read failed, retrying once"
                );
                UPSTREAM_CALLS_TOTAL
                    .with_label_values(&[self.upstream.label(), "retried"])
                    .inc();
                sleep(self.backoff).await;
                self.call(operation, attempt()).await
            }
            other => other,
        }
    }
}
