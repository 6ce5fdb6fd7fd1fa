//! Per-source query executor.
//!
//! Fetches one page from one source under the shared retry policy and hands
//! the body to the normalization boundary. No relevance filtering happens
//! here; that belongs to the consumer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vidseek_core::network::fetch_with_retry;
use vidseek_core::{AttemptError, NetworkLayer, RetryPolicy, SourceDescriptor};

use crate::errors::FetchError;
use crate::normalize::normalize_search;
use crate::types::VideoRecord;

/// One settled page fetch.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// Normalized records, possibly empty
    pub videos: Vec<VideoRecord>,
    /// Page count the upstream reported
    pub page_count: u32,
    /// Latency of the attempt that settled the call
    pub latency: Duration,
}

/// Fetches a single search page from a single source.
///
/// The orchestrator only depends on this trait, so sessions can be driven
/// by any implementation.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `page` of results for `query` from `source`.
    ///
    /// # Errors
    ///
    /// - `FetchError::TimedOut` - Every attempt hit its deadline
    /// - `FetchError::Network` - Transport failure or HTTP error status
    /// - `FetchError::Upstream` - Upstream reported a failure code
    /// - `FetchError::Parse` - Payload could not be normalized
    async fn fetch_page(
        &self,
        source: &SourceDescriptor,
        query: &str,
        page: u32,
    ) -> Result<PageResult, FetchError>;
}

/// HTTP-backed [`PageFetcher`].
#[derive(Clone)]
pub struct SourceExecutor {
    network: Arc<dyn NetworkLayer>,
    policy: RetryPolicy,
}

impl SourceExecutor {
    /// Creates an executor over an arbitrary network layer.
    pub fn new(network: Arc<dyn NetworkLayer>, policy: RetryPolicy) -> Self {
        Self { network, policy }
    }
}

#[async_trait]
impl PageFetcher for SourceExecutor {
    async fn fetch_page(
        &self,
        source: &SourceDescriptor,
        query: &str,
        page: u32,
    ) -> Result<PageResult, FetchError> {
        let url = source.search_url(query, page);

        let settled = match fetch_with_retry(&*self.network, &self.policy, &url, &source.headers)
            .await
        {
            Ok(settled) => settled,
            Err(exhausted) => {
                tracing::warn!(
                    source = %source.id,
                    page,
                    attempts = exhausted.attempts,
                    latency_ms = exhausted.latency.as_millis() as u64,
                    error = %exhausted.last,
                    "Search page fetch failed"
                );
                return Err(match exhausted.last {
                    AttemptError::TimedOut { .. } => FetchError::TimedOut {
                        source_id: source.id.clone(),
                        attempts: exhausted.attempts,
                    },
                    AttemptError::Failed(e) => FetchError::Network {
                        source_id: source.id.clone(),
                        reason: e.to_string(),
                    },
                });
            }
        };

        let latency = settled.latency;
        let normalized = normalize_search(&source.id, &settled.value.body, latency.as_millis() as u64)
            .inspect_err(|e| {
                tracing::warn!(
                    source = %source.id,
                    page,
                    latency_ms = latency.as_millis() as u64,
                    error = %e,
                    "Search page rejected"
                );
            })?;

        tracing::debug!(
            source = %source.id,
            page,
            videos = normalized.videos.len(),
            page_count = normalized.page_count,
            latency_ms = latency.as_millis() as u64,
            attempts = settled.attempts,
            "Search page fetched"
        );

        Ok(PageResult {
            videos: normalized.videos,
            page_count: normalized.page_count,
            latency,
        })
    }
}
