//! Network abstraction layer for production and scripted environments
//!
//! Provides a unified trait for upstream HTTP requests, so the search
//! executor and the detail fetcher run the same logic against real catalog
//! APIs and against scripted responses in tests.

#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::{ScriptedNetworkLayer, ScriptedReply};

use crate::retry::{RetryExhausted, RetryPolicy, Retryable, Settled, retry_with_timeout};

/// HTTP response abstraction
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code (200, 404, 500, etc.)
    pub status_code: u16,
    /// Response body bytes
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create new HTTP response with status code and body
    pub fn new(status_code: u16, body: Vec<u8>) -> Self {
        Self { status_code, body }
    }

    /// Returns true if the HTTP status code indicates success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Errors from a single HTTP exchange.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    /// Connection, DNS, TLS or body read failure
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// Upstream answered with a non-success status
    #[error("Upstream {url} returned HTTP {status_code}")]
    Status { url: String, status_code: u16 },

    /// A configured header could not be used
    #[error("Invalid header '{name}'")]
    InvalidHeader { name: String },
}

impl HttpError {
    /// Returns the HTTP status if the upstream answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            HttpError::Status { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl Retryable for HttpError {
    fn is_retryable(&self) -> bool {
        match self {
            HttpError::Transport { .. } => true,
            HttpError::Status { status_code, .. } => *status_code >= 500,
            HttpError::InvalidHeader { .. } => false,
        }
    }
}

/// Network layer abstraction for HTTP operations
///
/// Implementations return every response the upstream sends, including
/// non-2xx ones; status interpretation happens in [`fetch_with_retry`].
#[async_trait]
pub trait NetworkLayer: Send + Sync {
    /// Performs HTTP GET request with extra request headers
    ///
    /// # Errors
    ///
    /// - `HttpError::Transport` - If the request could not be completed
    /// - `HttpError::InvalidHeader` - If a header name or value is invalid
    async fn http_get(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError>;
}

/// Production HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct ProductionNetworkLayer {
    client: reqwest::Client,
}

impl ProductionNetworkLayer {
    /// Creates a new production network layer.
    ///
    /// Per-attempt deadlines are enforced by the retry wrapper; the client
    /// only bounds connection setup.
    ///
    /// # Errors
    ///
    /// - `HttpError::Transport` - If the underlying client cannot be built
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| HttpError::Transport {
                url: String::new(),
                reason: format!("client setup failed: {e}"),
            })?;

        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NetworkLayer for ProductionNetworkLayer {
    async fn http_get(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<HttpResponse, HttpError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| HttpError::InvalidHeader { name: name.clone() })?;
            let header_value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|_| HttpError::InvalidHeader { name: name.clone() })?;
            request = request.header(header_name, header_value);
        }

        let response = request.send().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status_code = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            reason: format!("reading body: {e}"),
        })?;

        Ok(HttpResponse::new(status_code, body.to_vec()))
    }
}

/// GET `url` under `policy`, treating non-2xx statuses as errors.
///
/// 5xx responses and transport failures are retried within the budget;
/// 4xx responses settle immediately.
///
/// # Errors
///
/// - `RetryExhausted<HttpError>` - The call did not produce a 2xx response
pub async fn fetch_with_retry(
    layer: &dyn NetworkLayer,
    policy: &RetryPolicy,
    url: &str,
    headers: &BTreeMap<String, String>,
) -> Result<Settled<HttpResponse>, RetryExhausted<HttpError>> {
    retry_with_timeout(policy, url, |_| async move {
        let response = layer.http_get(url, headers).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(HttpError::Status {
                url: url.to_string(),
                status_code: response.status_code,
            })
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{AttemptError, RetryStrategy};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempt_timeout: Duration::from_millis(200),
            max_retries: 2,
            strategy: RetryStrategy::Immediate,
        }
    }

    #[test]
    fn test_status_retry_classification() {
        let server_error = HttpError::Status {
            url: "u".to_string(),
            status_code: 503,
        };
        let not_found = HttpError::Status {
            url: "u".to_string(),
            status_code: 404,
        };

        assert!(server_error.is_retryable());
        assert!(!not_found.is_retryable());
        assert_eq!(not_found.status_code(), Some(404));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_success() {
        let layer = ScriptedNetworkLayer::new();
        layer.script(
            "/flaky",
            vec![
                ScriptedReply::status(500),
                ScriptedReply::status(502),
                ScriptedReply::json(r#"{"ok":true}"#),
            ],
        );

        let settled = fetch_with_retry(&layer, &fast_policy(), "http://x/flaky", &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(settled.attempts, 3);
        assert_eq!(settled.value.body, br#"{"ok":true}"#.to_vec());
        assert_eq!(layer.request_count("/flaky"), 3);
    }

    #[tokio::test]
    async fn test_client_error_settles_immediately() {
        let layer = ScriptedNetworkLayer::new();
        layer.script("/missing", vec![ScriptedReply::status(404)]);

        let exhausted =
            fetch_with_retry(&layer, &fast_policy(), "http://x/missing", &BTreeMap::new())
                .await
                .unwrap_err();

        assert_eq!(exhausted.attempts, 1);
        assert_eq!(exhausted.last.failure().and_then(HttpError::status_code), Some(404));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_upstream_times_out() {
        let layer = ScriptedNetworkLayer::new();
        layer.script("/slow", vec![ScriptedReply::Hang]);

        let exhausted = fetch_with_retry(&layer, &fast_policy(), "http://x/slow", &BTreeMap::new())
            .await
            .unwrap_err();

        assert_eq!(exhausted.attempts, 3);
        assert!(matches!(exhausted.last, AttemptError::TimedOut { .. }));
    }
}
