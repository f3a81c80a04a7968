//! Rate-limited HTTP client for upstream services
//!
//! Wraps a reqwest client with a shared per-minute request budget and a hard
//! deadline per call. Callers that must not fail use
//! [`ProxyClient::get_or_fallback`].

use governor::{clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Upstream error: {status}")]
    Upstream { status: u16 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Client setup failed: {0}")]
    Setup(String),
}

/// Status and decoded body of an upstream reply
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Value,
}

/// Upstream body, or the fallback payload when the call failed
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub body: Value,
    pub fallback: bool,
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Cloning shares the connection pool and the request budget.
#[derive(Clone)]
pub struct ProxyClient {
    client: Client,
    limiter: Arc<DirectLimiter>,
    timeout: Duration,
}

impl ProxyClient {
    pub fn new(rate_limit_per_minute: u32, timeout: Duration) -> Result<Self, ProviderError> {
        let rate = NonZeroU32::new(rate_limit_per_minute).unwrap_or(nonzero!(1u32));

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("keygate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            limiter: Arc::new(RateLimiter::direct(Quota::per_minute(rate))),
            timeout,
        })
    }

    /// GET `url`, waiting for budget and giving up after the configured timeout.
    /// Non-JSON bodies are wrapped as `{"raw": <text>}`.
    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<ProxyResponse, ProviderError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| ProviderError::InvalidRequest(e.to_string()))?;
            header_map.insert(name, value);
        }

        let request = async {
            self.limiter.until_ready().await;
            debug!(%url, "Calling upstream");

            let response = self.client.get(url).headers(header_map).send().await?;
            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60);
                return Err(ProviderError::RateLimited { retry_after_secs: retry_after });
            }
            if !status.is_success() {
                return Err(ProviderError::Upstream { status: status.as_u16() });
            }

            let text = response.text().await?;
            let body = serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({ "raw": text }));
            Ok::<_, ProviderError>(ProxyResponse { status: status.as_u16(), body })
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ProviderError::Timeout(self.timeout))?
    }

    /// Like [`Self::get`], but any failure yields `fallback` instead.
    pub async fn get_or_fallback(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        fallback: impl FnOnce() -> Value,
    ) -> UpstreamReply {
        match self.get(url, headers).await {
            Ok(reply) => UpstreamReply { body: reply.body, fallback: false },
            Err(e) => {
                warn!(error = %e, "Upstream call failed, serving fallback");
                UpstreamReply { body: fallback(), fallback: true }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unreachable_upstream_falls_back() {
        let client = ProxyClient::new(60, Duration::from_millis(500)).unwrap();
        let reply = client
            .get_or_fallback("http://127.0.0.1:9/nothing", &[], || json!({ "answer": "offline" }))
            .await;
        assert!(reply.fallback);
        assert_eq!(reply.body, json!({ "answer": "offline" }));
    }

    #[tokio::test]
    async fn test_bad_header_is_rejected_before_sending() {
        let client = ProxyClient::new(60, Duration::from_millis(500)).unwrap();
        let err = client
            .get("http://127.0.0.1:9/", &[("bad header", "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[test]
    fn test_zero_budget_is_clamped() {
        assert!(ProxyClient::new(0, Duration::from_secs(1)).is_ok());
    }
}
