use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
    state::NotKeyed,
};
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::error::{Result, StockpileError};

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second
const PREVIEW_CHARS: usize = 200;

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Shared HTTP transport for the providers.
///
/// Wraps a `reqwest::Client` with a fixed user agent, a mandatory request timeout and a
/// token-bucket throttle. The throttle caps individual requests (one entity fetch
/// issues many), while [`RateLimiter`](crate::RateLimiter) spaces out whole entity
/// fetches.
///
/// HTTP 429 responses are honored: the client waits for `Retry-After` (or an
/// exponential backoff with jitter) and tries again, up to five times. Any other
/// failure is returned to the caller as is; a failed field is not retried.
///
/// ```text
/// Token Bucket (capacity: N tokens)
/// ┌──────────────────────────┐
/// │ ████████████████████████ │  ← Tokens refill at N/sec
/// └──────────────────────────┘
///      ↓ consume on request
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    throttle: Arc<Governor>,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration, requests_per_second: u32) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| StockpileError::ConfigError(format!("Invalid user agent: {}", e)))?,
        );

        if timeout.is_zero() {
            return Err(StockpileError::ConfigError(
                "HTTP timeout must be greater than zero".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| {
                StockpileError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        let throttle = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(requests_per_second).ok_or_else(|| {
                StockpileError::ConfigError("Rate limit must be greater than zero".to_string())
            })?,
        )));

        Ok(Self { client, throttle })
    }

    fn calculate_backoff(retry: u32) -> Duration {
        let backoff_ms = INITIAL_BACKOFF_MS * (2_u64.pow(retry));
        // ±20% jitter
        let jitter = (backoff_ms as f64 * 0.2 * (fastrand::f64() - 0.5)) as i64;
        Duration::from_millis((backoff_ms as i64 + jitter) as u64)
    }

    /// GETs `url` with the given query parameters and returns the body as text.
    ///
    /// # Errors
    ///
    /// * `StockpileError::NotFound` for HTTP 404.
    /// * `StockpileError::RateLimitExceeded` once 429 retries are exhausted.
    /// * `StockpileError::InvalidResponse` for any other non-success status.
    /// * `StockpileError::RequestError` for transport failures, timeouts included.
    pub async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        let mut retries = 0;

        loop {
            self.throttle.until_ready().await;

            let response = self.client.get(url).query(query).send().await?;
            let status = response.status();

            match status {
                s if s.is_success() => return Ok(response.text().await?),
                reqwest::StatusCode::NOT_FOUND => return Err(StockpileError::NotFound),
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    if retries >= MAX_RETRIES {
                        return Err(StockpileError::RateLimitExceeded);
                    }

                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|h| h.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| Self::calculate_backoff(retries));

                    tracing::warn!(
                        "Rate limit hit (429) for {}. Attempt {}/{}. Waiting for {:?} before retry.",
                        url,
                        retries + 1,
                        MAX_RETRIES + 1,
                        retry_after
                    );
                    sleep(retry_after).await;
                    retries += 1;
                }
                other_status => {
                    let error_body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to read error body".to_string());

                    return Err(StockpileError::InvalidResponse(format!(
                        "Unexpected status code: {} for URL: {}. Response preview: {}",
                        other_status,
                        url,
                        preview(&error_body)
                    )));
                }
            }
        }
    }

    /// GETs `url` and parses the body as JSON.
    ///
    /// Upstreams occasionally serve JSON with a `text/html` content type, so the body
    /// is sniffed rather than trusting the header; an actual HTML page becomes
    /// `StockpileError::UnexpectedContentType`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let body = self.get(url, query).await?;
        parse_json_body(url, &body)
    }

    /// Fetches a URL purely for its side effects on the cookie store.
    pub(crate) async fn touch(&self, url: &str) -> Result<()> {
        self.throttle.until_ready().await;
        let response = self.client.get(url).send().await?;
        tracing::trace!("touched {url}: {}", response.status());
        Ok(())
    }
}

pub(crate) fn parse_json_body<T: DeserializeOwned>(url: &str, body: &str) -> Result<T> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        return Err(StockpileError::UnexpectedContentType {
            url: url.to_string(),
            expected_pattern: "application/json".to_string(),
            got_content_type: "text/html".to_string(),
            content_preview: preview(body),
        });
    }
    Ok(serde_json::from_str(trimmed)?)
}

fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_CHARS).collect()
}
