//! Retrying HTTP fetch layer for unreliable upstream APIs
//!
//! Failures are classified before deciding whether to retry:
//! - 429 surfaces immediately as [`FetchError::RateLimited`]
//! - 5xx, timeouts and connection failures are retried with exponential
//!   backoff plus jitter
//! - any other 4xx and malformed bodies surface immediately

use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use tokenagg_core::{FetchError, FetchResult, RetryConfig};

/// JSON GET capability consumed by the source adapters
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> FetchResult<Value>;
}

/// HTTP client bound to one upstream base URL
pub struct RetryingFetcher {
    client: Client,
    base_url: String,
    config: RetryConfig,
}

impl RetryingFetcher {
    pub fn new(base_url: impl Into<String>, config: RetryConfig) -> FetchResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| FetchError::Permanent(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// `base_delay * 2^attempt + uniform(0, max_jitter)`, attempt is zero-indexed
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .config
            .base_delay()
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter_ms = match self.config.max_jitter_ms {
            0 => 0,
            max => rand::thread_rng().gen_range(0..=max),
        };

        exponential.saturating_add(Duration::from_millis(jitter_ms))
    }

    /// GET and decode into a typed payload
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> FetchResult<T> {
        let value = self.get_json(path, params).await?;
        serde_json::from_value(value)
            .map_err(|e| FetchError::Permanent(format!("unexpected payload shape: {e}")))
    }

    async fn attempt(&self, url: &str, params: &[(&str, String)]) -> FetchResult<Value> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| classify_transport(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport(url, &e))?;

        serde_json::from_slice(&body)
            .map_err(|e| FetchError::Permanent(format!("malformed payload from {url}: {e}")))
    }
}

#[async_trait]
impl Fetch for RetryingFetcher {
    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> FetchResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let max_attempts = self.max_attempts();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            match self.attempt(&url, params).await {
                Ok(value) => return Ok(value),
                Err(FetchError::RateLimited { url }) => {
                    warn!("Rate limit hit on {} (attempt {})", url, attempt + 1);
                    return Err(FetchError::RateLimited { url });
                }
                Err(e) if e.is_retryable() => {
                    if attempt + 1 < max_attempts {
                        let delay = self.backoff_delay(attempt);
                        warn!(
                            "Request to {} failed, retrying ({}/{}): {}",
                            url,
                            attempt + 1,
                            max_attempts,
                            e
                        );
                        debug!("Backing off for {:?} (attempt {})", delay, attempt + 1);
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| FetchError::Transient(format!("no attempt made for {url}"))))
    }
}

fn classify_status(url: &str, status: StatusCode) -> FetchError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        FetchError::RateLimited {
            url: url.to_string(),
        }
    } else if status.is_server_error() {
        FetchError::Transient(format!("{url} returned {status}"))
    } else {
        FetchError::Permanent(format!("{url} returned {status}"))
    }
}

fn classify_transport(url: &str, error: &reqwest::Error) -> FetchError {
    if error.is_builder() {
        FetchError::Permanent(format!("invalid request to {url}: {error}"))
    } else {
        FetchError::Transient(format!("request to {url} failed: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_jitter_ms: 0,
            timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pairs"))
            .and(query_param("q", "SOL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = RetryingFetcher::new(server.uri(), fast_config(3)).unwrap();
        let body = fetcher
            .get_json("/pairs", &[("q", "SOL".to_string())])
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = RetryingFetcher::new(server.uri(), fast_config(3)).unwrap();
        let err = fetcher.get_json("/limited", &[]).await.unwrap_err();

        assert!(matches!(err, FetchError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_transient_failure_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(4)
            .mount(&server)
            .await;

        let fetcher = RetryingFetcher::new(server.uri(), fast_config(4)).unwrap();
        let err = fetcher.get_json("/flaky", &[]).await.unwrap_err();

        assert!(matches!(err, FetchError::Transient(_)));
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = RetryingFetcher::new(server.uri(), fast_config(3)).unwrap();
        let err = fetcher.get_json("/missing", &[]).await.unwrap_err();

        assert!(matches!(err, FetchError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_recovers_after_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"n": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = RetryingFetcher::new(server.uri(), fast_config(3)).unwrap();
        let body = fetcher.get_json("/retry", &[]).await.unwrap();

        assert_eq!(body["n"], 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = RetryingFetcher::new(server.uri(), fast_config(3)).unwrap();
        let err = fetcher.get_json("/html", &[]).await.unwrap_err();

        assert!(matches!(err, FetchError::Permanent(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(2)
            .mount(&server)
            .await;

        let config = RetryConfig {
            timeout_ms: 50,
            ..fast_config(2)
        };
        let fetcher = RetryingFetcher::new(server.uri(), config).unwrap();
        let err = fetcher.get_json("/slow", &[]).await.unwrap_err();

        assert!(matches!(err, FetchError::Transient(_)));
    }

    #[tokio::test]
    async fn test_typed_get() {
        #[derive(serde::Deserialize)]
        struct Body {
            value: u32,
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"value": 7})))
            .mount(&server)
            .await;

        let fetcher = RetryingFetcher::new(format!("{}/", server.uri()), fast_config(1)).unwrap();
        let body: Body = fetcher.get("/typed", &[]).await.unwrap();
        assert_eq!(body.value, 7);
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 100,
            max_jitter_ms: 0,
            timeout_ms: 1_000,
        };
        let fetcher = RetryingFetcher::new("http://localhost", config).unwrap();

        assert_eq!(fetcher.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(fetcher.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(fetcher.backoff_delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_jitter_is_bounded() {
        let fetcher = RetryingFetcher::new("http://localhost", RetryConfig::default()).unwrap();

        for _ in 0..50 {
            let delay = fetcher.backoff_delay(1);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        let fetcher = RetryingFetcher::new("http://localhost", config).unwrap();
        assert_eq!(fetcher.max_attempts(), 1);
    }
}
