//! Resilient HTTP client shared by every collector
//!
//! Provides a single `reqwest::Client` with:
//! - Semaphore-based concurrency limiting across all collectors
//! - Exponential backoff with jitter for retries
//! - Per-collector rate limiting
//! - Per-collector circuit breaker integration

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{
    clock::DefaultClock, middleware::NoOpMiddleware, state::NotKeyed, Quota, RateLimiter,
};
use reqwest::{Client, Request, Response, StatusCode};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub retry_multiplier: f64,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
            request_timeout: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(15),
            retry_multiplier: 2.0,
            user_agent: format!("research-orchestrator/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Resilient HTTP client with concurrency limiting and retries
pub struct ResilientHttpClient {
    client: Client,
    semaphore: Arc<Semaphore>,
    config: HttpClientConfig,
}

impl ResilientHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(OrchestratorError::HttpError)?;

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_requests));

        Ok(Self {
            client,
            semaphore,
            config,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Executes a pre-built request with retry logic (exponential backoff + jitter)
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| OrchestratorError::ConnectionLost("semaphore closed".to_string()))?;

        let url = request.url().clone();
        let method = request.method().clone();

        debug!(method = %method, url = %url, "executing HTTP request");

        let mut attempt = 0u32;
        let mut delay = self.config.initial_retry_delay;
        let max_retries = self.config.max_retries;

        loop {
            attempt += 1;

            let req = request.try_clone().ok_or_else(|| {
                OrchestratorError::ConnectionLost(
                    "request body is not cloneable, cannot retry".to_string(),
                )
            })?;

            match self.client.execute(req).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        debug!(status = %status, attempt, "request succeeded");
                        return Ok(response);
                    } else if Self::is_retryable_status(status) && attempt <= max_retries {
                        warn!(status = %status, attempt, max_retries, "retryable error, retrying");
                        self.sleep_with_jitter(&mut delay).await;
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        return Err(OrchestratorError::ApiError {
                            code: status.to_string(),
                            message: body,
                        });
                    }
                }
                Err(e) => {
                    if (e.is_timeout() || e.is_connect()) && attempt <= max_retries {
                        warn!(error = %e, attempt, "transient error, retrying");
                        self.sleep_with_jitter(&mut delay).await;
                    } else {
                        return Err(OrchestratorError::HttpError(e));
                    }
                }
            }
        }
    }

    async fn sleep_with_jitter(&self, delay: &mut Duration) {
        let jitter = 0.5 + rand::random::<f64>();
        let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
        tokio::time::sleep(jittered).await;
        *delay = std::cmp::min(*delay * 2, self.config.max_retry_delay);
    }

    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
                | StatusCode::BAD_GATEWAY
                | StatusCode::REQUEST_TIMEOUT
        )
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Collector-specific HTTP client with rate limiting and circuit breaker
pub struct CollectorHttpClient {
    client: Arc<ResilientHttpClient>,
    rate_limiter: RateLimiter<NotKeyed, governor::state::InMemoryState, DefaultClock, NoOpMiddleware>,
    circuit_breaker: Arc<CircuitBreaker>,
    source_id: String,
    rate_limit_rpm: u32,
}

impl CollectorHttpClient {
    pub fn new(
        client: Arc<ResilientHttpClient>,
        source_id: &str,
        rate_limit_rpm: u32,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        let rate_limiter = RateLimiter::direct(Self::quota_for(rate_limit_rpm));

        Self {
            client,
            rate_limiter,
            circuit_breaker,
            source_id: source_id.to_string(),
            rate_limit_rpm,
        }
    }

    fn quota_for(rate_limit_rpm: u32) -> Quota {
        Quota::per_minute(NonZeroU32::new(rate_limit_rpm).unwrap_or(NonZeroU32::new(60).unwrap()))
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.execute_with_protection(|| self.client.inner().get(url).build())
            .await
    }

    pub async fn get_with_headers(&self, url: &str, headers: reqwest::header::HeaderMap) -> Result<Response> {
        self.execute_with_protection(|| {
            self.client.inner().get(url).headers(headers.clone()).build()
        })
        .await
    }

    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        headers: reqwest::header::HeaderMap,
    ) -> Result<Response> {
        self.execute_with_protection(|| {
            self.client
                .inner()
                .post(url)
                .headers(headers.clone())
                .json(body)
                .build()
        })
        .await
    }

    async fn execute_with_protection<F>(&self, build_request: F) -> Result<Response>
    where
        F: Fn() -> std::result::Result<Request, reqwest::Error>,
    {
        if !self.circuit_breaker.allow_request() {
            warn!(source = %self.source_id, "circuit breaker open, request blocked");
            return Err(OrchestratorError::CircuitBreakerOpen(self.source_id.clone()));
        }

        self.rate_limiter.until_ready().await;

        let request = build_request().map_err(OrchestratorError::HttpError)?;

        match self.client.execute(request).await {
            Ok(response) => {
                self.circuit_breaker.record_success();
                Ok(response)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                Err(e)
            }
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn is_available(&self) -> bool {
        self.circuit_breaker.allow_request()
    }
}

impl Clone for CollectorHttpClient {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            rate_limiter: RateLimiter::direct(Self::quota_for(self.rate_limit_rpm)),
            circuit_breaker: self.circuit_breaker.clone(),
            source_id: self.source_id.clone(),
            rate_limit_rpm: self.rate_limit_rpm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.max_concurrent_requests, 10);
        assert_eq!(config.max_retries, 3);
    }

    #[tokio::test]
    async fn test_semaphore_limiting() {
        let config = HttpClientConfig {
            max_concurrent_requests: 2,
            ..Default::default()
        };

        let client = ResilientHttpClient::new(config).unwrap();
        assert_eq!(client.available_permits(), 2);
    }

    #[test]
    fn test_retryable_status() {
        assert!(ResilientHttpClient::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(ResilientHttpClient::is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!ResilientHttpClient::is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!ResilientHttpClient::is_retryable_status(StatusCode::UNAUTHORIZED));
    }
}
