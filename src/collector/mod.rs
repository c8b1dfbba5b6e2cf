//! Collector abstraction
//!
//! Each collector fetches [`CollectedItem`]s for a query from one upstream.
//! The only shared surface is `collect` / `close` / `name` — per-collector
//! state (HTTP client, API key, default queries) lives on the struct.

pub mod http;

pub mod arxiv;
pub mod crypto;
pub mod cryptopanic;
pub mod ddg;
pub mod dexscreener;
pub mod github;
pub mod news;
pub mod news_rapidapi;
pub mod reddit;
pub mod serper;
pub mod stocks;
pub mod tmz;
pub mod weather;
pub mod wikipedia;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::Config;
use crate::error::{OrchestratorError, Result};
use crate::collector::http::ResilientHttpClient;
use crate::metrics::{self, CollectorTimer, FetchOutcome};

/// A single record produced by any collector.
///
/// Invariant: `source` and `title` are always non-null; everything else
/// defaults to empty string / empty map when the upstream lacks it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectedItem {
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl CollectedItem {
    pub fn new(source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            content: String::new(),
            url: String::new(),
            published_at: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_published_at(mut self, published_at: impl Into<String>) -> Self {
        self.published_at = published_at.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Options accepted by every collector's `collect` call.
#[derive(Debug, Clone, Default)]
pub struct CollectOptions {
    pub limit: Option<usize>,
}

impl CollectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Shared contract every upstream-specific collector implements.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Human-readable identifier used in logs; not necessarily the registry key.
    fn name(&self) -> &str;

    /// Fetches items for `query`. An upstream with nothing to say returns an
    /// empty vec rather than an error — only genuine failures (after local
    /// retry) propagate as `Err`.
    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>>;

    /// Releases any held resources. Callers must invoke this on every exit path.
    async fn close(&self) {}
}

/// Retries `f` up to `max_retries` times with `base_delay * 2^attempt` backoff
/// between attempts. The uniform retry/backoff mechanism every collector's
/// `collect` implementation calls into around its own upstream fetch.
pub async fn with_retry<F, Fut, T>(
    source: &str,
    max_retries: u32,
    base_delay: Duration,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let _timer = CollectorTimer::new(source);
    let mut attempt = 0u32;
    loop {
        match f().await {
            Ok(v) => {
                metrics::record_collector_fetch(source, FetchOutcome::Success);
                return Ok(v);
            }
            Err(e) if attempt < max_retries => {
                metrics::record_collector_fetch(source, FetchOutcome::Error);
                warn!(source, attempt, error = %e, "collector fetch failed, retrying");
                let delay = base_delay.mul_f64(2f64.powi(attempt as i32));
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                metrics::record_collector_fetch(source, FetchOutcome::Error);
                return Err(e);
            }
        }
    }
}

/// Immutable, string-keyed map from registry key to collector instance.
/// Built once at process start from [`Config`]; callers obtain a cloned
/// `Arc` and close it on every exit path.
pub struct CollectorRegistry {
    collectors: HashMap<String, Arc<dyn Collector>>,
}

impl CollectorRegistry {
    /// Builds a registry directly from a prepared map, bypassing network
    /// construction. Used by tests to substitute mock collectors.
    pub fn from_map(collectors: HashMap<String, Arc<dyn Collector>>) -> Self {
        Self { collectors }
    }

    pub fn build(config: &Config) -> Result<Self> {
        let http = Arc::new(ResilientHttpClient::with_defaults()?);
        let mut collectors: HashMap<String, Arc<dyn Collector>> = HashMap::new();

        let cb = |name: &str, config: &Config| {
            Arc::new(CircuitBreaker::new(
                name.to_string(),
                CircuitBreakerConfig {
                    failure_threshold: config.circuit_breaker_failure_threshold,
                    open_duration: Duration::from_secs(config.circuit_breaker_open_duration_secs),
                    ..CircuitBreakerConfig::default()
                },
            ))
        };

        collectors.insert(
            "news".to_string(),
            Arc::new(news::NewsCollector::new()),
        );
        collectors.insert(
            "news_rapidapi".to_string(),
            Arc::new(news_rapidapi::NewsRapidApiCollector::new(
                http.clone(),
                config.rapidapi_key.clone(),
                cb("news_rapidapi", config),
            )),
        );
        collectors.insert(
            "weather".to_string(),
            Arc::new(weather::WeatherCollector::new(
                http.clone(),
                cb("weather", config),
            )),
        );
        collectors.insert(
            "crypto".to_string(),
            Arc::new(crypto::CryptoCollector::new(http.clone(), cb("crypto", config))),
        );
        collectors.insert(
            "dexscreener".to_string(),
            Arc::new(dexscreener::DexScreenerCollector::new(
                http.clone(),
                cb("dexscreener", config),
            )),
        );
        collectors.insert(
            "reddit".to_string(),
            Arc::new(reddit::RedditCollector::new(http.clone(), cb("reddit", config))),
        );
        collectors.insert(
            "github".to_string(),
            Arc::new(github::GithubCollector::new(
                http.clone(),
                config.github_token.clone(),
                cb("github", config),
            )),
        );
        collectors.insert(
            "arxiv".to_string(),
            Arc::new(arxiv::ArxivCollector::new(http.clone(), cb("arxiv", config))),
        );
        collectors.insert(
            "stocks".to_string(),
            Arc::new(stocks::StocksCollector::new(http.clone(), cb("stocks", config))),
        );
        collectors.insert(
            "wikipedia".to_string(),
            Arc::new(wikipedia::WikipediaCollector::new(
                http.clone(),
                cb("wikipedia", config),
            )),
        );
        collectors.insert(
            "ddg".to_string(),
            Arc::new(ddg::DuckDuckGoCollector::new(
                http.clone(),
                ddg::DdgMode::Web,
                cb("ddg", config),
            )),
        );
        collectors.insert(
            "ddg_news".to_string(),
            Arc::new(ddg::DuckDuckGoCollector::new(
                http.clone(),
                ddg::DdgMode::News,
                cb("ddg_news", config),
            )),
        );
        collectors.insert(
            "serper".to_string(),
            Arc::new(serper::SerperCollector::new(
                http.clone(),
                config.serper_api_key.clone(),
                cb("serper", config),
            )),
        );
        collectors.insert(
            "tmz".to_string(),
            Arc::new(tmz::TmzCollector::new(http.clone(), cb("tmz", config))),
        );
        collectors.insert(
            "cryptonews".to_string(),
            Arc::new(cryptopanic::CryptoPanicCollector::new(
                http.clone(),
                cb("cryptonews", config),
            )),
        );

        Ok(Self { collectors })
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Collector>> {
        self.collectors
            .get(name)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownSource(name.to_string()))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.collectors.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collected_item_defaults() {
        let item = CollectedItem::new("news", "Some headline");
        assert_eq!(item.source, "news");
        assert_eq!(item.title, "Some headline");
        assert_eq!(item.content, "");
        assert_eq!(item.url, "");
    }

    #[tokio::test]
    async fn test_with_retry_succeeds_after_failure() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retry("test", 2, Duration::from_millis(1), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 1 {
                Err(OrchestratorError::ValidationError("transient".to_string()))
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts() {
        let result: Result<u32> = with_retry("test", 2, Duration::from_millis(1), || async {
            Err(OrchestratorError::ValidationError("always fails".to_string()))
        })
        .await;
        assert!(result.is_err());
    }
}
