//! CryptoPanic collector — crypto news via CryptoPanic's public RSS feed.
//!
//! Registered under the `cryptonews` key. Like TMZ, the feed has no search
//! parameter so filtering happens locally.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const FEED_URL: &str = "https://cryptopanic.com/news/rss/";
const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct CryptoPanicCollector {
    client: CollectorHttpClient,
}

impl CryptoPanicCollector {
    pub fn new(http: Arc<ResilientHttpClient>, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "cryptonews", 20, circuit_breaker),
        }
    }

    async fn fetch_once(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let bytes = self
            .client
            .get(FEED_URL)
            .await?
            .bytes()
            .await
            .map_err(OrchestratorError::HttpError)?;
        let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| OrchestratorError::FeedError(e.to_string()))?;

        let needle = query.trim().to_lowercase();
        let items = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let title = entry.title.map(|t| t.content).unwrap_or_default();
                let summary = entry.summary.map(|s| s.content).unwrap_or_default();
                if !needle.is_empty() && !title.to_lowercase().contains(&needle) {
                    return None;
                }
                let url = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
                let published = entry.published.map(|d| d.to_rfc3339()).unwrap_or_default();
                Some(
                    CollectedItem::new("cryptonews", title)
                        .with_content(summary)
                        .with_url(url)
                        .with_published_at(published),
                )
            })
            .take(limit)
            .collect();

        Ok(items)
    }
}

#[async_trait]
impl Collector for CryptoPanicCollector {
    fn name(&self) -> &str {
        "cryptonews"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(10);
        super::with_retry("cryptonews", MAX_RETRIES, BASE_DELAY, || self.fetch_once(query, limit)).await
    }
}
