//! arXiv collector — Atom feed search, free and keyless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct ArxivCollector {
    client: CollectorHttpClient,
}

impl ArxivCollector {
    pub fn new(http: Arc<ResilientHttpClient>, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "arxiv", 20, circuit_breaker),
        }
    }

    async fn fetch_once(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "https://export.arxiv.org/api/query?search_query=all:{}&start=0&max_results={limit}&sortBy=submittedDate&sortOrder=descending",
            urlencoding::encode(query)
        );

        let bytes = self.client.get(&url).await?.bytes().await.map_err(OrchestratorError::HttpError)?;
        let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| OrchestratorError::FeedError(e.to_string()))?;

        let items = feed
            .entries
            .into_iter()
            .map(|entry| {
                let title = entry
                    .title
                    .map(|t| t.content.replace('\n', " ").trim().to_string())
                    .unwrap_or_default();
                let url = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
                let published = entry.published.map(|d| d.to_rfc3339()).unwrap_or_default();
                let summary = entry
                    .summary
                    .map(|s| s.content.replace('\n', " ").trim().to_string())
                    .unwrap_or_default();

                CollectedItem::new("arxiv", title)
                    .with_content(summary)
                    .with_url(url)
                    .with_published_at(published)
            })
            .collect();

        Ok(items)
    }
}

#[async_trait]
impl Collector for ArxivCollector {
    fn name(&self) -> &str {
        "arxiv"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(5);
        super::with_retry("arxiv", MAX_RETRIES, BASE_DELAY, || self.fetch_once(query, limit)).await
    }
}
