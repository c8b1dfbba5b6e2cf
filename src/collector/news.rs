//! Google News RSS collector
//!
//! Free, keyless: proxies a search query through Google News' RSS endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{CollectOptions, Collector, CollectedItem};
use crate::error::{OrchestratorError, Result};

const DEFAULT_QUERY: &str = "breaking news";
const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct NewsCollector {
    client: reqwest::Client,
}

impl NewsCollector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(format!("research-orchestrator/{}", env!("CARGO_PKG_VERSION")))
                .timeout(Duration::from_secs(15))
                .build()
                .expect("failed to build news collector client"),
        }
    }

    async fn fetch_once(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "https://news.google.com/rss/search?q={}&hl=en-US&gl=US&ceid=US:en",
            urlencoding::encode(query)
        );

        debug!(source = "news", query, "fetching Google News RSS");

        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(OrchestratorError::HttpError)?
            .bytes()
            .await
            .map_err(OrchestratorError::HttpError)?;

        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| OrchestratorError::FeedError(e.to_string()))?;

        let items = feed
            .entries
            .into_iter()
            .take(limit)
            .map(|entry| {
                let title = entry.title.map(|t| t.content).unwrap_or_default();
                let url = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
                let published = entry
                    .published
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default();
                let content = entry
                    .summary
                    .map(|s| s.content)
                    .unwrap_or_else(|| title.clone());

                CollectedItem::new("news", title)
                    .with_content(content)
                    .with_url(url)
                    .with_published_at(published)
            })
            .collect();

        Ok(items)
    }
}

impl Default for NewsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Collector for NewsCollector {
    fn name(&self) -> &str {
        "news"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let query = if query.trim().is_empty() { DEFAULT_QUERY } else { query };
        let limit = options.limit.unwrap_or(5);
        super::with_retry("news", MAX_RETRIES, BASE_DELAY, || self.fetch_once(query, limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query_used_when_blank() {
        assert_eq!(DEFAULT_QUERY, "breaking news");
    }
}
