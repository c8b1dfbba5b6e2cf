//! DuckDuckGo web/news search collector
//!
//! DuckDuckGo has no public JSON search API, so this fetches the HTML
//! lite results page and parses it with a CSS-selector based HTML parser.
//! The parse itself is CPU-bound and runs on a blocking worker thread so it
//! never stalls the async executor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdgMode {
    Web,
    News,
}

pub struct DuckDuckGoCollector {
    client: CollectorHttpClient,
    mode: DdgMode,
}

impl DuckDuckGoCollector {
    pub fn new(http: Arc<ResilientHttpClient>, mode: DdgMode, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        let source_id = match mode {
            DdgMode::Web => "ddg",
            DdgMode::News => "ddg_news",
        };
        Self {
            client: CollectorHttpClient::new(http, source_id, 20, circuit_breaker),
            mode,
        }
    }

    async fn fetch_once(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = match self.mode {
            DdgMode::Web => format!(
                "https://lite.duckduckgo.com/lite/?q={}",
                urlencoding::encode(query)
            ),
            DdgMode::News => format!(
                "https://duckduckgo.com/html/?q={}&iar=news",
                urlencoding::encode(query)
            ),
        };

        let body = self
            .client
            .get(&url)
            .await?
            .text()
            .await
            .map_err(OrchestratorError::HttpError)?;

        let source = match self.mode {
            DdgMode::Web => "ddg",
            DdgMode::News => "ddg_news",
        };

        let items = tokio::task::spawn_blocking(move || parse_results(&body, source, limit))
            .await
            .map_err(|e| OrchestratorError::ValidationError(format!("parse task panicked: {e}")))?;

        Ok(items)
    }
}

fn parse_results(body: &str, source: &str, limit: usize) -> Vec<CollectedItem> {
    let document = Html::parse_document(body);
    let row_selector = Selector::parse("a.result-link, a.result__a").unwrap();
    let mut items = Vec::new();

    for link in document.select(&row_selector).take(limit) {
        let title = link.text().collect::<String>().trim().to_string();
        let url = link.value().attr("href").unwrap_or_default().to_string();
        if title.is_empty() {
            continue;
        }
        items.push(CollectedItem::new(source, title).with_url(url));
    }

    items
}

#[async_trait]
impl Collector for DuckDuckGoCollector {
    fn name(&self) -> &str {
        match self.mode {
            DdgMode::Web => "ddg",
            DdgMode::News => "ddg_news",
        }
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(5);
        super::with_retry(self.name(), MAX_RETRIES, BASE_DELAY, || self.fetch_once(query, limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_results_extracts_titles_and_links() {
        let html = r#"
            <html><body>
                <a class="result-link" href="https://example.com/a">First Result</a>
                <a class="result-link" href="https://example.com/b">Second Result</a>
            </body></html>
        "#;
        let items = parse_results(html, "ddg", 5);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First Result");
        assert_eq!(items[0].url, "https://example.com/a");
    }
}
