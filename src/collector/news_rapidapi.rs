//! Paid news collector, via a RapidAPI-hosted news search endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const RAPIDAPI_HOST: &str = "free-news.p.rapidapi.com";
const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct RapidApiResponse {
    #[serde(default)]
    articles: Vec<RapidApiArticle>,
}

#[derive(Debug, Deserialize)]
struct RapidApiArticle {
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    link: String,
    #[serde(rename = "published_date", default)]
    published_date: String,
}

pub struct NewsRapidApiCollector {
    client: CollectorHttpClient,
    api_key: Option<String>,
}

impl NewsRapidApiCollector {
    pub fn new(
        http: Arc<ResilientHttpClient>,
        api_key: Option<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "news_rapidapi", 10, circuit_breaker),
            api_key,
        }
    }

    async fn fetch_once(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            OrchestratorError::ConfigMissing("rapidapi_key not configured".to_string())
        })?;

        let url = format!(
            "https://{}/search?q={}&lang=en&page=1",
            RAPIDAPI_HOST,
            urlencoding::encode(query)
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "X-RapidAPI-Key",
            api_key
                .parse()
                .map_err(|_| OrchestratorError::ValidationError("rapidapi_key is not a valid header value".to_string()))?,
        );
        headers.insert(
            "X-RapidAPI-Host",
            RAPIDAPI_HOST
                .parse()
                .map_err(|_| OrchestratorError::ValidationError("rapidapi host is not a valid header value".to_string()))?,
        );

        debug!(source = "news_rapidapi", query, "fetching paid news search");

        let response = self.client.get_with_headers(&url, headers).await?;
        let parsed: RapidApiResponse = response.json().await.map_err(OrchestratorError::HttpError)?;

        let items = parsed
            .articles
            .into_iter()
            .take(limit)
            .map(|a| {
                CollectedItem::new("news_rapidapi", a.title)
                    .with_content(a.summary)
                    .with_url(a.link)
                    .with_published_at(a.published_date)
            })
            .collect();

        Ok(items)
    }
}

#[async_trait]
impl Collector for NewsRapidApiCollector {
    fn name(&self) -> &str {
        "news_rapidapi"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(5);
        super::with_retry("news_rapidapi", MAX_RETRIES, BASE_DELAY, || {
            self.fetch_once(query, limit)
        })
        .await
    }
}
