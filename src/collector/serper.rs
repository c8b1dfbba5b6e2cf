//! Serper collector — Google SERP results via serper.dev (key required).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct SerperCollector {
    client: CollectorHttpClient,
    api_key: Option<String>,
}

impl SerperCollector {
    pub fn new(
        http: Arc<ResilientHttpClient>,
        api_key: Option<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "serper", 30, circuit_breaker),
            api_key,
        }
    }

    async fn fetch_once(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| OrchestratorError::ConfigMissing("serper_api_key not configured".to_string()))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "X-API-KEY",
            api_key
                .parse()
                .map_err(|_| OrchestratorError::ValidationError("serper_api_key is not a valid header value".to_string()))?,
        );
        headers.insert("Content-Type", reqwest::header::HeaderValue::from_static("application/json"));

        let response = self
            .client
            .post_json(
                "https://google.serper.dev/search",
                &json!({ "q": query }),
                headers,
            )
            .await?;

        let data: Value = response.json().await.map_err(OrchestratorError::HttpError)?;
        let organic = data["organic"].as_array().cloned().unwrap_or_default();

        let items = organic
            .into_iter()
            .take(limit)
            .map(|result| {
                let title = result["title"].as_str().unwrap_or_default().to_string();
                let snippet = result["snippet"].as_str().unwrap_or_default().to_string();
                let link = result["link"].as_str().unwrap_or_default().to_string();
                let position = result["position"].as_i64().unwrap_or(0);

                CollectedItem::new("serper", title)
                    .with_content(snippet)
                    .with_url(link)
                    .with_metadata("position", json!(position))
            })
            .collect();

        Ok(items)
    }
}

#[async_trait]
impl Collector for SerperCollector {
    fn name(&self) -> &str {
        "serper"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(10);
        super::with_retry("serper", MAX_RETRIES, BASE_DELAY, || self.fetch_once(query, limit)).await
    }
}
