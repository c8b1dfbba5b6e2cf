//! GitHub collector — repository search, plus a "trending" mode that
//! searches for repos created in the last week sorted by stars.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct GithubCollector {
    client: CollectorHttpClient,
    token: Option<String>,
}

impl GithubCollector {
    pub fn new(
        http: Arc<ResilientHttpClient>,
        token: Option<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "github", 30, circuit_breaker),
            token,
        }
    }

    async fn search(&self, q: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "https://api.github.com/search/repositories?q={}&sort=stars&order=desc&per_page={limit}",
            urlencoding::encode(q)
        );

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Accept",
            reqwest::header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );
        if let Some(token) = &self.token {
            let auth = format!("Bearer {token}")
                .parse()
                .map_err(|_| OrchestratorError::ValidationError("github_token is not a valid header value".to_string()))?;
            headers.insert("Authorization", auth);
        }

        let data: Value = self
            .client
            .get_with_headers(&url, headers)
            .await?
            .json()
            .await
            .map_err(OrchestratorError::HttpError)?;

        let items = data["items"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|repo| {
                let name = repo["full_name"].as_str().unwrap_or_default().to_string();
                let description = repo["description"].as_str().unwrap_or_default().to_string();
                let stars = repo["stargazers_count"].as_i64().unwrap_or(0);
                let language = repo["language"].as_str().unwrap_or("unknown").to_string();
                let url = repo["html_url"].as_str().unwrap_or_default().to_string();
                let created_at = repo["created_at"].as_str().unwrap_or_default().to_string();

                let content = format!("{description} ({stars} stars, written in {language})");

                CollectedItem::new("github", name)
                    .with_content(content)
                    .with_url(url)
                    .with_published_at(created_at)
                    .with_metadata("stars", json!(stars))
                    .with_metadata("language", json!(language))
            })
            .collect();

        Ok(items)
    }
}

#[async_trait]
impl Collector for GithubCollector {
    fn name(&self) -> &str {
        "github"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(10);
        super::with_retry("github", MAX_RETRIES, BASE_DELAY, || async {
            if query.trim().eq_ignore_ascii_case("trending") {
                let since = (Utc::now() - ChronoDuration::days(7)).format("%Y-%m-%d");
                self.search(&format!("created:>{since}"), limit).await
            } else {
                self.search(query, limit).await
            }
        })
        .await
    }
}
