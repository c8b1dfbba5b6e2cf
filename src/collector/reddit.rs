//! Reddit collector — free, keyless, via Reddit's public `.json` endpoints.
//!
//! Query dispatch: `"r/<name>"` lists that subreddit's hot posts; any other
//! text is treated as a search term across all of Reddit.

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

pub struct RedditCollector {
    client: CollectorHttpClient,
}

impl RedditCollector {
    pub fn new(http: Arc<ResilientHttpClient>, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "reddit", 30, circuit_breaker),
        }
    }

    fn post_to_item(post: &Value) -> CollectedItem {
        let data = &post["data"];
        let title = data["title"].as_str().unwrap_or_default().to_string();
        let subreddit = data["subreddit"].as_str().unwrap_or_default().to_string();
        let selftext = data["selftext"].as_str().unwrap_or_default();
        let score = data["score"].as_i64().unwrap_or(0);
        let num_comments = data["num_comments"].as_i64().unwrap_or(0);
        let permalink = data["permalink"].as_str().unwrap_or_default();

        let content = if selftext.is_empty() {
            format!("{score} upvotes, {num_comments} comments in r/{subreddit}")
        } else {
            format!(
                "{}\n\n({score} upvotes, {num_comments} comments in r/{subreddit})",
                selftext.chars().take(500).collect::<String>()
            )
        };

        CollectedItem::new("reddit", title)
            .with_content(content)
            .with_url(format!("https://www.reddit.com{permalink}"))
            .with_metadata("subreddit", json!(subreddit))
            .with_metadata("score", json!(score))
    }

    async fn fetch_subreddit(&self, subreddit: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "https://www.reddit.com/r/{subreddit}/hot.json?limit={limit}&raw_json=1"
        );
        let data: Value = self.client.get(&url).await?.json().await.map_err(OrchestratorError::HttpError)?;
        let posts = data["data"]["children"].as_array().cloned().unwrap_or_default();
        Ok(posts.iter().map(Self::post_to_item).collect())
    }

    async fn fetch_search(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "https://www.reddit.com/search.json?q={}&sort=relevance&t=week&limit={limit}&raw_json=1",
            urlencoding::encode(query)
        );
        let data: Value = self.client.get(&url).await?.json().await.map_err(OrchestratorError::HttpError)?;
        let posts = data["data"]["children"].as_array().cloned().unwrap_or_default();
        Ok(posts.iter().map(Self::post_to_item).collect())
    }
}

#[async_trait]
impl Collector for RedditCollector {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(10);
        super::with_retry("reddit", MAX_RETRIES, BASE_DELAY, || async {
            if let Some(sub) = query.strip_prefix("r/") {
                self.fetch_subreddit(sub, limit).await
            } else {
                self.fetch_search(query, limit).await
            }
        })
        .await
    }
}
