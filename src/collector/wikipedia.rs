//! Wikipedia collector — MediaWiki search + REST summaries, plus fixed
//! "current events" / "on this day" / "featured" modes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::http::{CollectorHttpClient, ResilientHttpClient};
use super::{CollectOptions, Collector, CollectedItem};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::{OrchestratorError, Result};

const REST_URL: &str = "https://en.wikipedia.org/api/rest_v1";
const MW_URL: &str = "https://en.wikipedia.org/w/api.php";
const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

pub struct WikipediaCollector {
    client: CollectorHttpClient,
}

impl WikipediaCollector {
    pub fn new(http: Arc<ResilientHttpClient>, circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: CollectorHttpClient::new(http, "wikipedia", 60, circuit_breaker),
        }
    }

    /// Best-effort: extracts bullet lines from the portal's raw wikitext by
    /// heuristic (leading `*`, minimum length after markup stripping). A
    /// portal section that doesn't match the expected layout yields zero
    /// items rather than an error.
    async fn fetch_current_events(&self) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "{MW_URL}?action=parse&page=Portal:Current_events&prop=wikitext&format=json&section=0"
        );
        let data: Value = self.client.get(&url).await?.json().await.map_err(OrchestratorError::HttpError)?;
        let wikitext = data["parse"]["wikitext"]["*"].as_str().unwrap_or_default();

        let events: Vec<String> = wikitext
            .lines()
            .map(|l| l.trim())
            .filter(|l| l.starts_with('*') && l.len() > 10)
            .map(clean_wikitext)
            .filter(|l| l.len() > 20)
            .take(10)
            .collect();

        Ok(events
            .into_iter()
            .enumerate()
            .map(|(i, event)| {
                let title: String = event.chars().take(80).collect();
                CollectedItem::new("wikipedia_current", format!("Current Event: {title}"))
                    .with_content(event)
                    .with_url("https://en.wikipedia.org/wiki/Portal:Current_events")
                    .with_metadata("position", json!(i + 1))
            })
            .collect())
    }

    async fn fetch_on_this_day(&self) -> Result<Vec<CollectedItem>> {
        let now = Utc::now();
        let url = format!(
            "{REST_URL}/feed/onthisday/events/{:02}/{:02}",
            now.format("%m").to_string().parse::<u32>().unwrap_or(1),
            now.format("%d").to_string().parse::<u32>().unwrap_or(1),
        );
        let data: Value = self.client.get(&url).await?.json().await.map_err(OrchestratorError::HttpError)?;

        let events = data["events"].as_array().cloned().unwrap_or_default();
        Ok(events
            .into_iter()
            .take(10)
            .map(|event| {
                let year = event["year"].as_i64().unwrap_or(0);
                let text = event["text"].as_str().unwrap_or_default().to_string();
                let url = event["pages"][0]["content_urls"]["desktop"]["page"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                let title: String = text.chars().take(80).collect();

                CollectedItem::new("wikipedia_otd", format!("{year}: {title}"))
                    .with_content(format!("On this day in {year}: {text}"))
                    .with_url(url)
                    .with_metadata("year", json!(year))
            })
            .collect())
    }

    async fn fetch_featured(&self) -> Result<Vec<CollectedItem>> {
        let now = Utc::now();
        let url = format!(
            "{REST_URL}/feed/featured/{}/{:02}/{:02}",
            now.format("%Y"),
            now.format("%m").to_string().parse::<u32>().unwrap_or(1),
            now.format("%d").to_string().parse::<u32>().unwrap_or(1),
        );
        let data: Value = self.client.get(&url).await?.json().await.map_err(OrchestratorError::HttpError)?;

        let mut items = Vec::new();

        let tfa = &data["tfa"];
        if tfa.is_object() {
            let title = tfa["title"].as_str().unwrap_or_default().to_string();
            let extract = tfa["extract"].as_str().unwrap_or_default().to_string();
            let url = tfa["content_urls"]["desktop"]["page"].as_str().unwrap_or_default().to_string();
            items.push(
                CollectedItem::new("wikipedia_featured", format!("Featured: {title}"))
                    .with_content(extract)
                    .with_url(url),
            );
        }

        if let Some(articles) = data["mostread"]["articles"].as_array() {
            for article in articles.iter().take(5) {
                let title = article["title"].as_str().unwrap_or_default().to_string();
                let extract: String = article["extract"].as_str().unwrap_or_default().chars().take(300).collect();
                let url = article["content_urls"]["desktop"]["page"].as_str().unwrap_or_default().to_string();
                let views = article["views"].as_i64().unwrap_or(0);

                items.push(
                    CollectedItem::new("wikipedia_mostread", format!("Most Read: {title}"))
                        .with_content(extract)
                        .with_url(url)
                        .with_metadata("views", json!(views)),
                );
            }
        }

        Ok(items)
    }

    async fn fetch_search(&self, query: &str, limit: usize) -> Result<Vec<CollectedItem>> {
        let url = format!(
            "{MW_URL}?action=query&list=search&srsearch={}&srlimit={limit}&srprop=snippet&format=json",
            urlencoding::encode(query)
        );
        let data: Value = self.client.get(&url).await?.json().await.map_err(OrchestratorError::HttpError)?;
        let results = data["query"]["search"].as_array().cloned().unwrap_or_default();

        let mut items = Vec::new();
        for result in results {
            let title = result["title"].as_str().unwrap_or_default().to_string();
            let snippet = strip_html(result["snippet"].as_str().unwrap_or_default());
            let word_count = result["wordcount"].as_i64().unwrap_or(0);

            let summary = self.fetch_summary(&title).await.unwrap_or_default();
            let content = if summary.is_empty() { snippet } else { summary };

            items.push(
                CollectedItem::new("wikipedia", &title)
                    .with_content(content)
                    .with_url(format!(
                        "https://en.wikipedia.org/wiki/{}",
                        title.replace(' ', "_")
                    ))
                    .with_metadata("word_count", json!(word_count)),
            );
        }
        Ok(items)
    }

    async fn fetch_summary(&self, title: &str) -> Option<String> {
        let encoded = title.replace(' ', "_");
        let url = format!("{REST_URL}/page/summary/{encoded}");
        let response = self.client.get(&url).await.ok()?;
        let data: Value = response.json().await.ok()?;
        let extract = data["extract"].as_str()?;
        Some(extract.chars().take(500).collect())
    }
}

fn clean_wikitext(line: &str) -> String {
    // Collapses [[link|text]] / [[text]] to their display text and strips bold/italic markers.
    let mut out = String::new();
    let mut chars = line.trim_start_matches('*').trim().chars().peekable();
    while let Some(c) = chars.next() {
        if c == '[' && chars.peek() == Some(&'[') {
            chars.next();
            let mut inner = String::new();
            while let Some(&c2) = chars.peek() {
                if c2 == ']' {
                    chars.next();
                    if chars.peek() == Some(&']') {
                        chars.next();
                    }
                    break;
                }
                inner.push(c2);
                chars.next();
            }
            let display = inner.rsplit('|').next().unwrap_or(&inner);
            out.push_str(display);
        } else if c == '\'' {
            // skip run of quote marks used for bold/italic
            while chars.peek() == Some(&'\'') {
                chars.next();
            }
        } else {
            out.push(c);
        }
    }
    out.trim().to_string()
}

fn strip_html(s: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[async_trait]
impl Collector for WikipediaCollector {
    fn name(&self) -> &str {
        "wikipedia"
    }

    async fn collect(&self, query: &str, options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let limit = options.limit.unwrap_or(5);
        let normalized = query.to_lowercase();
        super::with_retry("wikipedia", MAX_RETRIES, BASE_DELAY, || async {
            match normalized.as_str() {
                "current_events" | "current events" | "news" => self.fetch_current_events().await,
                "on_this_day" | "today_in_history" => self.fetch_on_this_day().await,
                "featured" | "featured_article" => self.fetch_featured().await,
                _ => self.fetch_search(query, limit).await,
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_wikitext_strips_links_and_bold() {
        let line = "*'''[[Bitcoin]]''' hits new high, per [[CoinDesk|the report]]";
        let cleaned = clean_wikitext(line);
        assert_eq!(cleaned, "Bitcoin hits new high, per the report");
    }

    #[test]
    fn test_strip_html_removes_tags() {
        assert_eq!(strip_html("<span class=\"x\">hello</span> world"), "hello world");
    }
}
