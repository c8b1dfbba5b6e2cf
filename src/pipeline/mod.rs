//! Pipeline state machine: route → collect → (retry)* → analyze → respond.
//!
//! An explicit state-enum-driven loop inside one function rather than a
//! graph framework — each node is a pure step that takes a [`PipelineState`]
//! and decides the next node.

pub mod fallback;

use serde_json::Value;
use tracing::{info, warn};

use crate::collector::{CollectOptions, CollectorRegistry};
use crate::config::Config;
use crate::llm::{self, LlmClient, Message};

const MAX_RETRIES: u32 = 2;
const RETRY_EXHAUSTED: u32 = 99;
const MAX_RESPONSE_LEN: usize = 4096;
const MAX_ANALYSIS_LEN: usize = 3000;

#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub user_message: String,
    pub source: String,
    pub query: String,
    pub items: Vec<crate::collector::CollectedItem>,
    pub analysis: String,
    pub response: String,
    pub error: String,
    pub tried_sources: Vec<String>,
    pub retry_count: u32,
    pub model: Option<String>,
    pub analysis_model: Option<String>,
}

impl PipelineState {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            ..Default::default()
        }
    }

    pub fn with_source_and_query(mut self, source: impl Into<String>, query: impl Into<String>) -> Self {
        self.source = source.into();
        self.query = query.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Route,
    Collect,
    Retry,
    Analyze,
    Respond,
    End,
}

/// Constructs an LLM client for a single pipeline node call. Production
/// code always passes [`llm::build_client`]; tests substitute a factory
/// that returns a mock client instead of touching the network.
pub type LlmFactory<'a> = &'a (dyn Fn(&Config) -> crate::error::Result<Box<dyn LlmClient>> + Sync);

/// Runs the full pipeline to completion and returns the final state.
///
/// Callers provided `source`/`query` up front skip the `route` node
/// entirely; otherwise an LLM call decides both.
pub async fn run(registry: &CollectorRegistry, config: &Config, state: PipelineState) -> PipelineState {
    run_with_llm_factory(registry, config, state, &llm::build_client).await
}

/// Same as [`run`], with the LLM client construction seam exposed for tests.
pub async fn run_with_llm_factory(
    registry: &CollectorRegistry,
    config: &Config,
    mut state: PipelineState,
    llm_factory: LlmFactory<'_>,
) -> PipelineState {
    let mut node = if state.source.is_empty() || state.query.is_empty() {
        Node::Route
    } else {
        state.tried_sources = Vec::new();
        state.retry_count = 0;
        Node::Collect
    };

    loop {
        node = match node {
            Node::Route => route(config, &mut state, llm_factory).await,
            Node::Collect => collect(registry, &mut state).await,
            Node::Retry => retry(&mut state),
            Node::Analyze => analyze(config, &mut state, llm_factory).await,
            Node::Respond => respond(&mut state),
            Node::End => break,
        };
    }

    state
}

async fn route(config: &Config, state: &mut PipelineState, llm_factory: LlmFactory<'_>) -> Node {
    if !state.source.is_empty() && !state.query.is_empty() {
        state.tried_sources = Vec::new();
        state.retry_count = 0;
        return Node::Collect;
    }

    let client = match llm_factory(config) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "route: failed to build LLM client, defaulting to news");
            state.source = "news".to_string();
            state.query = state.user_message.clone();
            return Node::Collect;
        }
    };

    let prompt = format!(
        "You are routing a user request to the single best data source.\n\
         Available sources: {sources}\n\
         Respond with a JSON object only: {{\"source\": \"<one of the sources>\", \"query\": \"<search query>\"}}\n\
         User request: {msg}",
        sources = "news, news_rapidapi, weather, crypto, dexscreener, reddit, github, arxiv, stocks, wikipedia, ddg, ddg_news, serper, tmz, cryptonews",
        msg = state.user_message,
    );

    let messages = vec![Message::user(prompt)];
    let result = client.complete(&messages, None, 0.1).await;
    client.close().await;

    let (source, query) = match result.and_then(|resp| {
        let text = client.get_text(&resp)?;
        Ok(parse_route_response(&text, &state.user_message))
    }) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "route: LLM routing failed, defaulting to news");
            ("news".to_string(), state.user_message.clone())
        }
    };

    state.source = source;
    state.query = query;
    state.tried_sources = Vec::new();
    state.retry_count = 0;
    Node::Collect
}

/// Strips code fences and parses `{"source", "query"}`, coercing unknown or
/// missing sources to `"news"`.
fn parse_route_response(text: &str, fallback_query: &str) -> (String, String) {
    let trimmed = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let parsed: Option<Value> = serde_json::from_str(trimmed).ok();
    match parsed {
        Some(v) => {
            let source = v["source"].as_str().unwrap_or("news").to_string();
            let query = v["query"].as_str().unwrap_or(fallback_query).to_string();
            (known_source_or_news(&source), query)
        }
        None => ("news".to_string(), fallback_query.to_string()),
    }
}

fn known_source_or_news(source: &str) -> String {
    const KNOWN: &[&str] = &[
        "news",
        "news_rapidapi",
        "weather",
        "crypto",
        "dexscreener",
        "reddit",
        "github",
        "arxiv",
        "stocks",
        "wikipedia",
        "ddg",
        "ddg_news",
        "serper",
        "tmz",
        "cryptonews",
    ];
    if KNOWN.contains(&source) {
        source.to_string()
    } else {
        "news".to_string()
    }
}

async fn collect(registry: &CollectorRegistry, state: &mut PipelineState) -> Node {
    state.tried_sources.push(state.source.clone());

    let collector = match registry.get(&state.source) {
        Ok(c) => c,
        Err(e) => {
            state.error = format!("Failed: {} ({})", state.source, e);
            state.items = Vec::new();
            return decide_after_collect(state);
        }
    };

    let options = CollectOptions::new().limit(5);
    let outcome = collector.collect(&state.query, options).await;
    collector.close().await;

    match outcome {
        Ok(items) if !items.is_empty() => {
            info!(source = %state.source, count = items.len(), "collect: got items");
            state.items = items;
            state.error = String::new();
        }
        Ok(_) => {
            warn!(source = %state.source, "collect: no results");
            state.items = Vec::new();
            state.error = format!("No results from {}", state.source);
        }
        Err(e) => {
            warn!(source = %state.source, error = %e, "collect: failed");
            state.items = Vec::new();
            state.error = format!("Failed: {} ({})", state.source, e);
        }
    }

    decide_after_collect(state)
}

fn decide_after_collect(state: &PipelineState) -> Node {
    if !state.items.is_empty() {
        Node::Analyze
    } else if state.retry_count >= MAX_RETRIES || state.retry_count >= RETRY_EXHAUSTED {
        Node::Analyze
    } else {
        Node::Retry
    }
}

fn retry(state: &mut PipelineState) -> Node {
    let original_source = state
        .tried_sources
        .first()
        .cloned()
        .unwrap_or_else(|| state.source.clone());

    match fallback::next_fallback(&original_source, &state.tried_sources) {
        Some(next) => {
            crate::metrics::record_pipeline_retry(&original_source);
            state.source = next.to_string();
            state.error = String::new();
            state.retry_count += 1;
            Node::Collect
        }
        None => {
            state.retry_count = RETRY_EXHAUSTED;
            Node::Analyze
        }
    }
}

const FORMATTING_CONTRACT: &str = "Use *bold* and _italic_ sparingly, `code` for identifiers, and \"- \" bullets. \
Structure the reply as: Key Takeaway, then Highlights, then Sources. Do not use markdown heading markers (#). \
Keep the whole reply under 3000 characters.";

async fn analyze(config: &Config, state: &mut PipelineState, llm_factory: LlmFactory<'_>) -> Node {
    if !state.error.is_empty() || state.items.is_empty() {
        state.analysis = if !state.error.is_empty() {
            state.error.clone()
        } else {
            "No data to analyze.".to_string()
        };
        return Node::Respond;
    }

    let rendered: String = state
        .items
        .iter()
        .take(5)
        .map(|item| {
            let content: String = item.content.chars().take(500).collect();
            format!("Title: {}\nContent: {}\nURL: {}\n", item.title, content, item.url)
        })
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!("{FORMATTING_CONTRACT}\n\nItems:\n{rendered}");

    let analysis = match llm_factory(config) {
        Ok(client) => {
            let model = state
                .analysis_model
                .as_deref()
                .unwrap_or_else(|| config.default_analysis_model());
            let messages = vec![Message::user(prompt)];
            let result = client.complete(&messages, Some(model), 0.4).await;
            let text = result.and_then(|resp| client.get_text(&resp));
            client.close().await;
            match text {
                Ok(t) => truncate(&t, MAX_ANALYSIS_LEN),
                Err(e) => {
                    warn!(error = %e, "analyze: LLM failed, falling back to deterministic assembly");
                    deterministic_assembly(&state.items)
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "analyze: failed to build LLM client, falling back to deterministic assembly");
            deterministic_assembly(&state.items)
        }
    };

    state.analysis = analysis;
    Node::Respond
}

fn deterministic_assembly(items: &[crate::collector::CollectedItem]) -> String {
    items
        .iter()
        .take(5)
        .map(|item| {
            if item.url.is_empty() {
                format!("- {}", item.title)
            } else {
                format!("- [{}]({})", item.title, item.url)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn respond(state: &mut PipelineState) -> Node {
    let mut header = format!("{} — {}", state.source.to_uppercase(), state.query);
    if let Some(model) = &state.model {
        header.push_str(&format!(" ({model})"));
    }

    let mut body = header;
    if state.tried_sources.len() > 1 {
        let original = &state.tried_sources[0];
        body.push_str(&format!("\nTried {} first, used {}", original, state.source));
    }
    body.push('\n');
    body.push_str(&state.analysis);

    state.response = truncate(&body, MAX_RESPONSE_LEN);
    crate::metrics::record_pipeline_completion(&state.source, !state.error.is_empty());
    Node::End
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_response_strips_code_fences() {
        let text = "```json\n{\"source\": \"crypto\", \"query\": \"bitcoin\"}\n```";
        let (source, query) = parse_route_response(text, "fallback");
        assert_eq!(source, "crypto");
        assert_eq!(query, "bitcoin");
    }

    #[test]
    fn test_parse_route_response_unknown_source_coerces_to_news() {
        let text = "{\"source\": \"not_a_real_source\", \"query\": \"x\"}";
        let (source, _) = parse_route_response(text, "fallback");
        assert_eq!(source, "news");
    }

    #[test]
    fn test_parse_route_response_invalid_json_falls_back() {
        let (source, query) = parse_route_response("not json at all", "original message");
        assert_eq!(source, "news");
        assert_eq!(query, "original message");
    }

    #[test]
    fn test_decide_after_collect_items_present_goes_to_analyze() {
        let mut state = PipelineState::new("hi");
        state.items = vec![crate::collector::CollectedItem::new("news", "t")];
        assert_eq!(decide_after_collect(&state), Node::Analyze);
    }

    #[test]
    fn test_decide_after_collect_cap_reached_goes_to_analyze() {
        let mut state = PipelineState::new("hi");
        state.retry_count = MAX_RETRIES;
        assert_eq!(decide_after_collect(&state), Node::Analyze);
    }

    #[test]
    fn test_decide_after_collect_under_cap_goes_to_retry() {
        let state = PipelineState::new("hi");
        assert_eq!(decide_after_collect(&state), Node::Retry);
    }

    #[test]
    fn test_retry_picks_first_untried_fallback() {
        let mut state = PipelineState::new("hi");
        state.tried_sources = vec!["crypto".to_string()];
        state.source = "crypto".to_string();
        let next = retry(&mut state);
        assert_eq!(next, Node::Collect);
        assert_eq!(state.source, "cryptonews");
        assert_eq!(state.retry_count, 1);
    }

    #[test]
    fn test_retry_exhaustion_sets_sentinel() {
        let mut state = PipelineState::new("hi");
        state.source = "crypto".to_string();
        state.tried_sources = vec![
            "crypto".to_string(),
            "cryptonews".to_string(),
            "ddg_news".to_string(),
            "news".to_string(),
        ];
        let next = retry(&mut state);
        assert_eq!(next, Node::Analyze);
        assert_eq!(state.retry_count, RETRY_EXHAUSTED);
    }

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate("short", 100), "short");
    }

    #[test]
    fn test_truncate_long_text_adds_ellipsis() {
        let long = "a".repeat(10);
        let result = truncate(&long, 5);
        assert_eq!(result, "aa...");
        assert_eq!(result.chars().count(), 5);
    }

    #[test]
    fn test_respond_adds_tried_note_when_fallback_used() {
        let mut state = PipelineState::new("hi");
        state.source = "cryptonews".to_string();
        state.query = "btc".to_string();
        state.tried_sources = vec!["crypto".to_string(), "cryptonews".to_string()];
        state.analysis = "body text".to_string();
        respond(&mut state);
        assert!(state.response.contains("Tried crypto first, used cryptonews"));
    }

    #[test]
    fn test_respond_header_matches_source_and_query() {
        let mut state = PipelineState::new("hi");
        state.source = "weather".to_string();
        state.query = "London".to_string();
        state.tried_sources = vec!["weather".to_string()];
        state.analysis = "23°C, clear skies".to_string();
        respond(&mut state);
        assert!(state.response.starts_with("WEATHER — London"));
    }

    #[test]
    fn test_respond_no_tried_note_on_first_try() {
        let mut state = PipelineState::new("hi");
        state.source = "news".to_string();
        state.query = "q".to_string();
        state.tried_sources = vec!["news".to_string()];
        state.analysis = "body".to_string();
        respond(&mut state);
        assert!(!state.response.contains("Tried"));
    }

    #[test]
    fn test_deterministic_assembly_bullets_titles_with_links() {
        let items = vec![
            crate::collector::CollectedItem::new("news", "Headline A").with_url("https://a.example"),
            crate::collector::CollectedItem::new("news", "Headline B"),
        ];
        let out = deterministic_assembly(&items);
        assert!(out.contains("- [Headline A](https://a.example)"));
        assert!(out.contains("- Headline B"));
    }
}
