//! End-to-end tests for the pipeline state machine, with mock collectors
//! standing in for network upstreams and a scripted LLM client standing in
//! for the gateway.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use research_orchestrator::collector::{CollectOptions, Collector, CollectedItem, CollectorRegistry};
use research_orchestrator::config::{Config, LlmProvider};
use research_orchestrator::error::{OrchestratorError, Result};
use research_orchestrator::llm::{LlmClient, Message};
use research_orchestrator::pipeline::{self, PipelineState};

fn test_config() -> Config {
    Config {
        llm_provider: LlmProvider::Local,
        local_base_url: "http://localhost:11434".to_string(),
        local_routing_model: "llama3.2".to_string(),
        local_analysis_model: "llama3.2".to_string(),
        cloud_api_key: None,
        cloud_model: "openai/gpt-4o-mini".to_string(),
        cloud_base_url: "https://openrouter.ai/api/v1".to_string(),
        github_token: None,
        serper_api_key: None,
        rapidapi_key: None,
        database_url: Some("postgres://localhost/test".to_string()),
        daily_hour: 7,
        daily_minute: 0,
        daily_sources: vec!["news".to_string()],
        group_sink_id: None,
        default_weather_location: "London".to_string(),
        default_stock_symbols: "AAPL,MSFT,GOOGL".to_string(),
        default_reddit_subreddit: "technology".to_string(),
        max_concurrent_requests: 10,
        circuit_breaker_failure_threshold: 5,
        circuit_breaker_open_duration_secs: 30,
        metrics_port: 9090,
        metrics_enabled: false,
        log_level: "error".to_string(),
        json_logs: false,
    }
}

/// A collector whose `collect` outcomes are pre-scripted per call, in order.
struct MockCollector {
    name: String,
    outcomes: Mutex<Vec<Result<Vec<CollectedItem>>>>,
}

impl MockCollector {
    fn new(name: &str, outcomes: Vec<Result<Vec<CollectedItem>>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            outcomes: Mutex::new(outcomes),
        })
    }

    fn always_empty(name: &str) -> Arc<Self> {
        Self::new(name, vec![Ok(Vec::new())])
    }
}

#[async_trait]
impl Collector for MockCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&self, _query: &str, _options: CollectOptions) -> Result<Vec<CollectedItem>> {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            Ok(Vec::new())
        } else {
            outcomes.remove(0)
        }
    }
}

fn registry_with(collectors: Vec<(&str, Arc<dyn Collector>)>) -> CollectorRegistry {
    let mut map: HashMap<String, Arc<dyn Collector>> = HashMap::new();
    for (key, collector) in collectors {
        map.insert(key.to_string(), collector);
    }
    CollectorRegistry::from_map(map)
}

/// Fills in every registry key the fallback policy might reach for with an
/// always-empty collector, then overrides specific keys with scripted ones.
fn full_registry_with_overrides(overrides: Vec<(&str, Arc<dyn Collector>)>) -> CollectorRegistry {
    const ALL_KEYS: &[&str] = &[
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

    let mut map: HashMap<String, Arc<dyn Collector>> = HashMap::new();
    for key in ALL_KEYS {
        map.insert(key.to_string(), MockCollector::always_empty(key));
    }
    for (key, collector) in overrides {
        map.insert(key.to_string(), collector);
    }
    CollectorRegistry::from_map(map)
}

/// An LLM client whose responses are scripted by inspecting the prompt:
/// routing prompts contain "routing a user request"; everything else is
/// treated as an analysis call.
struct ScriptedLlmClient {
    route_response: Option<Value>,
    analysis_text: Option<String>,
    fail_analysis: bool,
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message], _model: Option<&str>, _temperature: f64) -> Result<Value> {
        let prompt = messages.first().map(|m| m.content.as_str()).unwrap_or_default();
        if prompt.contains("routing a user request") {
            Ok(self.route_response.clone().unwrap_or_else(|| json!({"text": "{}"})))
        } else if self.fail_analysis {
            Err(OrchestratorError::LlmError("simulated analysis failure".to_string()))
        } else {
            Ok(json!({ "text": self.analysis_text.clone().unwrap_or_default() }))
        }
    }

    fn get_text(&self, response: &Value) -> Result<String> {
        response["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| OrchestratorError::LlmError("missing text field".to_string()))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

fn scripted_factory(
    route_response: Option<Value>,
    analysis_text: Option<String>,
) -> impl Fn(&Config) -> Result<Box<dyn LlmClient>> + Sync {
    move |_config: &Config| {
        Ok(Box::new(ScriptedLlmClient {
            route_response: route_response.clone(),
            analysis_text: analysis_text.clone(),
            fail_analysis: false,
        }) as Box<dyn LlmClient>)
    }
}

// Scenario 1: preset route, one-shot success.
#[tokio::test]
async fn test_preset_route_one_shot_success() {
    let item = CollectedItem::new("weather", "London forecast").with_content("23°C, clear skies");
    let registry = registry_with(vec![("weather", MockCollector::new("weather", vec![Ok(vec![item])]))]);
    let config = test_config();
    let factory = scripted_factory(None, Some("23°C and clear.".to_string()));

    let state = PipelineState::new("whatever").with_source_and_query("weather", "London");
    let result = pipeline::run_with_llm_factory(&registry, &config, state, &factory).await;

    assert_eq!(result.tried_sources, vec!["weather".to_string()]);
    assert_eq!(result.retry_count, 0);
    assert!(!result.analysis.is_empty());
    assert!(result.response.starts_with("WEATHER — London"));
}

// Scenario 2: router picks a source from free text.
#[tokio::test]
async fn test_router_picks_source_from_free_text() {
    let item = CollectedItem::new("wikipedia", "Python (programming language)");
    let registry = registry_with(vec![(
        "wikipedia",
        MockCollector::new("wikipedia", vec![Ok(vec![item])]),
    )]);
    let config = test_config();
    let route_response = json!({ "text": "{\"source\": \"wikipedia\", \"query\": \"Python programming\"}" });
    let factory = scripted_factory(Some(route_response), Some("Python is a language.".to_string()));

    let state = PipelineState::new("Tell me about Python programming");
    let result = pipeline::run_with_llm_factory(&registry, &config, state, &factory).await;

    assert_eq!(result.tried_sources.first().map(String::as_str), Some("wikipedia"));
}

// Scenario 3: first source empty, fallback succeeds.
#[tokio::test]
async fn test_first_source_empty_fallback_succeeds() {
    let registry = full_registry_with_overrides(vec![
        ("crypto", MockCollector::new("crypto", vec![Ok(Vec::new())])),
        (
            "cryptonews",
            MockCollector::new("cryptonews", vec![Ok(vec![CollectedItem::new("cryptonews", "BTC rallies")])]),
        ),
    ]);
    let config = test_config();
    let factory = scripted_factory(None, Some("Bitcoin is up.".to_string()));

    let state = PipelineState::new("btc").with_source_and_query("crypto", "btc");
    let result = pipeline::run_with_llm_factory(&registry, &config, state, &factory).await;

    assert_eq!(result.tried_sources, vec!["crypto".to_string(), "cryptonews".to_string()]);
    assert_eq!(result.retry_count, 1);
    assert!(result.response.contains("Tried crypto first, used cryptonews"));
}

// Scenario 4: all fallbacks exhausted.
#[tokio::test]
async fn test_all_fallbacks_exhausted() {
    let registry = full_registry_with_overrides(vec![]);
    let config = test_config();
    let factory = scripted_factory(None, Some("unused".to_string()));

    let state = PipelineState::new("btc").with_source_and_query("crypto", "btc");
    let result = pipeline::run_with_llm_factory(&registry, &config, state, &factory).await;

    assert!(result.retry_count == 2 || result.retry_count == 99);
    assert!(!result.response.is_empty());
    assert!(result.response.len() <= 4096);
    assert!(result.analysis.contains("No data") || result.analysis.contains("No results"));
}

// Scenario 5: collector raises, fallback chain engaged.
#[tokio::test]
async fn test_collector_error_triggers_fallback() {
    let registry = full_registry_with_overrides(vec![
        (
            "crypto",
            MockCollector::new(
                "crypto",
                vec![Err(OrchestratorError::ConnectionLost("timed out".to_string()))],
            ),
        ),
        (
            "cryptonews",
            MockCollector::new("cryptonews", vec![Ok(vec![CollectedItem::new("cryptonews", "ETH news")])]),
        ),
    ]);
    let config = test_config();
    let factory = scripted_factory(None, Some("Ether is steady.".to_string()));

    let state = PipelineState::new("eth").with_source_and_query("crypto", "eth");
    let result = pipeline::run_with_llm_factory(&registry, &config, state, &factory).await;

    assert_eq!(result.tried_sources.len(), 2);
    assert!(result.error.is_empty());
    assert!(!result.analysis.is_empty());
}

#[tokio::test]
async fn test_analyze_falls_back_to_deterministic_assembly_on_llm_failure() {
    let item = CollectedItem::new("news", "Headline").with_url("https://example.com/a");
    let registry = registry_with(vec![("news", MockCollector::new("news", vec![Ok(vec![item])]))]);
    let config = test_config();
    let factory = move |_: &Config| {
        Ok(Box::new(ScriptedLlmClient {
            route_response: None,
            analysis_text: None,
            fail_analysis: true,
        }) as Box<dyn LlmClient>)
    };

    let state = PipelineState::new("whatever").with_source_and_query("news", "today");
    let result = pipeline::run_with_llm_factory(&registry, &config, state, &factory).await;

    assert!(result.analysis.contains("- [Headline](https://example.com/a)"));
}
