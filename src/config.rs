//! Configuration for the research orchestrator
//!
//! Layered over environment variables via the `config` crate, with an
//! optional local `.env` for development. Every field has a default so the
//! service boots with nothing set beyond the database URL and whichever LLM
//! provider keys it needs.

use anyhow::{bail, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Local,
    Cloud,
}

impl Default for LlmProvider {
    fn default() -> Self {
        LlmProvider::Local
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // LLM provider selection
    #[serde(default)]
    pub llm_provider: LlmProvider,

    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,
    #[serde(default = "default_local_routing_model")]
    pub local_routing_model: String,
    #[serde(default = "default_local_analysis_model")]
    pub local_analysis_model: String,

    pub cloud_api_key: Option<String>,
    #[serde(default = "default_cloud_model")]
    pub cloud_model: String,
    #[serde(default = "default_cloud_base_url")]
    pub cloud_base_url: String,

    // Optional per-collector API keys
    pub github_token: Option<String>,
    pub serper_api_key: Option<String>,
    pub rapidapi_key: Option<String>,

    // Database
    pub database_url: Option<String>,

    // Scheduler
    #[serde(default = "default_daily_hour")]
    pub daily_hour: u32,
    #[serde(default = "default_daily_minute")]
    pub daily_minute: u32,
    #[serde(default = "default_daily_sources")]
    pub daily_sources: Vec<String>,
    pub group_sink_id: Option<String>,

    // Per-collector query defaults
    #[serde(default = "default_weather_location")]
    pub default_weather_location: String,
    #[serde(default = "default_stock_symbols")]
    pub default_stock_symbols: String,
    #[serde(default = "default_reddit_subreddit")]
    pub default_reddit_subreddit: String,

    // Concurrency / resilience
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_failure_threshold: u32,
    #[serde(default = "default_circuit_breaker_timeout")]
    pub circuit_breaker_open_duration_secs: u64,

    // Metrics server
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    // Logging
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
}

fn default_local_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_local_routing_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_local_analysis_model() -> String {
    "llama3.1:70b".to_string()
}

fn default_cloud_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_cloud_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_daily_hour() -> u32 {
    7
}

fn default_daily_minute() -> u32 {
    0
}

fn default_daily_sources() -> Vec<String> {
    vec![
        "news".to_string(),
        "crypto".to_string(),
        "weather".to_string(),
    ]
}

fn default_weather_location() -> String {
    "London".to_string()
}

fn default_stock_symbols() -> String {
    "AAPL,MSFT,GOOGL".to_string()
}

fn default_reddit_subreddit() -> String {
    "technology".to_string()
}

fn default_max_concurrent_requests() -> usize {
    10
}

fn default_circuit_breaker_threshold() -> u32 {
    5
}

fn default_circuit_breaker_timeout() -> u64 {
    30
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("daily_sources"),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Validates provider-specific requirements at boot rather than on the
    /// first request. `database_url` is intentionally not required here —
    /// `query`/`sources` run without a database, while `serve-daily` and
    /// `subscribers` check for it themselves and fail with a command-specific
    /// message.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.llm_provider, LlmProvider::Cloud) && self.cloud_api_key.is_none() {
            bail!("llm_provider is 'cloud' but cloud_api_key is not set");
        }
        Ok(())
    }

    /// The large/quality model the analyze node should use by default,
    /// per whichever provider is configured. Cloud has a single model; only
    /// the local provider distinguishes a routing model from an analysis one.
    pub fn default_analysis_model(&self) -> &str {
        match self.llm_provider {
            LlmProvider::Local => &self.local_analysis_model,
            LlmProvider::Cloud => &self.cloud_model,
        }
    }

    pub fn has_github_token(&self) -> bool {
        self.github_token.is_some()
    }

    pub fn has_serper(&self) -> bool {
        self.serper_api_key.is_some()
    }

    pub fn has_rapidapi(&self) -> bool {
        self.rapidapi_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_llm_provider_is_local() {
        assert_eq!(LlmProvider::default(), LlmProvider::Local);
    }

    #[test]
    fn test_default_daily_sources() {
        let sources = default_daily_sources();
        assert_eq!(sources, vec!["news", "crypto", "weather"]);
    }

    #[test]
    fn test_validate_requires_cloud_key_when_cloud_selected() {
        let cfg = Config {
            llm_provider: LlmProvider::Cloud,
            local_base_url: default_local_base_url(),
            local_routing_model: default_local_routing_model(),
            local_analysis_model: default_local_analysis_model(),
            cloud_api_key: None,
            cloud_model: default_cloud_model(),
            cloud_base_url: default_cloud_base_url(),
            github_token: None,
            serper_api_key: None,
            rapidapi_key: None,
            database_url: Some("postgres://localhost/test".to_string()),
            daily_hour: default_daily_hour(),
            daily_minute: default_daily_minute(),
            daily_sources: default_daily_sources(),
            group_sink_id: None,
            default_weather_location: default_weather_location(),
            default_stock_symbols: default_stock_symbols(),
            default_reddit_subreddit: default_reddit_subreddit(),
            max_concurrent_requests: default_max_concurrent_requests(),
            circuit_breaker_failure_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_open_duration_secs: default_circuit_breaker_timeout(),
            metrics_port: default_metrics_port(),
            metrics_enabled: default_metrics_enabled(),
            log_level: default_log_level(),
            json_logs: false,
        };
        assert!(cfg.validate().is_err());
    }

    fn sample_config(llm_provider: LlmProvider) -> Config {
        Config {
            llm_provider,
            local_base_url: default_local_base_url(),
            local_routing_model: default_local_routing_model(),
            local_analysis_model: default_local_analysis_model(),
            cloud_api_key: Some("test-key".to_string()),
            cloud_model: default_cloud_model(),
            cloud_base_url: default_cloud_base_url(),
            github_token: None,
            serper_api_key: None,
            rapidapi_key: None,
            database_url: Some("postgres://localhost/test".to_string()),
            daily_hour: default_daily_hour(),
            daily_minute: default_daily_minute(),
            daily_sources: default_daily_sources(),
            group_sink_id: None,
            default_weather_location: default_weather_location(),
            default_stock_symbols: default_stock_symbols(),
            default_reddit_subreddit: default_reddit_subreddit(),
            max_concurrent_requests: default_max_concurrent_requests(),
            circuit_breaker_failure_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_open_duration_secs: default_circuit_breaker_timeout(),
            metrics_port: default_metrics_port(),
            metrics_enabled: default_metrics_enabled(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }

    #[test]
    fn test_default_analysis_model_local_uses_local_analysis_model() {
        let cfg = sample_config(LlmProvider::Local);
        assert_eq!(cfg.default_analysis_model(), default_local_analysis_model());
        assert_ne!(cfg.default_analysis_model(), cfg.local_routing_model);
    }

    #[test]
    fn test_default_analysis_model_cloud_uses_cloud_model() {
        let cfg = sample_config(LlmProvider::Cloud);
        assert_eq!(cfg.default_analysis_model(), default_cloud_model());
    }
}
