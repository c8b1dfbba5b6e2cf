//! LLM Gateway
//!
//! Provider-agnostic chat-completion abstraction. Two variants speak
//! slightly different wire envelopes (`local` and `cloud`); the trait's
//! `get_text` exists precisely because the envelope is not normalised, only
//! the extraction is.

pub mod cloud;
pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Config, LlmProvider};
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message], model: Option<&str>, temperature: f64) -> Result<Value>;

    fn get_text(&self, response: &Value) -> Result<String>;

    async fn health_check(&self) -> bool;

    async fn close(&self) {}
}

/// Constructs the configured provider's client. Fails loudly at boot (or
/// per-call, for callers that construct a fresh client per pipeline run)
/// rather than silently falling back when credentials are missing.
pub fn build_client(config: &Config) -> Result<Box<dyn LlmClient>> {
    match config.llm_provider {
        LlmProvider::Local => Ok(Box::new(local::LocalLlmClient::new(
            config.local_base_url.clone(),
            config.local_routing_model.clone(),
        ))),
        LlmProvider::Cloud => {
            let api_key = config.cloud_api_key.clone().ok_or_else(|| {
                OrchestratorError::ConfigMissing("cloud_api_key is required for llm_provider=cloud".to_string())
            })?;
            Ok(Box::new(cloud::CloudLlmClient::new(
                config.cloud_base_url.clone(),
                api_key,
                config.cloud_model.clone(),
            )))
        }
    }
}
