//! Cloud LLM client — talks to an OpenAI-compatible `/chat/completions` endpoint.
//!
//! Carries the two branding headers most OpenAI-compatible routers (OpenRouter
//! and similar) use to attribute traffic.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{LlmClient, Message};
use crate::error::{OrchestratorError, Result};

const REFERER: &str = "https://research-orchestrator.app";
const TITLE: &str = "Research-Orchestrator";

pub struct CloudLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl CloudLlmClient {
    pub fn new(base_url: String, api_key: String, default_model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("reqwest client build should not fail");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
        }
    }
}

#[async_trait]
impl LlmClient for CloudLlmClient {
    async fn complete(&self, messages: &[Message], model: Option<&str>, temperature: f64) -> Result<Value> {
        let model_name = model.unwrap_or(&self.default_model);
        let payload = json!({
            "model": model_name,
            "messages": messages,
            "temperature": temperature,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&payload)
            .send()
            .await
            .map_err(OrchestratorError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::LlmError(format!(
                "cloud LLM returned {status}: {body}"
            )));
        }

        response.json::<Value>().await.map_err(OrchestratorError::HttpError)
    }

    fn get_text(&self, response: &Value) -> Result<String> {
        response["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| {
                OrchestratorError::LlmError("cloud LLM response missing choices[0].message.content".to_string())
            })
    }

    async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> CloudLlmClient {
        CloudLlmClient::new(
            "https://openrouter.ai/api/v1".to_string(),
            "test-key".to_string(),
            "deepseek/deepseek-chat".to_string(),
        )
    }

    #[test]
    fn test_get_text_extracts_content() {
        let c = client();
        let response = json!({ "choices": [{ "message": { "content": "analysis text" } }] });
        assert_eq!(c.get_text(&response).unwrap(), "analysis text");
    }

    #[test]
    fn test_get_text_missing_choices_errors() {
        let c = client();
        let response = json!({ "choices": [] });
        assert!(c.get_text(&response).is_err());
    }
}
