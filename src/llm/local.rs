//! Local LLM client — talks to an Ollama-compatible `/api/chat` endpoint.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{LlmClient, Message};
use crate::error::{OrchestratorError, Result};

pub struct LocalLlmClient {
    http: reqwest::Client,
    base_url: String,
    default_model: String,
}

impl LocalLlmClient {
    pub fn new(base_url: String, default_model: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("reqwest client build should not fail");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
        }
    }
}

#[async_trait]
impl LlmClient for LocalLlmClient {
    async fn complete(&self, messages: &[Message], model: Option<&str>, temperature: f64) -> Result<Value> {
        let model_name = model.unwrap_or(&self.default_model);
        let payload = json!({
            "model": model_name,
            "messages": messages,
            "stream": false,
            "options": { "temperature": temperature },
        });

        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(OrchestratorError::HttpError)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::LlmError(format!(
                "local LLM returned {status}: {body}"
            )));
        }

        response.json::<Value>().await.map_err(OrchestratorError::HttpError)
    }

    fn get_text(&self, response: &Value) -> Result<String> {
        response["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| OrchestratorError::LlmError("local LLM response missing message.content".to_string()))
    }

    async fn health_check(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
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

    #[test]
    fn test_get_text_extracts_content() {
        let client = LocalLlmClient::new("http://localhost:11434".to_string(), "llama3.1:8b".to_string());
        let response = json!({ "message": { "role": "assistant", "content": "hello there" } });
        assert_eq!(client.get_text(&response).unwrap(), "hello there");
    }

    #[test]
    fn test_get_text_missing_content_errors() {
        let client = LocalLlmClient::new("http://localhost:11434".to_string(), "llama3.1:8b".to_string());
        let response = json!({ "message": {} });
        assert!(client.get_text(&response).is_err());
    }
}
