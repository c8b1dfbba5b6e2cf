//! Error types for the research orchestrator

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Feed parsing failed: {0}")]
    FeedError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Circuit breaker open for source: {0}")]
    CircuitBreakerOpen(String),

    #[error("API error: {code} - {message}")]
    ApiError { code: String, message: String },

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Required configuration missing: {0}")]
    ConfigMissing(String),

    #[error("LLM request failed: {0}")]
    LlmError(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid data: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
