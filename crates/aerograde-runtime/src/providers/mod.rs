//! LLM provider abstraction for the judge.
//!
//! The provider trait is the ONLY place where network calls are made. The
//! deterministic core never sees it; the judge drives it with temperature 0
//! and a JSON-only response format so reruns stay reproducible.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod openai;

pub use openai::OpenAiProvider;

/// Errors from LLM providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("response parse error: {0}")]
    ParseError(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use.
    pub model: String,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Temperature; 0.0 for deterministic adjudication.
    pub temperature: f32,

    /// Hard request timeout.
    pub timeout: Duration,

    /// Force a JSON-object response.
    pub json_only: bool,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 2000,
            temperature: 0.0,
            timeout: Duration::from_secs(60),
            json_only: true,
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system" or "user".
    pub role: String,

    /// Message content.
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Provider abstraction, so judge backends can be swapped or mocked.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Provider name for logs and metadata.
    fn name(&self) -> &str;
}
