//! Text generation
//!
//! Features:
//! - One request/response contract ([`LlmBackend`], [`GenerateRequest`])
//! - Ollama and OpenAI-compatible HTTP backends with retry and backoff
//! - Fingerprint-keyed, append-only response cache
//! - Budget-aware answer prompt assembly

pub mod backend;
pub mod cache;
pub mod factory;
pub mod prompt;

pub use backend::{
    FinishReason, GenerateRequest, GenerationResult, LlmBackend, LlmConfig, OllamaBackend,
    OpenAIBackend,
};
pub use cache::{CacheStats, CachedBackend};
pub use factory::create_backend;
pub use prompt::{Message, PromptBuilder, Role};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Empty completion")]
    EmptyCompletion,

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Network errors, 5xx responses and timeouts are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for medirag_core::Error {
    fn from(err: LlmError) -> Self {
        medirag_core::Error::Llm(err.to_string())
    }
}
