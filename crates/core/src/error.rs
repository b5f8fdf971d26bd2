//! Error types shared across crates

use thiserror::Error;

/// Result alias using the core error type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
///
/// Each crate has its own error enum and converts into this one at crate
/// boundaries.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Retrieval error: {0}")]
    Rag(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Keyword index error: {0}")]
    KeywordIndex(String),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Entity extraction error: {0}")]
    Extraction(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
