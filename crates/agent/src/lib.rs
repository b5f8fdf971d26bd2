//! Retrieval-refinement agent
//!
//! Features:
//! - Rule-based intent triage with dynamic k
//! - Lexicon entity extraction for structured slots
//! - LLM quality evaluation with a heuristic fallback
//! - Feedback-driven query rewriting
//! - Pluggable refine strategies with duplicate/stagnation safeguards
//! - Full per-turn pipeline with a JSONL audit trail

pub mod audit;
pub mod entities;
pub mod evaluator;
pub mod intent;
pub mod pipeline;
pub mod refine;
pub mod rewriter;

pub use audit::{sink_from_settings, AuditSink, JsonlAuditLog, NoopAuditLog, TurnAuditRecord};
pub use entities::LexiconEntityExtractor;
pub use evaluator::{EvaluationRequest, QualityEvaluator};
pub use intent::{Complexity, IntentClassifier, IntentDecision};
pub use pipeline::{TurnComponents, TurnProcessor, TurnProcessorConfig, TurnRequest, TurnResponse};
pub use refine::{
    BasicStrategy, CorrectiveStrategy, RefineController, RefineDecision, RefineInput, RefineOutcome,
    RefineState, RefineStrategy, Safeguards, StrategyDeps, StrategyRegistry,
};
pub use rewriter::{QueryRewriter, RewriteRequest};

use thiserror::Error;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Classification error: {0}")]
    Classification(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Rewrite error: {0}")]
    Rewrite(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl From<medirag_llm::LlmError> for AgentError {
    fn from(err: medirag_llm::LlmError) -> Self {
        AgentError::Llm(err.to_string())
    }
}

impl From<medirag_rag::RagError> for AgentError {
    fn from(err: medirag_rag::RagError) -> Self {
        match err {
            medirag_rag::RagError::Config(msg) => AgentError::Config(msg),
            other => AgentError::Retrieval(other.to_string()),
        }
    }
}

impl From<medirag_config::ConfigError> for AgentError {
    fn from(err: medirag_config::ConfigError) -> Self {
        AgentError::Config(err.to_string())
    }
}

impl From<AgentError> for medirag_core::Error {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Config(msg) => medirag_core::Error::Config(msg),
            AgentError::Llm(msg) => medirag_core::Error::Llm(msg),
            AgentError::Timeout(ms) => medirag_core::Error::Timeout(ms),
            other => medirag_core::Error::Agent(other.to_string()),
        }
    }
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
pub(crate) fn char_preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
