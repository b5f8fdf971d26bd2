//! Core traits and types for the retrieval-refinement loop
//!
//! This crate provides foundational types used across all other crates:
//! - The per-turn data model (documents, token plans, quality feedback,
//!   compression stats, iteration records)
//! - Collaborator traits for pluggable backends (keyword index, vector
//!   index, embedder, entity extractor, token counter)
//! - Conversation types
//! - Error types

pub mod conversation;
pub mod document;
pub mod error;
pub mod plan;
pub mod quality;
pub mod slots;
pub mod tokens;
pub mod traits;

pub use conversation::{Turn, TurnRole};
pub use document::{normalize_text, ContentHash, Document, DocumentSource, ScoredPassage};
pub use error::{Error, Result};
pub use plan::TokenPlan;
pub use quality::{
    clamp_unit, CompressionStats, CompressionStrategy, IterationRecord, QualityFeedback, SkipReason,
    TerminationReason,
};
pub use slots::{EntityCategory, EntitySlots};
pub use tokens::{truncate_to_tokens, HeuristicTokenCounter, TokenCounter};

pub use traits::{Embedder, EntityExtractor, KeywordIndex, VectorIndex};
