//! Retrieval with hybrid search and budget-aware context assembly
//!
//! Features:
//! - Token budget allocation per turn
//! - Sparse BM25 search via Tantivy
//! - Dense vector search via Qdrant or an in-memory index
//! - Reciprocal rank fusion with deterministic tie-breaking
//! - Budget-aware selection and multi-factor context compression
//! - Knowledge base loading from YAML/JSON
//! - Process-scoped retriever registry keyed by routing label

pub mod budget;
pub mod compressor;
pub mod embeddings;
pub mod fusion;
pub mod knowledge_loader;
pub mod registry;
pub mod retriever;
pub mod sparse_search;
pub mod vector_store;

pub use budget::{SectionDemand, TokenBudgetAllocator};
pub use compressor::{
    CompressionOutput, CompressorConfig, ContextCompressor, DomainTerms, LlmSummarizer, Summarizer,
    MEASUREMENT_PATTERN,
};
pub use embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use fusion::RankFuser;
pub use knowledge_loader::{IndexReport, KnowledgeDocument, KnowledgeFile, KnowledgeLoader};
pub use registry::RetrieverRegistry;
pub use retriever::{
    effective_k, select_within_budget, tokenize_query, HybridRetriever, RetrievalResult,
    RetrieverConfig,
};
pub use sparse_search::{SparseConfig, SparseIndex};
pub use vector_store::{point_id, InMemoryVectorStore, QdrantVectorStore, VectorStore, VectorStoreConfig};

use medirag_config::ConfigError;
use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Knowledge base error: {0}")]
    Knowledge(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl From<ConfigError> for RagError {
    fn from(err: ConfigError) -> Self {
        RagError::Config(err.to_string())
    }
}

impl From<RagError> for medirag_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Embedding(msg) => medirag_core::Error::Embedding(msg),
            RagError::VectorStore(msg) => medirag_core::Error::VectorIndex(msg),
            RagError::Search(msg) | RagError::Index(msg) => medirag_core::Error::KeywordIndex(msg),
            RagError::Config(msg) => medirag_core::Error::Config(msg),
            RagError::Timeout(ms) => medirag_core::Error::Timeout(ms),
            other => medirag_core::Error::Rag(other.to_string()),
        }
    }
}
