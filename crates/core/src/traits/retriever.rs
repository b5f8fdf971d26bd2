//! Retrieval collaborator traits

use async_trait::async_trait;

use crate::{Result, ScoredPassage};

/// Keyword search index
///
/// Deterministic for a fixed corpus. Results are ranked best-first.
#[async_trait]
pub trait KeywordIndex: Send + Sync + 'static {
    /// Search with an already tokenized query
    async fn search(&self, tokenized_query: &[String], k: usize) -> Result<Vec<ScoredPassage>>;

    /// Index name for logging
    fn name(&self) -> &str;
}

/// Vector search index
///
/// Implementations fail closed: a query embedding whose length differs
/// from [`VectorIndex::dimension`] yields an empty list and a logged
/// warning, never an error or panic.
#[async_trait]
pub trait VectorIndex: Send + Sync + 'static {
    /// Search by embedding
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredPassage>>;

    /// Declared embedding dimensionality
    fn dimension(&self) -> usize;

    /// Index name for logging
    fn name(&self) -> &str;
}

/// Embedding service
#[async_trait]
pub trait Embedder: Send + Sync + 'static {
    /// Embed text into a vector of [`Embedder::dimension`] floats
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Configured dimensionality
    fn dimension(&self) -> usize;
}
