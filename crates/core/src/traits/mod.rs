//! Collaborator traits consumed by the retrieval-refinement loop
//!
//! The loop owns no wire format; every external system sits behind one of
//! these traits so backends can be swapped and mocked in tests.
//!
//! ```text
//! Retrieval:
//!   - KeywordIndex: tokenized query -> ranked passages (BM25 or similar)
//!   - VectorIndex: embedding -> ranked passages
//!   - Embedder: text -> fixed-dimension vector
//!
//! Domain:
//!   - EntityExtractor: text -> entities by category
//! ```
//!
//! The token estimator lives in [`crate::tokens`].

mod extractor;
mod retriever;

pub use extractor::EntityExtractor;
pub use retriever::{Embedder, KeywordIndex, VectorIndex};
