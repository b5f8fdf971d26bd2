//! Retrieved documents and content hashing

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Which retrieval path produced a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    /// Keyword (BM25) search
    Keyword,
    /// Vector (embedding) search
    Vector,
    /// Produced by rank fusion (appeared in more than one list)
    Fused,
}

impl DocumentSource {
    /// Tie-break priority after fusion; lower sorts first
    pub fn priority(&self) -> u8 {
        match self {
            DocumentSource::Fused => 0,
            DocumentSource::Keyword => 1,
            DocumentSource::Vector => 2,
        }
    }
}

impl std::fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentSource::Keyword => write!(f, "keyword"),
            DocumentSource::Vector => write!(f, "vector"),
            DocumentSource::Fused => write!(f, "fused"),
        }
    }
}

/// Raw hit returned by a keyword or vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub id: String,
    pub text: String,
    pub score: f32,
}

impl ScoredPassage {
    pub fn new(id: impl Into<String>, text: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
        }
    }
}

/// Evidence document
///
/// Produced by retrieval and consumed read-only afterwards. `score` holds the
/// source score until fusion overwrites it with the RRF score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document ID
    pub id: String,
    /// Document text
    pub text: String,
    /// Source score, or RRF score after fusion
    pub score: f32,
    /// 1-based rank within the list that produced it
    pub rank: usize,
    /// Retrieval path
    pub source: DocumentSource,
    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        score: f32,
        rank: usize,
        source: DocumentSource,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
            rank,
            source,
            metadata: HashMap::new(),
        }
    }

    /// Convert a ranked list of index hits into documents with 1-based ranks
    pub fn from_passages(passages: Vec<ScoredPassage>, source: DocumentSource) -> Vec<Self> {
        passages
            .into_iter()
            .enumerate()
            .map(|(i, p)| Self::new(p.id, p.text, p.score, i + 1, source))
            .collect()
    }

    /// Fusion key: the normalized text
    pub fn fusion_key(&self) -> String {
        normalize_text(&self.text)
    }

    /// Content hash of the normalized text
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::of(&self.text)
    }
}

/// Lowercase, collapse whitespace and trim
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 over normalized text, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn of(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_text(text).as_bytes());
        ContentHash(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Blood   Pressure\n"), "blood pressure");
    }

    #[test]
    fn test_content_hash_ignores_case_and_spacing() {
        assert_eq!(
            ContentHash::of("Metformin lowers glucose."),
            ContentHash::of("metformin   lowers GLUCOSE.")
        );
        assert_ne!(ContentHash::of("a"), ContentHash::of("b"));
    }

    #[test]
    fn test_from_passages_assigns_ranks() {
        let docs = Document::from_passages(
            vec![ScoredPassage::new("a", "first", 2.0), ScoredPassage::new("b", "second", 1.0)],
            DocumentSource::Keyword,
        );
        assert_eq!(docs[0].rank, 1);
        assert_eq!(docs[1].rank, 2);
        assert_eq!(docs[1].source, DocumentSource::Keyword);
    }

    #[test]
    fn test_source_priority() {
        assert!(DocumentSource::Fused.priority() < DocumentSource::Keyword.priority());
        assert!(DocumentSource::Keyword.priority() < DocumentSource::Vector.priority());
    }
}
