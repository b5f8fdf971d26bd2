//! Knowledge Base Loader
//!
//! Reads knowledge documents from YAML/JSON files and indexes them into the
//! keyword index and, when an embedder is available, the vector store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use medirag_core::Embedder;

use crate::sparse_search::SparseIndex;
use crate::vector_store::VectorStore;
use crate::RagError;

/// Knowledge document format for YAML/JSON files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Unique document ID
    pub id: String,
    /// Document title
    pub title: String,
    /// Document content (indexed and embedded)
    pub content: String,
    /// Category/type (e.g., "condition", "medication", "guideline")
    #[serde(default)]
    pub category: Option<String>,
    /// Language code (e.g., "ko", "en")
    #[serde(default = "default_language")]
    pub language: String,
    /// Extra search terms, indexed with the title
    #[serde(default)]
    pub keywords: Vec<String>,
}

fn default_language() -> String {
    "ko".to_string()
}

/// Knowledge base file format
#[derive(Debug, Serialize, Deserialize)]
pub struct KnowledgeFile {
    /// Version for format compatibility
    #[serde(default)]
    pub version: Option<String>,
    /// List of documents
    pub documents: Vec<KnowledgeDocument>,
}

/// Counts from one indexing run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub keyword_indexed: usize,
    pub vector_indexed: usize,
}

pub struct KnowledgeLoader;

impl KnowledgeLoader {
    /// Read a knowledge file, or every YAML/JSON file in a directory
    ///
    /// Files that fail to parse are logged and skipped when reading a
    /// directory; a single unreadable file is an error. Blank documents and
    /// repeated IDs are dropped (first occurrence wins).
    pub fn read_path(path: &Path) -> Result<Vec<KnowledgeDocument>, RagError> {
        if !path.exists() {
            return Err(RagError::Knowledge(format!(
                "Knowledge path does not exist: {}",
                path.display()
            )));
        }

        let documents = if path.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(path)
                .map_err(|e| RagError::Knowledge(format!("Failed to read directory: {}", e)))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_knowledge_file(p))
                .collect();
            files.sort();

            let mut all = Vec::new();
            for file in files {
                match Self::read_file(&file) {
                    Ok(mut docs) => {
                        tracing::info!(file = %file.display(), documents = docs.len(), "Loaded knowledge file");
                        all.append(&mut docs);
                    },
                    Err(e) => {
                        tracing::error!(file = %file.display(), error = %e, "Failed to load knowledge file");
                    },
                }
            }
            all
        } else {
            Self::read_file(path)?
        };

        Ok(dedupe(documents))
    }

    /// Read a single knowledge file
    pub fn read_file(path: &Path) -> Result<Vec<KnowledgeDocument>, RagError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RagError::Knowledge(format!("Failed to read file: {}", e)))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let knowledge: KnowledgeFile = match extension {
            "json" => serde_json::from_str(&content)
                .map_err(|e| RagError::Knowledge(format!("JSON parse error: {}", e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| RagError::Knowledge(format!("YAML parse error: {}", e)))?,
            _ => {
                return Err(RagError::Knowledge(format!(
                    "Unsupported file type: {}",
                    extension
                )))
            },
        };
        Ok(knowledge.documents)
    }

    /// Index documents into the keyword index and optional vector store
    ///
    /// A failed embedding skips the vector side for that document only.
    pub async fn index(
        documents: &[KnowledgeDocument],
        keyword: &SparseIndex,
        vector: Option<(&dyn VectorStore, &dyn Embedder)>,
    ) -> Result<IndexReport, RagError> {
        let mut report = IndexReport {
            keyword_indexed: keyword.index_documents(documents)?,
            ..Default::default()
        };

        if let Some((store, embedder)) = vector {
            let mut embedded = Vec::with_capacity(documents.len());
            let mut embeddings = Vec::with_capacity(documents.len());
            for doc in documents {
                match embedder.embed(&doc.content).await {
                    Ok(embedding) => {
                        embedded.push(doc.clone());
                        embeddings.push(embedding);
                    },
                    Err(e) => {
                        tracing::warn!(id = %doc.id, error = %e, "Embedding failed, keyword only");
                    },
                }
            }
            if !embedded.is_empty() {
                report.vector_indexed = store.upsert(&embedded, &embeddings).await?;
            }
        }

        tracing::info!(
            keyword = report.keyword_indexed,
            vector = report.vector_indexed,
            "Knowledge base indexed"
        );
        Ok(report)
    }

    /// Read `path` and index it
    pub async fn load(
        path: &Path,
        keyword: &SparseIndex,
        vector: Option<(&dyn VectorStore, &dyn Embedder)>,
    ) -> Result<IndexReport, RagError> {
        let documents = Self::read_path(path)?;
        Self::index(&documents, keyword, vector).await
    }
}

fn is_knowledge_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml" | "json")
    )
}

fn dedupe(documents: Vec<KnowledgeDocument>) -> Vec<KnowledgeDocument> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|doc| {
            if doc.content.trim().is_empty() {
                tracing::warn!(id = %doc.id, "Skipping knowledge document without content");
                return false;
            }
            if !seen.insert(doc.id.clone()) {
                tracing::warn!(id = %doc.id, "Skipping duplicate knowledge document ID");
                return false;
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse_search::SparseConfig;
    use crate::vector_store::InMemoryVectorStore;
    use async_trait::async_trait;
    use tempfile::tempdir;

    const SAMPLE_YAML: &str = r#"
version: "1.0"
documents:
  - id: htn_001
    title: 고혈압 정의
    content: 수축기 혈압 140 mmHg 이상 또는 이완기 혈압 90 mmHg 이상이면 고혈압입니다.
    category: condition
    keywords: [고혈압, 혈압]
  - id: dm_001
    title: Metformin
    content: Metformin is the first line medication for type 2 diabetes.
    language: en
  - id: htn_001
    title: duplicate
    content: should be dropped
  - id: blank
    title: blank
    content: "   "
"#;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        async fn embed(&self, text: &str) -> medirag_core::Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_read_file_dedupes_and_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medical.yaml");
        std::fs::write(&path, SAMPLE_YAML).unwrap();

        let docs = KnowledgeLoader::read_path(&path).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].language, "ko");
        assert_eq!(docs[0].keywords, vec!["고혈압", "혈압"]);
        assert_eq!(docs[1].language, "en");
    }

    #[test]
    fn test_directory_skips_bad_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), SAMPLE_YAML).unwrap();
        std::fs::write(dir.path().join("b.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let docs = KnowledgeLoader::read_path(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[test]
    fn test_missing_path_is_error() {
        assert!(KnowledgeLoader::read_path(Path::new("/nonexistent/knowledge")).is_err());
    }

    #[tokio::test]
    async fn test_load_indexes_both_sides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("medical.yml");
        std::fs::write(&path, SAMPLE_YAML).unwrap();

        let sparse = SparseIndex::new(SparseConfig::default()).unwrap();
        let store = InMemoryVectorStore::new(2);
        let report = KnowledgeLoader::load(&path, &sparse, Some((&store, &LengthEmbedder)))
            .await
            .unwrap();

        assert_eq!(report.keyword_indexed, 2);
        assert_eq!(report.vector_indexed, 2);
        assert_eq!(sparse.doc_count(), 2);
        assert_eq!(store.len(), 2);
    }
}
