//! Vector Store
//!
//! Dense vector storage and similarity search: Qdrant for deployments and an
//! in-memory cosine index for tests and small knowledge bases. Both fail
//! closed on a dimension mismatch: the mismatch is logged and the search
//! returns no hits.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, CreateCollectionBuilder, Distance, PointStruct,
        SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};
use sha2::{Digest, Sha256};

use medirag_config::{EmbeddingConfig, RetrievalConfig};
use medirag_core::{ScoredPassage, VectorIndex};

use crate::knowledge_loader::KnowledgeDocument;
use crate::RagError;

/// Writable side of a vector index
#[async_trait]
pub trait VectorStore: VectorIndex {
    /// Insert or replace documents with their embeddings
    async fn upsert(&self, documents: &[KnowledgeDocument], embeddings: &[Vec<f32>]) -> Result<usize, RagError>;
}

fn check_batch(documents: &[KnowledgeDocument], embeddings: &[Vec<f32>], dimension: usize) -> Result<(), RagError> {
    if documents.len() != embeddings.len() {
        return Err(RagError::VectorStore(
            "Document and embedding count mismatch".to_string(),
        ));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
        return Err(RagError::VectorStore(format!(
            "Embedding dimension {} does not match index dimension {}",
            bad.len(),
            dimension
        )));
    }
    Ok(())
}

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Vector dimension
    pub dimension: usize,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        use medirag_config::constants::{endpoints, rag};
        Self {
            endpoint: endpoints::QDRANT_DEFAULT.to_string(),
            collection: rag::QDRANT_COLLECTION.to_string(),
            dimension: rag::EMBEDDING_DIM,
            api_key: None,
        }
    }
}

impl VectorStoreConfig {
    pub fn from_settings(retrieval: &RetrievalConfig, embedding: &EmbeddingConfig) -> Self {
        Self {
            endpoint: retrieval.qdrant_endpoint.clone(),
            collection: retrieval.qdrant_collection.clone(),
            dimension: embedding.dimension,
            api_key: retrieval.qdrant_api_key.clone(),
        }
    }
}

/// Qdrant point ID for a string document ID
///
/// Qdrant accepts only integers or UUIDs, so the document ID is hashed and
/// kept verbatim in the `doc_id` payload field.
pub fn point_id(doc_id: &str) -> u64 {
    let digest = Sha256::digest(doc_id.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Qdrant-backed vector index
pub struct QdrantVectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl QdrantVectorStore {
    pub fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Create collection if not exists
    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(self.config.dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
            tracing::info!(collection = %self.config.collection, "Created Qdrant collection");
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, documents: &[KnowledgeDocument], embeddings: &[Vec<f32>]) -> Result<usize, RagError> {
        check_batch(documents, embeddings, self.config.dimension)?;

        let points: Vec<PointStruct> = documents
            .iter()
            .zip(embeddings.iter())
            .map(|(doc, emb)| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert("doc_id".to_string(), doc.id.clone().into());
                payload.insert("text".to_string(), doc.content.clone().into());
                payload.insert("title".to_string(), doc.title.clone().into());
                payload.insert("language".to_string(), doc.language.clone().into());
                if let Some(ref category) = doc.category {
                    payload.insert("category".to_string(), category.clone().into());
                }
                PointStruct::new(point_id(&doc.id), emb.clone(), payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        Ok(documents.len())
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorStore {
    async fn search(&self, embedding: &[f32], k: usize) -> medirag_core::Result<Vec<ScoredPassage>> {
        if embedding.len() != self.config.dimension {
            tracing::warn!(
                expected = self.config.dimension,
                actual = embedding.len(),
                collection = %self.config.collection,
                "Query embedding dimension mismatch"
            );
            return Ok(Vec::new());
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let request = SearchPointsBuilder::new(&self.config.collection, embedding.to_vec(), k as u64)
            .with_payload(true);
        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        let hits = response
            .result
            .into_iter()
            .map(|point| {
                let mut text = String::new();
                let mut doc_id = None;
                for (key, value) in point.payload {
                    if let Some(Kind::StringValue(s)) = value.kind {
                        match key.as_str() {
                            "text" => text = s,
                            "doc_id" => doc_id = Some(s),
                            _ => {},
                        }
                    }
                }
                let id = doc_id.unwrap_or_else(|| match point.id.and_then(|p| p.point_id_options) {
                    Some(PointIdOptions::Uuid(u)) => u,
                    Some(PointIdOptions::Num(n)) => n.to_string(),
                    None => String::new(),
                });
                ScoredPassage::new(id, text, point.score)
            })
            .collect();
        Ok(hits)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

struct Entry {
    id: String,
    text: String,
    /// unit length
    vector: Vec<f32>,
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Brute-force cosine index held in memory
pub struct InMemoryVectorStore {
    dimension: usize,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(&self, documents: &[KnowledgeDocument], embeddings: &[Vec<f32>]) -> Result<usize, RagError> {
        check_batch(documents, embeddings, self.dimension)?;
        let mut entries = self.entries.write();
        for (doc, emb) in documents.iter().zip(embeddings) {
            entries.retain(|e| e.id != doc.id);
            entries.push(Entry {
                id: doc.id.clone(),
                text: doc.content.clone(),
                vector: normalize(emb),
            });
        }
        Ok(documents.len())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorStore {
    async fn search(&self, embedding: &[f32], k: usize) -> medirag_core::Result<Vec<ScoredPassage>> {
        if embedding.len() != self.dimension {
            tracing::warn!(
                expected = self.dimension,
                actual = embedding.len(),
                "Query embedding dimension mismatch"
            );
            return Ok(Vec::new());
        }
        let query = normalize(embedding);
        let entries = self.entries.read();
        let mut scored: Vec<(f32, &Entry)> = entries
            .iter()
            .map(|e| (e.vector.iter().zip(&query).map(|(a, b)| a * b).sum::<f32>(), e))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, e)| ScoredPassage::new(e.id.clone(), e.text.clone(), score))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knowledge(id: &str, content: &str) -> KnowledgeDocument {
        KnowledgeDocument {
            id: id.to_string(),
            title: id.to_string(),
            content: content.to_string(),
            category: None,
            language: "en".to_string(),
            keywords: Vec::new(),
        }
    }

    #[test]
    fn test_config_default() {
        let config = VectorStoreConfig::default();
        assert_eq!(config.collection, "medical_knowledge");
        assert_eq!(config.dimension, 768);
    }

    #[test]
    fn test_point_id_is_stable() {
        assert_eq!(point_id("htn-001"), point_id("htn-001"));
        assert_ne!(point_id("htn-001"), point_id("htn-002"));
    }

    #[tokio::test]
    async fn test_in_memory_cosine_search() {
        let store = InMemoryVectorStore::new(3);
        store
            .upsert(
                &[knowledge("a", "alpha"), knowledge("b", "beta"), knowledge("c", "gamma")],
                &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.7, 0.7, 0.0]],
            )
            .await
            .unwrap();

        let hits = store.search(&[2.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "c");
        assert!(hits[0].score <= 1.0 + 1e-6);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_closed() {
        let store = InMemoryVectorStore::new(3);
        store
            .upsert(&[knowledge("a", "alpha")], &[vec![1.0, 0.0, 0.0]])
            .await
            .unwrap();
        let hits = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(hits.is_empty());

        let err = store.upsert(&[knowledge("b", "beta")], &[vec![1.0]]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = InMemoryVectorStore::new(2);
        store.upsert(&[knowledge("a", "old")], &[vec![1.0, 0.0]]).await.unwrap();
        store.upsert(&[knowledge("a", "new")], &[vec![0.0, 1.0]]).await.unwrap();
        assert_eq!(store.len(), 1);
        let hits = store.search(&[0.0, 1.0], 1).await.unwrap();
        assert_eq!(hits[0].text, "new");
    }
}
