//! Application State
//!
//! Process-scoped handles shared by every handler. Built once at startup;
//! nothing here is mutated per request.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use medirag_agent::TurnProcessor;
use medirag_config::{Settings, VectorBackend};
use medirag_core::{Embedder, HeuristicTokenCounter, TokenCounter, VectorIndex};
use medirag_llm::{create_backend, LlmBackend};
use medirag_rag::{
    HybridRetriever, InMemoryVectorStore, KnowledgeLoader, OllamaEmbedder, OllamaEmbeddingConfig,
    QdrantVectorStore, RetrieverConfig, RetrieverRegistry, SparseConfig, SparseIndex, VectorStore,
    VectorStoreConfig,
};

use crate::ServerError;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub processor: Arc<TurnProcessor>,
    pub retrievers: Arc<RetrieverRegistry>,
    pub llm: Arc<dyn LlmBackend>,
    /// Documents in the keyword index at startup
    pub indexed_documents: u64,
    started_at: Instant,
}

impl AppState {
    /// Assemble state from already-built components
    pub fn new(
        settings: Settings,
        processor: TurnProcessor,
        retrievers: Arc<RetrieverRegistry>,
        llm: Arc<dyn LlmBackend>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            processor: Arc::new(processor),
            retrievers,
            llm,
            indexed_documents: 0,
            started_at: Instant::now(),
        }
    }

    /// Build every component from settings
    ///
    /// The vector side is optional: when the embedder or vector store cannot
    /// be set up the retriever runs keyword only. A missing knowledge path
    /// leaves the indexes empty.
    pub async fn build(settings: Settings) -> Result<Self, ServerError> {
        let llm = create_backend(&settings.llm).map_err(|e| ServerError::Startup(e.to_string()))?;
        let counter: Arc<dyn TokenCounter> = Arc::new(HeuristicTokenCounter::new());

        let keyword = SparseIndex::new(SparseConfig::from_settings(&settings.retrieval))?;
        let vector = init_vector(&settings).await;

        let knowledge_path = Path::new(&settings.knowledge_path);
        if knowledge_path.exists() {
            let vector_ref = vector
                .as_ref()
                .map(|v| (v.store.as_ref(), v.embedder.as_ref()));
            match KnowledgeLoader::load(knowledge_path, &keyword, vector_ref).await {
                Ok(report) => tracing::info!(
                    path = %knowledge_path.display(),
                    keyword = report.keyword_indexed,
                    vector = report.vector_indexed,
                    "Knowledge base loaded"
                ),
                Err(e) => tracing::warn!(
                    path = %knowledge_path.display(),
                    error = %e,
                    "Failed to load knowledge base, starting with empty indexes"
                ),
            }
        } else {
            tracing::warn!(path = %knowledge_path.display(), "Knowledge path not found, indexes are empty");
        }
        let indexed_documents = keyword.doc_count();

        let mut retriever = HybridRetriever::new(
            RetrieverConfig::from_settings(&settings.retrieval, &settings.embedding),
            Arc::new(keyword),
            counter.clone(),
        )?;
        if let Some(v) = vector {
            retriever = retriever.with_vector(v.index, Some(v.embedder));
        }

        let retrievers = Arc::new(RetrieverRegistry::new(settings.retrieval.default_route.clone()));
        retrievers.register(settings.retrieval.default_route.clone(), Arc::new(retriever))?;

        let processor = TurnProcessor::from_settings(&settings, llm.clone(), retrievers.clone(), counter)?;

        let mut state = Self::new(settings, processor, retrievers, llm);
        state.indexed_documents = indexed_documents;
        Ok(state)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// One vector store seen through its write and search interfaces
struct VectorHandles {
    store: Arc<dyn VectorStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl VectorHandles {
    fn new<S>(store: Arc<S>, embedder: Arc<dyn Embedder>) -> Self
    where
        S: VectorStore + 'static,
    {
        Self {
            index: store.clone(),
            store,
            embedder,
        }
    }
}

async fn init_vector(settings: &Settings) -> Option<VectorHandles> {
    if !settings.embedding.enabled {
        tracing::info!("Embeddings disabled, keyword retrieval only");
        return None;
    }

    let embedder: Arc<dyn Embedder> =
        match OllamaEmbedder::new(OllamaEmbeddingConfig::from_settings(&settings.embedding)) {
            Ok(embedder) => Arc::new(embedder),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to create embedder, keyword retrieval only");
                return None;
            },
        };

    let handles = match settings.retrieval.vector_backend {
        VectorBackend::Memory => VectorHandles::new(
            Arc::new(InMemoryVectorStore::new(settings.embedding.dimension)),
            embedder,
        ),
        VectorBackend::Qdrant => {
            let config = VectorStoreConfig::from_settings(&settings.retrieval, &settings.embedding);
            let store = match QdrantVectorStore::new(config) {
                Ok(store) => store,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create Qdrant client, keyword retrieval only");
                    return None;
                },
            };
            if let Err(e) = store.ensure_collection().await {
                tracing::warn!(
                    endpoint = %settings.retrieval.qdrant_endpoint,
                    error = %e,
                    "Qdrant unavailable, keyword retrieval only"
                );
                return None;
            }
            VectorHandles::new(Arc::new(store), embedder)
        },
    };

    tracing::info!(
        backend = ?settings.retrieval.vector_backend,
        dimension = settings.embedding.dimension,
        "Vector retrieval enabled"
    );
    Some(handles)
}
