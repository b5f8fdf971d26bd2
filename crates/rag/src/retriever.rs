//! Hybrid Retriever
//!
//! Runs keyword and vector search concurrently, fuses the two rankings with
//! RRF and selects documents in rank order until the evidence budget is
//! full. The embedding call blocks only the vector branch; either branch
//! failing or timing out leaves the other one's results.

use std::sync::Arc;
use std::time::Duration;

use unicode_segmentation::UnicodeSegmentation;

use medirag_config::constants::{rag, timeouts};
use medirag_config::{EmbeddingConfig, RetrievalConfig};
use medirag_core::{
    Document, DocumentSource, Embedder, KeywordIndex, TokenCounter, TokenPlan, VectorIndex,
};

use crate::fusion::RankFuser;
use crate::RagError;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// RRF k parameter
    pub rrf_k: f32,
    /// Expected tokens per document, caps k by the evidence budget
    pub avg_doc_tokens: usize,
    pub keyword_timeout: Duration,
    pub vector_timeout: Duration,
    pub embed_timeout: Duration,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            rrf_k: rag::RRF_K,
            avg_doc_tokens: rag::AVG_DOC_TOKENS,
            keyword_timeout: Duration::from_millis(timeouts::SEARCH_MS),
            vector_timeout: Duration::from_millis(timeouts::SEARCH_MS),
            embed_timeout: Duration::from_millis(timeouts::EMBED_MS),
        }
    }
}

impl RetrieverConfig {
    pub fn from_settings(retrieval: &RetrievalConfig, embedding: &EmbeddingConfig) -> Self {
        Self {
            rrf_k: retrieval.rrf_k,
            avg_doc_tokens: retrieval.avg_doc_tokens,
            keyword_timeout: Duration::from_millis(retrieval.keyword_timeout_ms),
            vector_timeout: Duration::from_millis(retrieval.vector_timeout_ms),
            embed_timeout: Duration::from_millis(embedding.timeout_ms),
        }
    }
}

/// Outcome of one retrieval
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    /// Selected documents, best first, within the evidence budget
    pub documents: Vec<Document>,
    pub k_requested: usize,
    pub k_effective: usize,
    pub keyword_hits: usize,
    pub vector_hits: usize,
    /// Whether both lists contributed and were fused
    pub fused: bool,
    /// Estimated tokens of `documents`
    pub tokens_used: usize,
    /// Candidates rejected by the budget walk
    pub dropped: usize,
}

/// `k` capped by how many average documents fit in `for_docs`, floor 1
///
/// A request for zero documents stays zero.
pub fn effective_k(k_requested: usize, for_docs: usize, avg_doc_tokens: usize) -> usize {
    if k_requested == 0 {
        return 0;
    }
    let fit = for_docs / avg_doc_tokens.max(1);
    k_requested.min(fit).max(1)
}

/// Accept documents in order while the running total stays within `budget`
///
/// Stops at the first document that would overflow; later, smaller documents
/// are not considered.
pub fn select_within_budget(
    documents: Vec<Document>,
    budget: usize,
    counter: &dyn TokenCounter,
) -> (Vec<Document>, usize) {
    let mut selected = Vec::with_capacity(documents.len());
    let mut used = 0usize;
    for doc in documents {
        let tokens = counter.count_tokens(&doc.text);
        if used + tokens > budget {
            break;
        }
        used += tokens;
        selected.push(doc);
    }
    (selected, used)
}

/// Lowercased word tokens for the keyword index
pub fn tokenize_query(query: &str) -> Vec<String> {
    query.unicode_words().map(|w| w.to_lowercase()).collect()
}

/// Hybrid retriever combining keyword and vector search
pub struct HybridRetriever {
    config: RetrieverConfig,
    fuser: RankFuser,
    keyword: Arc<dyn KeywordIndex>,
    vector: Option<Arc<dyn VectorIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
    counter: Arc<dyn TokenCounter>,
}

impl HybridRetriever {
    pub fn new(
        config: RetrieverConfig,
        keyword: Arc<dyn KeywordIndex>,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Self, RagError> {
        if config.avg_doc_tokens == 0 {
            return Err(RagError::Config("avg_doc_tokens must be greater than zero".to_string()));
        }
        Ok(Self {
            fuser: RankFuser::new(config.rrf_k)?,
            config,
            keyword,
            vector: None,
            embedder: None,
            counter,
        })
    }

    /// Enable the vector branch
    pub fn with_vector(mut self, vector: Arc<dyn VectorIndex>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.vector = Some(vector);
        self.embedder = embedder;
        self
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    async fn keyword_branch(&self, query: &str, k: usize) -> Vec<Document> {
        let tokens = tokenize_query(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        match tokio::time::timeout(self.config.keyword_timeout, self.keyword.search(&tokens, k)).await {
            Ok(Ok(hits)) => Document::from_passages(hits, DocumentSource::Keyword),
            Ok(Err(e)) => {
                tracing::warn!(index = %self.keyword.name(), error = %e, "Keyword search failed");
                Vec::new()
            },
            Err(_) => {
                tracing::warn!(
                    index = %self.keyword.name(),
                    timeout_ms = self.config.keyword_timeout.as_millis() as u64,
                    "Keyword search timed out"
                );
                Vec::new()
            },
        }
    }

    async fn vector_branch(&self, query: &str, query_vector: Option<Vec<f32>>, k: usize) -> Vec<Document> {
        let Some(vector) = self.vector.as_ref() else {
            return Vec::new();
        };

        let embedding = match (query_vector, self.embedder.as_ref()) {
            (Some(v), _) => v,
            (None, Some(embedder)) => {
                match tokio::time::timeout(self.config.embed_timeout, embedder.embed(query)).await {
                    Ok(Ok(v)) => v,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "Query embedding failed, keyword only");
                        return Vec::new();
                    },
                    Err(_) => {
                        tracing::warn!("Query embedding timed out, keyword only");
                        return Vec::new();
                    },
                }
            },
            (None, None) => return Vec::new(),
        };

        match tokio::time::timeout(self.config.vector_timeout, vector.search(&embedding, k)).await {
            Ok(Ok(hits)) => Document::from_passages(hits, DocumentSource::Vector),
            Ok(Err(e)) => {
                tracing::warn!(index = %vector.name(), error = %e, "Vector search failed");
                Vec::new()
            },
            Err(_) => {
                tracing::warn!(index = %vector.name(), "Vector search timed out");
                Vec::new()
            },
        }
    }

    /// Search and select within `plan.for_docs()`
    ///
    /// `query_vector` skips the embedding call when the caller already has
    /// one. Never fails: a branch error degrades to the other branch, and
    /// both failing yields no documents.
    pub async fn search(
        &self,
        query: &str,
        query_vector: Option<Vec<f32>>,
        k: usize,
        plan: &TokenPlan,
    ) -> RetrievalResult {
        self.search_candidates(query, query_vector, k, plan, plan.for_docs())
            .await
    }

    /// Search with `k` sized from `plan.for_docs()` but selection bounded by
    /// `pool_budget`
    ///
    /// Feeds a compressor that fits the pool back to `plan.for_docs()`; a
    /// caller that skips compression must re-select within `for_docs`.
    pub async fn search_candidates(
        &self,
        query: &str,
        query_vector: Option<Vec<f32>>,
        k: usize,
        plan: &TokenPlan,
        pool_budget: usize,
    ) -> RetrievalResult {
        let k_effective = effective_k(k, plan.for_docs(), self.config.avg_doc_tokens);
        if k_effective == 0 {
            return RetrievalResult {
                k_requested: k,
                ..Default::default()
            };
        }

        let (keyword_docs, vector_docs) = tokio::join!(
            self.keyword_branch(query, k_effective),
            self.vector_branch(query, query_vector, k_effective)
        );

        let keyword_hits = keyword_docs.len();
        let vector_hits = vector_docs.len();
        let fused = keyword_hits > 0 && vector_hits > 0;

        let mut ranked = self.fuser.fuse(&[keyword_docs, vector_docs]);
        ranked.truncate(k_effective);

        let candidates = ranked.len();
        let (documents, tokens_used) = select_within_budget(ranked, pool_budget, self.counter.as_ref());
        debug_assert!(tokens_used <= pool_budget);

        tracing::debug!(
            k = k,
            k_effective,
            keyword_hits,
            vector_hits,
            fused,
            selected = documents.len(),
            tokens = tokens_used,
            budget = pool_budget,
            "Hybrid retrieval complete"
        );

        RetrievalResult {
            dropped: candidates - documents.len(),
            documents,
            k_requested: k,
            k_effective,
            keyword_hits,
            vector_hits,
            fused,
            tokens_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medirag_core::{HeuristicTokenCounter, ScoredPassage};

    struct StaticKeyword(Vec<ScoredPassage>);

    #[async_trait]
    impl KeywordIndex for StaticKeyword {
        async fn search(&self, _q: &[String], k: usize) -> medirag_core::Result<Vec<ScoredPassage>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
        fn name(&self) -> &str {
            "static"
        }
    }

    struct FailingKeyword;

    #[async_trait]
    impl KeywordIndex for FailingKeyword {
        async fn search(&self, _q: &[String], _k: usize) -> medirag_core::Result<Vec<ScoredPassage>> {
            Err(medirag_core::Error::KeywordIndex("down".to_string()))
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    struct StaticVector(Vec<ScoredPassage>);

    #[async_trait]
    impl VectorIndex for StaticVector {
        async fn search(&self, embedding: &[f32], k: usize) -> medirag_core::Result<Vec<ScoredPassage>> {
            if embedding.len() != 2 {
                return Ok(Vec::new());
            }
            Ok(self.0.iter().take(k).cloned().collect())
        }
        fn dimension(&self) -> usize {
            2
        }
        fn name(&self) -> &str {
            "static-vector"
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _text: &str) -> medirag_core::Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![0.0, 1.0])
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    fn passages(prefix: &str, n: usize, words: usize) -> Vec<ScoredPassage> {
        (0..n)
            .map(|i| {
                ScoredPassage::new(
                    format!("{}{}", prefix, i),
                    format!("{} {} {}", prefix, i, "word ".repeat(words)),
                    1.0 - i as f32 * 0.1,
                )
            })
            .collect()
    }

    fn counter() -> Arc<dyn TokenCounter> {
        Arc::new(HeuristicTokenCounter::new())
    }

    #[test]
    fn test_effective_k() {
        assert_eq!(effective_k(8, 3000, 150), 8);
        assert_eq!(effective_k(8, 600, 150), 4);
        assert_eq!(effective_k(8, 50, 150), 1);
        assert_eq!(effective_k(0, 3000, 150), 0);
    }

    #[test]
    fn test_select_stops_at_first_overflow() {
        let c = HeuristicTokenCounter::new();
        let docs = vec![
            Document::new("a", "a".repeat(200), 1.0, 1, DocumentSource::Keyword), // 50
            Document::new("b", "b".repeat(400), 1.0, 2, DocumentSource::Keyword), // 100
            Document::new("c", "c".repeat(40), 1.0, 3, DocumentSource::Keyword),  // 10
        ];
        let (selected, used) = select_within_budget(docs, 120, &c);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "a");
        assert_eq!(used, 50);
    }

    #[test]
    fn test_tokenize_query() {
        assert_eq!(
            tokenize_query("What is Hypertension?"),
            vec!["what", "is", "hypertension"]
        );
        assert_eq!(tokenize_query("고혈압 약"), vec!["고혈압", "약"]);
    }

    #[tokio::test]
    async fn test_keyword_only_search_respects_budget() {
        let retriever = HybridRetriever::new(
            RetrieverConfig::default(),
            Arc::new(StaticKeyword(passages("k", 10, 100))),
            counter(),
        )
        .unwrap();
        let plan = TokenPlan::docs_only(400);
        let result = retriever.search("blood pressure", None, 8, &plan).await;

        assert_eq!(result.k_effective, 2);
        assert!(!result.fused);
        assert!(result.tokens_used <= 400);
        let total: usize = result
            .documents
            .iter()
            .map(|d| HeuristicTokenCounter::new().count_tokens(&d.text))
            .sum();
        assert!(total <= plan.for_docs());
        assert_eq!(result.documents[0].source, DocumentSource::Keyword);
    }

    #[tokio::test]
    async fn test_candidate_pool_keeps_k_from_docs_budget() {
        let retriever = HybridRetriever::new(
            RetrieverConfig::default(),
            Arc::new(StaticKeyword(passages("p", 10, 200))),
            counter(),
        )
        .unwrap();
        let plan = TokenPlan::new(1000, 100, 0, 0, 0, 300).unwrap();

        let bounded = retriever.search("q", None, 8, &plan).await;
        assert_eq!(bounded.k_effective, 2);
        assert_eq!(bounded.documents.len(), 1);
        assert!(bounded.tokens_used <= plan.for_docs());

        let pool = retriever
            .search_candidates("q", None, 8, &plan, plan.max_total())
            .await;
        assert_eq!(pool.k_effective, 2);
        assert_eq!(pool.documents.len(), 2);
        assert!(pool.tokens_used > plan.for_docs());
        assert!(pool.tokens_used <= plan.max_total());
    }

    #[tokio::test]
    async fn test_hybrid_fuses_both_sources() {
        let retriever = HybridRetriever::new(
            RetrieverConfig::default(),
            Arc::new(StaticKeyword(passages("shared", 3, 5))),
            counter(),
        )
        .unwrap()
        .with_vector(Arc::new(StaticVector(passages("shared", 3, 5))), None);

        let result = retriever
            .search("q", Some(vec![1.0, 0.0]), 3, &TokenPlan::docs_only(3000))
            .await;
        assert!(result.fused);
        assert_eq!(result.documents.len(), 3);
        assert!(result.documents.iter().all(|d| d.source == DocumentSource::Fused));
    }

    #[tokio::test]
    async fn test_keyword_failure_falls_back_to_vector() {
        let retriever = HybridRetriever::new(RetrieverConfig::default(), Arc::new(FailingKeyword), counter())
            .unwrap()
            .with_vector(Arc::new(StaticVector(passages("v", 2, 5))), None);
        let result = retriever
            .search("q", Some(vec![1.0, 0.0]), 3, &TokenPlan::docs_only(3000))
            .await;
        assert_eq!(result.documents.len(), 2);
        assert_eq!(result.documents[0].source, DocumentSource::Vector);
    }

    #[tokio::test]
    async fn test_embedding_timeout_keeps_keyword_results() {
        let config = RetrieverConfig {
            embed_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let retriever = HybridRetriever::new(config, Arc::new(StaticKeyword(passages("k", 2, 5))), counter())
            .unwrap()
            .with_vector(Arc::new(StaticVector(passages("v", 2, 5))), Some(Arc::new(SlowEmbedder)));
        let result = retriever.search("q", None, 3, &TokenPlan::docs_only(3000)).await;
        assert_eq!(result.keyword_hits, 2);
        assert_eq!(result.vector_hits, 0);
    }

    #[tokio::test]
    async fn test_zero_k_returns_nothing() {
        let retriever = HybridRetriever::new(
            RetrieverConfig::default(),
            Arc::new(StaticKeyword(passages("k", 2, 5))),
            counter(),
        )
        .unwrap();
        let result = retriever.search("q", None, 0, &TokenPlan::docs_only(3000)).await;
        assert!(result.documents.is_empty());
        assert_eq!(result.k_effective, 0);
    }
}
