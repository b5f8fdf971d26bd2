//! Sparse Search using Tantivy (BM25)
//!
//! Keyword branch of hybrid retrieval. Documents are indexed with a
//! Unicode-aware tokenizer (Hangul syllable runs stay whole words), and
//! searches run on the blocking pool so the async runtime is never stalled.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tantivy::{
    collector::TopDocs,
    query::QueryParser,
    schema::{Field, OwnedValue, Schema, TextFieldIndexing, TextOptions, STORED, STRING},
    tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer},
    Index, IndexReader, IndexWriter, TantivyDocument, Term,
};

use medirag_config::RetrievalConfig;
use medirag_core::{KeywordIndex, ScoredPassage};

use crate::knowledge_loader::KnowledgeDocument;
use crate::RagError;

const TOKENIZER_NAME: &str = "multilingual";

/// Sparse search configuration
#[derive(Debug, Clone)]
pub struct SparseConfig {
    /// Index path (use RAM if None)
    pub index_path: Option<String>,
    /// English stemming on top of the Unicode tokenizer
    pub stemming: bool,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            stemming: true,
        }
    }
}

impl SparseConfig {
    pub fn from_settings(retrieval: &RetrievalConfig) -> Self {
        Self {
            index_path: retrieval.index_path.clone(),
            ..Default::default()
        }
    }
}

struct Inner {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    text_field: Field,
    title_field: Field,
}

/// Sparse index for BM25 search
#[derive(Clone)]
pub struct SparseIndex {
    inner: Arc<Inner>,
}

impl SparseIndex {
    pub fn new(config: SparseConfig) -> Result<Self, RagError> {
        let mut schema_builder = Schema::builder();

        let text_options = TextOptions::default()
            .set_indexing_options(
                TextFieldIndexing::default()
                    .set_tokenizer(TOKENIZER_NAME)
                    .set_index_option(tantivy::schema::IndexRecordOption::WithFreqsAndPositions),
            )
            .set_stored();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", text_options.clone());
        let title_field = schema_builder.add_text_field("title", text_options);
        let schema = schema_builder.build();

        let index = if let Some(ref path) = config.index_path {
            std::fs::create_dir_all(path).map_err(|e| RagError::Index(e.to_string()))?;
            let dir = tantivy::directory::MmapDirectory::open(Path::new(path))
                .map_err(|e| RagError::Index(e.to_string()))?;
            Index::open_or_create(dir, schema).map_err(|e| RagError::Index(e.to_string()))?
        } else {
            Index::create_in_ram(schema)
        };

        index
            .tokenizers()
            .register(TOKENIZER_NAME, Self::build_tokenizer(&config));

        let reader = index.reader().map_err(|e| RagError::Index(e.to_string()))?;
        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| RagError::Index(e.to_string()))?;

        tracing::info!(
            path = ?config.index_path,
            stemming = config.stemming,
            "Sparse index ready"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                index,
                reader,
                writer: Mutex::new(writer),
                id_field,
                text_field,
                title_field,
            }),
        })
    }

    fn build_tokenizer(config: &SparseConfig) -> TextAnalyzer {
        let base = TextAnalyzer::builder(SimpleTokenizer::default())
            .filter(RemoveLongFilter::limit(100))
            .filter(LowerCaser);
        if config.stemming {
            base.filter(Stemmer::new(Language::English)).build()
        } else {
            base.build()
        }
    }

    /// Index documents, replacing any existing entry with the same ID
    pub fn index_documents(&self, documents: &[KnowledgeDocument]) -> Result<usize, RagError> {
        let inner = &self.inner;
        let mut writer = inner.writer.lock();

        for doc in documents {
            writer.delete_term(Term::from_field_text(inner.id_field, &doc.id));

            let mut tantivy_doc = TantivyDocument::default();
            tantivy_doc.add_text(inner.id_field, &doc.id);
            tantivy_doc.add_text(inner.text_field, &doc.content);
            tantivy_doc.add_text(inner.title_field, &doc.title);
            for keyword in &doc.keywords {
                tantivy_doc.add_text(inner.title_field, keyword);
            }
            writer
                .add_document(tantivy_doc)
                .map_err(|e| RagError::Index(e.to_string()))?;
        }

        writer.commit().map_err(|e| RagError::Index(e.to_string()))?;
        inner.reader.reload().map_err(|e| RagError::Index(e.to_string()))?;

        tracing::debug!(count = documents.len(), "Indexed documents");
        Ok(documents.len())
    }

    /// Search using BM25 over text and title
    pub fn search_blocking(&self, query: &str, k: usize) -> Result<Vec<ScoredPassage>, RagError> {
        let inner = &self.inner;
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let searcher = inner.reader.searcher();
        let parser = QueryParser::for_index(&inner.index, vec![inner.text_field, inner.title_field]);
        // lenient: user text may contain query syntax characters
        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!(errors = errors.len(), "Lenient query parse dropped terms");
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(k))
            .map_err(|e| RagError::Search(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(address)
                .map_err(|e| RagError::Search(e.to_string()))?;
            let id = first_str(&doc, inner.id_field).unwrap_or_default();
            let text = first_str(&doc, inner.text_field).unwrap_or_default();
            results.push(ScoredPassage::new(id, text, score));
        }
        Ok(results)
    }

    /// Delete documents by ID
    pub fn delete(&self, ids: &[String]) -> Result<(), RagError> {
        let inner = &self.inner;
        let mut writer = inner.writer.lock();
        for id in ids {
            writer.delete_term(Term::from_field_text(inner.id_field, id));
        }
        writer.commit().map_err(|e| RagError::Index(e.to_string()))?;
        inner.reader.reload().map_err(|e| RagError::Index(e.to_string()))?;
        Ok(())
    }

    pub fn doc_count(&self) -> u64 {
        self.inner.reader.searcher().num_docs()
    }
}

fn first_str(doc: &TantivyDocument, field: Field) -> Option<String> {
    match doc.get_first(field) {
        Some(OwnedValue::Str(s)) => Some(s.to_string()),
        _ => None,
    }
}

#[async_trait]
impl KeywordIndex for SparseIndex {
    async fn search(&self, tokenized_query: &[String], k: usize) -> medirag_core::Result<Vec<ScoredPassage>> {
        let index = self.clone();
        let query = tokenized_query.join(" ");
        let hits = tokio::task::spawn_blocking(move || index.search_blocking(&query, k))
            .await
            .map_err(|e| medirag_core::Error::KeywordIndex(e.to_string()))??;
        Ok(hits)
    }

    fn name(&self) -> &str {
        "tantivy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knowledge(id: &str, title: &str, content: &str) -> KnowledgeDocument {
        KnowledgeDocument {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category: None,
            language: "ko".to_string(),
            keywords: Vec::new(),
        }
    }

    fn sample_index() -> SparseIndex {
        let index = SparseIndex::new(SparseConfig::default()).unwrap();
        index
            .index_documents(&[
                knowledge("htn", "Hypertension", "Blood pressure above 140/90 mmHg is hypertension."),
                knowledge("dm", "Diabetes", "Metformin is the first line drug for type 2 diabetes."),
                knowledge("ko", "고혈압 관리", "고혈압 환자는 소금 섭취를 줄여야 합니다."),
            ])
            .unwrap();
        index
    }

    #[test]
    fn test_sparse_index_create() {
        let index = SparseIndex::new(SparseConfig::default()).unwrap();
        assert_eq!(index.doc_count(), 0);
    }

    #[test]
    fn test_index_and_search() {
        let index = sample_index();
        assert_eq!(index.doc_count(), 3);

        let results = index.search_blocking("blood pressure", 5).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id, "htn");

        let korean = index.search_blocking("고혈압", 5).unwrap();
        assert_eq!(korean[0].id, "ko");
    }

    #[test]
    fn test_reindex_replaces_document() {
        let index = sample_index();
        index
            .index_documents(&[knowledge("dm", "Diabetes", "Insulin therapy for diabetes.")])
            .unwrap();
        assert_eq!(index.doc_count(), 3);

        index.delete(&["dm".to_string()]).unwrap();
        assert_eq!(index.doc_count(), 2);
    }

    #[test]
    fn test_query_syntax_is_tolerated() {
        let index = sample_index();
        assert!(index.search_blocking("metformin AND (", 5).is_ok());
        assert!(index.search_blocking("", 5).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_index_trait() {
        let index: Arc<dyn KeywordIndex> = Arc::new(sample_index());
        let hits = index
            .search(&["metformin".to_string(), "diabetes".to_string()], 2)
            .await
            .unwrap();
        assert_eq!(hits[0].id, "dm");
        assert!(hits.len() <= 2);
    }
}
