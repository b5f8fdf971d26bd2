//! Context Compressor for over-budget evidence
//!
//! Fits selected documents into the evidence budget when they still overflow
//! after retrieval.
//!
//! # Strategies
//!
//! 1. **Extractive**: split into sentences, score each one, greedily repack
//!    the best sentences and restore their original order
//! 2. **Abstractive**: ask the LLM for one summary within budget; falls back
//!    to extractive on any failure
//! 3. **Hybrid**: extractive at a fraction of the budget, then abstractive on
//!    the result at the full budget
//!
//! Sentence importance:
//!
//! ```text
//! 0.4 * keyword_overlap + 0.3 * entity_density + 0.2 * position + 0.1 * entropy
//! ```
//!
//! Compression never fails a turn: any error returns the input unchanged with
//! a `Skipped { reason: Error }` stats record.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use medirag_config::{CompressionConfig, LexiconConfig};
use medirag_core::{
    truncate_to_tokens, CompressionStats, CompressionStrategy, Document, DocumentSource,
    SkipReason, TokenCounter,
};
use medirag_llm::{GenerateRequest, LlmBackend};

use crate::RagError;

/// Configuration for the context compressor
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    pub enabled: bool,
    pub strategy: CompressionStrategy,
    pub keyword_weight: f32,
    pub entity_weight: f32,
    pub position_weight: f32,
    pub entropy_weight: f32,
    /// Fragments shorter than this (in characters) are dropped
    pub min_sentence_chars: usize,
    /// Share of the budget given to the extractive pass of hybrid
    pub hybrid_extractive_ratio: f32,
    pub abstractive_timeout: Duration,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        use medirag_config::constants::{compression, timeouts};
        Self {
            enabled: true,
            strategy: CompressionStrategy::Extractive,
            keyword_weight: compression::KEYWORD_WEIGHT,
            entity_weight: compression::ENTITY_WEIGHT,
            position_weight: compression::POSITION_WEIGHT,
            entropy_weight: compression::ENTROPY_WEIGHT,
            min_sentence_chars: compression::MIN_SENTENCE_CHARS,
            hybrid_extractive_ratio: compression::HYBRID_EXTRACTIVE_RATIO,
            abstractive_timeout: Duration::from_millis(timeouts::LLM_REQUEST_MS),
        }
    }
}

impl CompressorConfig {
    /// Build from settings; an unknown strategy name is a configuration error
    pub fn from_settings(settings: &CompressionConfig) -> Result<Self, RagError> {
        let strategy = settings
            .strategy
            .parse::<CompressionStrategy>()
            .map_err(RagError::Config)?;
        Ok(Self {
            enabled: settings.enabled,
            strategy,
            keyword_weight: settings.keyword_weight,
            entity_weight: settings.entity_weight,
            position_weight: settings.position_weight,
            entropy_weight: settings.entropy_weight,
            min_sentence_chars: settings.min_sentence_chars,
            hybrid_extractive_ratio: settings.hybrid_extractive_ratio,
            abstractive_timeout: Duration::from_millis(settings.abstractive_timeout_ms),
        })
    }
}

/// Domain vocabulary used for entity density
///
/// Lexicon terms are matched as lowercased substrings, measurements
/// (`140/90 mmHg`, `500mg`, `7.2%`) by pattern.
#[derive(Debug, Clone)]
pub struct DomainTerms {
    terms: Vec<String>,
    measurement: Regex,
}

/// Dosage and vital-sign measurements (`140/90 mmHg`, `500mg`, `7.2%`)
pub const MEASUREMENT_PATTERN: &str =
    r"(?i)\d+(?:[./]\d+)?\s*(?:mmhg|mg/dl|mmol/l|mg|mcg|ml|kg|bpm|%|회|알|정)";

impl DomainTerms {
    pub fn new(terms: impl IntoIterator<Item = String>) -> Result<Self, RagError> {
        let mut terms: Vec<String> = terms
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        terms.sort();
        terms.dedup();
        let measurement =
            Regex::new(MEASUREMENT_PATTERN).map_err(|e| RagError::Config(e.to_string()))?;
        Ok(Self { terms, measurement })
    }

    pub fn from_lexicon(lexicon: &LexiconConfig) -> Result<Self, RagError> {
        Self::new(
            lexicon
                .conditions
                .iter()
                .chain(&lexicon.symptoms)
                .chain(&lexicon.medications)
                .cloned(),
        )
    }

    /// Number of domain mentions in `text`
    pub fn count_mentions(&self, text: &str) -> usize {
        let lower = text.to_lowercase();
        let terms: usize = self.terms.iter().map(|t| lower.matches(t.as_str()).count()).sum();
        terms + self.measurement.find_iter(&lower).count()
    }

    /// Mentions per word token, in [0, 1]
    pub fn density(&self, text: &str) -> f32 {
        let tokens = text.unicode_words().count();
        if tokens == 0 {
            return 0.0;
        }
        (self.count_mentions(text) as f32 / tokens as f32).clamp(0.0, 1.0)
    }
}

/// LLM summarization capability
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `text` for `query` in at most `max_tokens`
    async fn summarize(&self, text: &str, query: &str, max_tokens: usize) -> Result<String, RagError>;
}

/// Summarizer backed by the generation service
pub struct LlmSummarizer {
    llm: Arc<dyn LlmBackend>,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    fn build_prompt(text: &str, query: &str, max_tokens: usize) -> String {
        format!(
            "다음 근거 문서를 질문에 답하는 데 필요한 사실만 남기고 {max_tokens} 토큰 이내로 요약하세요.\n\
             수치, 약물명, 질환명은 그대로 유지하고 추측은 추가하지 마세요.\n\n\
             질문: {query}\n\n\
             근거 문서:\n{text}\n\n\
             요약:"
        )
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, text: &str, query: &str, max_tokens: usize) -> Result<String, RagError> {
        let request = GenerateRequest::new(Self::build_prompt(text, query, max_tokens))
            .with_temperature(0.0)
            .with_max_tokens(max_tokens);
        let result = self
            .llm
            .generate(&request)
            .await
            .map_err(|e| RagError::Compression(e.to_string()))?;
        Ok(result.text.trim().to_string())
    }
}

/// Compressed documents plus the stats record for the turn
#[derive(Debug, Clone)]
pub struct CompressionOutput {
    pub documents: Vec<Document>,
    pub stats: CompressionStats,
}

impl CompressionOutput {
    fn unchanged(documents: &[Document], reason: SkipReason) -> Self {
        Self {
            documents: documents.to_vec(),
            stats: CompressionStats::skipped(reason),
        }
    }
}

#[derive(Debug, Clone)]
struct ScoredSentence {
    doc: usize,
    order: usize,
    text: String,
    score: f32,
}

/// Context compressor for retrieved evidence
pub struct ContextCompressor {
    config: CompressorConfig,
    terms: DomainTerms,
    counter: Arc<dyn TokenCounter>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl ContextCompressor {
    pub fn new(config: CompressorConfig, terms: DomainTerms, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            config,
            terms,
            counter,
            summarizer: None,
        }
    }

    /// Enable the abstractive path
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    fn total_tokens(&self, documents: &[Document]) -> usize {
        self.counter.count_all(&mut documents.iter().map(|d| d.text.as_str()))
    }

    /// Fit `documents` into `budget` tokens
    pub async fn compress(&self, documents: &[Document], query: &str, budget: usize) -> CompressionOutput {
        if !self.config.enabled {
            return CompressionOutput::unchanged(documents, SkipReason::Disabled);
        }
        if documents.is_empty() {
            return CompressionOutput::unchanged(documents, SkipReason::EmptyInput);
        }
        let original_tokens = self.total_tokens(documents);
        if original_tokens <= budget {
            return CompressionOutput::unchanged(documents, SkipReason::WithinBudget);
        }

        let outcome = match self.config.strategy {
            CompressionStrategy::Extractive => self
                .extractive(documents, query, budget)
                .map(|docs| (docs, CompressionStrategy::Extractive)),
            CompressionStrategy::Abstractive => self.abstractive_or_extractive(documents, query, budget).await,
            CompressionStrategy::Hybrid => self.hybrid(documents, query, budget).await,
        };

        match outcome {
            Ok((compressed, strategy)) => {
                let compressed_tokens = self.total_tokens(&compressed);
                if compressed_tokens > budget {
                    tracing::error!(
                        compressed_tokens,
                        budget,
                        "Compressed evidence exceeds budget, keeping original"
                    );
                    return CompressionOutput::unchanged(documents, SkipReason::Error);
                }
                tracing::debug!(
                    strategy = %strategy,
                    original_tokens,
                    compressed_tokens,
                    budget,
                    "Compressed evidence"
                );
                CompressionOutput {
                    documents: compressed,
                    stats: CompressionStats::applied(strategy, original_tokens, compressed_tokens),
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Compression failed, keeping original evidence");
                CompressionOutput::unchanged(documents, SkipReason::Error)
            },
        }
    }

    async fn abstractive_or_extractive(
        &self,
        documents: &[Document],
        query: &str,
        budget: usize,
    ) -> Result<(Vec<Document>, CompressionStrategy), RagError> {
        match self.abstractive(documents, query, budget).await {
            Ok(docs) => Ok((docs, CompressionStrategy::Abstractive)),
            Err(e) => {
                tracing::warn!(error = %e, "Abstractive compression failed, using extractive");
                self.extractive(documents, query, budget)
                    .map(|docs| (docs, CompressionStrategy::Extractive))
            },
        }
    }

    async fn hybrid(
        &self,
        documents: &[Document],
        query: &str,
        budget: usize,
    ) -> Result<(Vec<Document>, CompressionStrategy), RagError> {
        let first_pass = (budget as f32 * self.config.hybrid_extractive_ratio).floor() as usize;
        let extracted = self.extractive(documents, query, first_pass)?;
        match self.abstractive(&extracted, query, budget).await {
            Ok(docs) => Ok((docs, CompressionStrategy::Hybrid)),
            Err(e) => {
                tracing::warn!(error = %e, "Abstractive pass of hybrid failed, keeping extractive");
                Ok((extracted, CompressionStrategy::Extractive))
            },
        }
    }

    /// One synthetic document summarizing `documents`
    async fn abstractive(&self, documents: &[Document], query: &str, budget: usize) -> Result<Vec<Document>, RagError> {
        let summarizer = self
            .summarizer
            .as_ref()
            .ok_or_else(|| RagError::Compression("no summarizer configured".to_string()))?;

        let joined = documents
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let summary = tokio::time::timeout(
            self.config.abstractive_timeout,
            summarizer.summarize(&joined, query, budget),
        )
        .await
        .map_err(|_| RagError::Timeout(self.config.abstractive_timeout.as_millis() as u64))??;

        if summary.is_empty() {
            return Err(RagError::Compression("empty summary".to_string()));
        }
        let tokens = self.counter.count_tokens(&summary);
        if tokens > budget {
            return Err(RagError::Compression(format!(
                "summary of {} tokens exceeds budget {}",
                tokens, budget
            )));
        }

        let mut doc = Document::new("summary", summary, 1.0, 1, DocumentSource::Fused);
        doc.metadata.insert("compression".to_string(), "abstractive".to_string());
        doc.metadata.insert(
            "source_ids".to_string(),
            documents.iter().map(|d| d.id.as_str()).collect::<Vec<_>>().join(","),
        );
        Ok(vec![doc])
    }

    /// Sentence-level repacking
    fn extractive(&self, documents: &[Document], query: &str, budget: usize) -> Result<Vec<Document>, RagError> {
        let query_tokens = word_set(query);

        let mut sentences = Vec::new();
        for (doc_idx, doc) in documents.iter().enumerate() {
            let doc_len = doc.text.len();
            for (order, (offset, text)) in self.split_sentences(&doc.text).into_iter().enumerate() {
                let position = if doc_len == 0 {
                    0.5
                } else {
                    1.0 - offset as f32 / doc_len as f32
                };
                let score = self.importance(&text, &query_tokens, position);
                sentences.push(ScoredSentence {
                    doc: doc_idx,
                    order,
                    text,
                    score,
                });
            }
        }
        if sentences.is_empty() {
            return Err(RagError::Compression("no sentences survived splitting".to_string()));
        }

        // stable: equal scores keep document/sentence order
        let mut ranked: Vec<usize> = (0..sentences.len()).collect();
        ranked.sort_by(|&a, &b| sentences[b].score.total_cmp(&sentences[a].score));

        let mut selected = Vec::new();
        let mut used = 0usize;
        for &idx in &ranked {
            let tokens = self.counter.count_tokens(&sentences[idx].text);
            if used + tokens > budget {
                break;
            }
            used += tokens;
            selected.push(idx);
        }

        if selected.is_empty() {
            // best sentence alone overflows; keep its head
            let best = &sentences[ranked[0]];
            let head = truncate_to_tokens(&best.text, budget, self.counter.as_ref());
            if head.trim().is_empty() {
                return Err(RagError::Compression(format!("budget {} too small", budget)));
            }
            let mut doc = documents[best.doc].clone();
            doc.text = head.trim_end().to_string();
            doc.metadata.insert("compression".to_string(), "extractive".to_string());
            return Ok(vec![doc]);
        }

        // joining adds separators; shed the weakest sentences until it fits
        loop {
            let rebuilt = rebuild(documents, &sentences, &selected);
            if self.total_tokens(&rebuilt) <= budget || selected.len() == 1 {
                return Ok(rebuilt);
            }
            selected.pop();
        }
    }

    fn importance(&self, sentence: &str, query_tokens: &HashSet<String>, position: f32) -> f32 {
        let overlap = jaccard(&word_set(sentence), query_tokens);
        let density = self.terms.density(sentence);
        let entropy = normalized_entropy(sentence);
        self.config.keyword_weight * overlap
            + self.config.entity_weight * density
            + self.config.position_weight * position.clamp(0.0, 1.0)
            + self.config.entropy_weight * entropy
    }

    /// Sentences with their byte offset, split on `.!?` (kept) and newlines
    fn split_sentences(&self, text: &str) -> Vec<(usize, String)> {
        let mut out = Vec::new();
        let mut start = 0usize;
        for (i, c) in text.char_indices() {
            let end = match c {
                '.' | '!' | '?' => i + c.len_utf8(),
                '\n' => i,
                _ => continue,
            };
            self.push_sentence(&mut out, text, start, end);
            start = i + c.len_utf8();
        }
        self.push_sentence(&mut out, text, start, text.len());
        out
    }

    fn push_sentence(&self, out: &mut Vec<(usize, String)>, text: &str, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let raw = &text[start..end];
        let trimmed = raw.trim();
        if trimmed.chars().count() < self.config.min_sentence_chars {
            return;
        }
        let lead = raw.len() - raw.trim_start().len();
        out.push((start + lead, trimmed.to_string()));
    }
}

/// Rebuild documents from the selected sentences in original order
fn rebuild(documents: &[Document], sentences: &[ScoredSentence], selected: &[usize]) -> Vec<Document> {
    let mut per_doc: HashMap<usize, Vec<&ScoredSentence>> = HashMap::new();
    for &idx in selected {
        per_doc.entry(sentences[idx].doc).or_default().push(&sentences[idx]);
    }

    let mut out = Vec::new();
    for (doc_idx, doc) in documents.iter().enumerate() {
        let Some(mut kept) = per_doc.remove(&doc_idx) else {
            continue;
        };
        kept.sort_by_key(|s| s.order);
        let mut compressed = doc.clone();
        compressed.text = kept.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
        compressed
            .metadata
            .insert("compression".to_string(), "extractive".to_string());
        out.push(compressed);
    }
    out
}

fn word_set(text: &str) -> HashSet<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.union(b).count();
    inter as f32 / union as f32
}

/// Shannon entropy of the word distribution over `log2(token_count)`
fn normalized_entropy(text: &str) -> f32 {
    let words: Vec<String> = text.unicode_words().map(|w| w.to_lowercase()).collect();
    let n = words.len();
    if n <= 1 {
        return 0.0;
    }
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for w in &words {
        *freq.entry(w.as_str()).or_default() += 1;
    }
    let entropy: f32 = freq
        .values()
        .map(|&c| {
            let p = c as f32 / n as f32;
            -p * p.log2()
        })
        .sum();
    (entropy / (n as f32).log2()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use medirag_core::HeuristicTokenCounter;

    fn terms() -> DomainTerms {
        DomainTerms::new(vec!["고혈압".to_string(), "hypertension".to_string(), "metformin".to_string()]).unwrap()
    }

    fn compressor(strategy: CompressionStrategy) -> ContextCompressor {
        ContextCompressor::new(
            CompressorConfig {
                strategy,
                ..Default::default()
            },
            terms(),
            Arc::new(HeuristicTokenCounter::new()),
        )
    }

    fn doc(id: &str, text: impl Into<String>) -> Document {
        Document::new(id, text, 1.0, 1, DocumentSource::Keyword)
    }

    struct FixedSummarizer(String);

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _t: &str, _q: &str, _m: usize) -> Result<String, RagError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSummarizer;

    #[async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _t: &str, _q: &str, _m: usize) -> Result<String, RagError> {
            Err(RagError::Compression("llm down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_within_budget_is_untouched() {
        let docs = vec![doc("a", "Hypertension is high blood pressure.")];
        let out = compressor(CompressionStrategy::Extractive).compress(&docs, "q", 1000).await;
        assert_eq!(out.documents, docs);
        assert_eq!(out.stats.skip_reason(), Some(SkipReason::WithinBudget));
    }

    #[tokio::test]
    async fn test_disabled_and_empty() {
        let mut c = compressor(CompressionStrategy::Extractive);
        let out = c.compress(&[], "q", 10).await;
        assert_eq!(out.stats.skip_reason(), Some(SkipReason::EmptyInput));

        c.config.enabled = false;
        let docs = vec![doc("a", "x".repeat(400))];
        let out = c.compress(&docs, "q", 10).await;
        assert_eq!(out.stats.skip_reason(), Some(SkipReason::Disabled));
        assert_eq!(out.documents, docs);
    }

    #[tokio::test]
    async fn test_identical_documents_keep_one() {
        let sentence = format!("{}.", "word ".repeat(80).trim());
        let counter = HeuristicTokenCounter::new();
        assert_eq!(counter.count_tokens(&sentence), 100);

        let docs = vec![doc("first", sentence.clone()), doc("second", sentence.clone())];
        let out = compressor(CompressionStrategy::Extractive).compress(&docs, "word", 150).await;

        assert!(out.stats.is_applied());
        assert_eq!(out.documents.len(), 1);
        assert_eq!(out.documents[0].id, "first");
        assert!(out.stats.compressed_tokens().unwrap() <= 150);
    }

    #[tokio::test]
    async fn test_extractive_prefers_relevant_sentences_and_keeps_order() {
        let text = "Hypertension is treated with lifestyle changes and medication. \
                    The clinic parking lot opens at nine in the morning every day. \
                    Blood pressure above 140/90 mmHg indicates hypertension.";
        let docs = vec![doc("a", text), doc("b", "Unrelated filler text about the weather today. ".repeat(8))];
        let out = compressor(CompressionStrategy::Extractive)
            .compress(&docs, "hypertension blood pressure", 40)
            .await;

        assert!(out.stats.is_applied());
        let total: usize = out
            .documents
            .iter()
            .map(|d| HeuristicTokenCounter::new().count_tokens(&d.text))
            .sum();
        assert!(total <= 40);
        let first = &out.documents[0];
        assert_eq!(first.id, "a");
        assert!(first.text.contains("140/90"));
        assert!(!first.text.contains("parking"));
        let treated = first.text.find("treated");
        let mmhg = first.text.find("mmHg");
        if let (Some(t), Some(m)) = (treated, mmhg) {
            assert!(t < m);
        }
    }

    #[tokio::test]
    async fn test_abstractive_replaces_with_summary() {
        let c = compressor(CompressionStrategy::Abstractive)
            .with_summarizer(Arc::new(FixedSummarizer("Hypertension means BP >= 140/90.".to_string())));
        let docs = vec![doc("a", "Long text. ".repeat(100)), doc("b", "More text. ".repeat(100))];
        let out = c.compress(&docs, "what is hypertension", 50).await;

        assert_eq!(out.documents.len(), 1);
        assert_eq!(out.documents[0].metadata.get("source_ids").map(String::as_str), Some("a,b"));
        match out.stats {
            CompressionStats::Applied { strategy, .. } => assert_eq!(strategy, CompressionStrategy::Abstractive),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_abstractive_failure_falls_back_to_extractive() {
        let c = compressor(CompressionStrategy::Abstractive).with_summarizer(Arc::new(FailingSummarizer));
        let docs = vec![doc("a", "Hypertension facts are here. ".repeat(40))];
        let out = c.compress(&docs, "hypertension", 30).await;
        match out.stats {
            CompressionStats::Applied { strategy, compressed_tokens, .. } => {
                assert_eq!(strategy, CompressionStrategy::Extractive);
                assert!(compressed_tokens <= 30);
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_summary_is_rejected() {
        let c = compressor(CompressionStrategy::Abstractive)
            .with_summarizer(Arc::new(FixedSummarizer("too long ".repeat(200))));
        let docs = vec![doc("a", "Hypertension facts are here. ".repeat(40))];
        let out = c.compress(&docs, "hypertension", 30).await;
        match out.stats {
            CompressionStats::Applied { strategy, .. } => assert_eq!(strategy, CompressionStrategy::Extractive),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hybrid_runs_both_passes() {
        let c = compressor(CompressionStrategy::Hybrid)
            .with_summarizer(Arc::new(FixedSummarizer("Short summary of facts.".to_string())));
        let docs = vec![doc("a", "Hypertension facts are here. ".repeat(40))];
        let out = c.compress(&docs, "hypertension", 60).await;
        match out.stats {
            CompressionStats::Applied { strategy, .. } => assert_eq!(strategy, CompressionStrategy::Hybrid),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsplittable_input_is_skipped_with_error() {
        // only short fragments
        let docs = vec![doc("a", "ok. no. ".repeat(100))];
        let out = compressor(CompressionStrategy::Extractive).compress(&docs, "q", 10).await;
        assert_eq!(out.stats.skip_reason(), Some(SkipReason::Error));
        assert_eq!(out.documents, docs);
    }

    #[test]
    fn test_split_sentences() {
        let c = compressor(CompressionStrategy::Extractive);
        let parts = c.split_sentences("First sentence here. Hi.\nSecond line without stop\nWhy is that?");
        let texts: Vec<&str> = parts.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(
            texts,
            vec!["First sentence here.", "Second line without stop", "Why is that?"]
        );
        assert_eq!(parts[0].0, 0);
    }

    #[test]
    fn test_domain_density() {
        let t = terms();
        assert!(t.density("고혈압 환자는 metformin 500mg 복용") > 0.4);
        assert_eq!(t.density("nothing relevant here"), 0.0);
        assert_eq!(t.density(""), 0.0);
    }

    #[test]
    fn test_entropy_bounds() {
        assert_eq!(normalized_entropy("word"), 0.0);
        assert_eq!(normalized_entropy("word word word"), 0.0);
        assert!((normalized_entropy("all words differ") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let settings = CompressionConfig {
            strategy: "lossy".to_string(),
            ..Default::default()
        };
        assert!(CompressorConfig::from_settings(&settings).is_err());
    }
}
