//! Shared in-process collaborators for the pipeline tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use medirag_agent::TurnProcessor;
use medirag_config::Settings;
use medirag_core::{HeuristicTokenCounter, KeywordIndex, ScoredPassage, TokenCounter};
use medirag_llm::{FinishReason, GenerateRequest, GenerationResult, LlmBackend, LlmError};
use medirag_rag::{HybridRetriever, RetrieverConfig, RetrieverRegistry};

/// Kind of request, told apart by prompt content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Evaluate,
    Rewrite,
    Summarize,
    Answer,
}

fn classify(prompt: &str) -> CallKind {
    if prompt.contains("grounding_score") {
        CallKind::Evaluate
    } else if prompt.contains("재작성된 질문:") {
        CallKind::Rewrite
    } else if prompt.contains("요약:") {
        CallKind::Summarize
    } else {
        CallKind::Answer
    }
}

/// LLM that replays queued replies per request kind
#[derive(Default)]
pub struct ScriptedLlm {
    evaluations: Mutex<VecDeque<String>>,
    rewrites: Mutex<VecDeque<String>>,
    answers: Mutex<VecDeque<Result<String, ()>>>,
    calls: Mutex<Vec<(CallKind, String)>>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_evaluation(&self, json: impl Into<String>) -> &Self {
        self.evaluations.lock().push_back(json.into());
        self
    }

    pub fn push_rewrite(&self, query: impl Into<String>) -> &Self {
        self.rewrites.lock().push_back(query.into());
        self
    }

    pub fn push_answer(&self, answer: impl Into<String>) -> &Self {
        self.answers.lock().push_back(Ok(answer.into()));
        self
    }

    pub fn push_answer_failure(&self) -> &Self {
        self.answers.lock().push_back(Err(()));
        self
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.calls.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn prompts(&self, kind: CallKind) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

fn reply(text: String) -> Result<GenerationResult, LlmError> {
    Ok(GenerationResult {
        text,
        tokens: 0,
        total_time_ms: 0,
        finish_reason: FinishReason::Stop,
    })
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
        let kind = classify(&request.prompt);
        self.calls.lock().push((kind, request.prompt.clone()));
        match kind {
            CallKind::Evaluate => match self.evaluations.lock().pop_front() {
                Some(json) => reply(json),
                None => Err(LlmError::Network("no scripted evaluation".to_string())),
            },
            CallKind::Rewrite => match self.rewrites.lock().pop_front() {
                Some(query) => reply(query),
                None => Err(LlmError::Network("no scripted rewrite".to_string())),
            },
            CallKind::Summarize => Err(LlmError::Network("summaries not scripted".to_string())),
            CallKind::Answer => match self.answers.lock().pop_front() {
                Some(Ok(answer)) => reply(answer),
                Some(Err(())) => Err(LlmError::Api("503 Service Unavailable".to_string())),
                None => reply("근거 문서에 따르면 정기적인 진료가 필요합니다.".to_string()),
            },
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Evaluator verdict with equal component scores
pub fn verdict(score: f32, needs_retrieval: bool) -> String {
    serde_json::json!({
        "grounding_score": score,
        "completeness_score": score,
        "accuracy_score": score,
        "missing_info": ["부작용 종류"],
        "improvement_suggestions": ["구체적인 약물 이름을 포함"],
        "needs_retrieval": needs_retrieval,
        "reason": "scripted",
    })
    .to_string()
}

/// Small keyword index: a document scores one point per query token
/// (two characters or longer) it contains
pub struct KeywordCorpus {
    documents: Vec<(String, String)>,
}

impl KeywordCorpus {
    pub fn new(documents: &[(&str, &str)]) -> Self {
        Self {
            documents: documents
                .iter()
                .map(|(id, text)| (id.to_string(), text.to_string()))
                .collect(),
        }
    }

    pub fn medical() -> Self {
        Self::new(&[
            ("htn-drugs", "고혈압 치료제는 이뇨제와 칼슘채널차단제 등 여러 종류가 있습니다."),
            ("amlodipine", "암로디핀은 발목 부종을 일으킬 수 있습니다."),
            ("metformin", "메트포르민은 식사와 함께 복용하며 용량은 의사가 정합니다."),
            ("dm-exercise", "당뇨 환자는 규칙적인 운동으로 혈당을 관리합니다."),
        ])
    }
}

#[async_trait]
impl KeywordIndex for KeywordCorpus {
    async fn search(&self, query: &[String], k: usize) -> medirag_core::Result<Vec<ScoredPassage>> {
        let mut hits: Vec<(usize, &String, &String)> = self
            .documents
            .iter()
            .map(|(id, text)| {
                let lower = text.to_lowercase();
                let score = query
                    .iter()
                    .filter(|t| t.chars().count() >= 2 && lower.contains(t.as_str()))
                    .count();
                (score, id, text)
            })
            .filter(|(score, _, _)| *score > 0)
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        Ok(hits
            .into_iter()
            .take(k)
            .map(|(score, id, text)| ScoredPassage::new(id.clone(), text.clone(), score as f32))
            .collect())
    }

    fn name(&self) -> &str {
        "corpus"
    }
}

pub fn counter() -> Arc<dyn TokenCounter> {
    Arc::new(HeuristicTokenCounter::new())
}

pub fn registry(corpus: KeywordCorpus) -> Arc<RetrieverRegistry> {
    let retriever = HybridRetriever::new(RetrieverConfig::default(), Arc::new(corpus), counter())
        .expect("default retriever config is valid");
    let registry = Arc::new(RetrieverRegistry::new("default"));
    registry
        .register("default", Arc::new(retriever))
        .expect("first registration succeeds");
    registry
}

pub fn processor(settings: &Settings, llm: Arc<ScriptedLlm>) -> TurnProcessor {
    TurnProcessor::from_settings(settings, llm, registry(KeywordCorpus::medical()), counter())
        .expect("settings are valid")
}
