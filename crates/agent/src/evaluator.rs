//! Answer quality evaluation
//!
//! Scores an answer on grounding, completeness and accuracy. The primary
//! path asks the LLM for a JSON verdict; any call, timeout or parse failure
//! falls back to a length/evidence heuristic. The overall score is always
//! recomputed locally from the three components.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use medirag_config::RefineConfig;
use medirag_core::{Document, QualityFeedback};
use medirag_llm::{GenerateRequest, LlmBackend};

use crate::{char_preview, AgentError};

/// Component score used when a field is missing or unreadable
const DEFAULT_COMPONENT_SCORE: f32 = 0.5;

/// Answer length (chars) at which the heuristic length term saturates
const HEURISTIC_FULL_LENGTH: f32 = 500.0;

const EVALUATION_MAX_TOKENS: usize = 512;

/// Everything the evaluator looks at for one answer
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRequest<'a> {
    pub query: &'a str,
    pub answer: &'a str,
    pub documents: &'a [Document],
    pub profile: Option<&'a str>,
    /// Feedback from the previous iteration of this turn
    pub previous: Option<&'a QualityFeedback>,
}

impl<'a> EvaluationRequest<'a> {
    pub fn new(query: &'a str, answer: &'a str, documents: &'a [Document]) -> Self {
        Self {
            query,
            answer,
            documents,
            profile: None,
            previous: None,
        }
    }

    pub fn with_profile(mut self, profile: &'a str) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_previous(mut self, previous: Option<&'a QualityFeedback>) -> Self {
        self.previous = previous;
        self
    }

    fn has_profile(&self) -> bool {
        self.profile.is_some_and(|p| !p.trim().is_empty())
    }
}

/// LLM-backed answer evaluator with a heuristic fallback
pub struct QualityEvaluator {
    llm: Option<Arc<dyn LlmBackend>>,
    timeout: Duration,
    answer_preview_chars: usize,
    evidence_preview_chars: usize,
}

impl QualityEvaluator {
    pub fn new(llm: Arc<dyn LlmBackend>, config: &RefineConfig) -> Self {
        Self {
            llm: Some(llm),
            ..Self::heuristic_only(config)
        }
    }

    /// Evaluator that never calls the LLM
    pub fn heuristic_only(config: &RefineConfig) -> Self {
        Self {
            llm: None,
            timeout: Duration::from_millis(config.evaluation_timeout_ms),
            answer_preview_chars: config.answer_preview_chars,
            evidence_preview_chars: config.evidence_preview_chars,
        }
    }

    /// Score an answer; never fails
    pub async fn evaluate(&self, request: &EvaluationRequest<'_>) -> QualityFeedback {
        let Some(llm) = &self.llm else {
            return Self::heuristic(request);
        };

        match self.evaluate_with_llm(llm.as_ref(), request).await {
            Ok(feedback) => {
                tracing::debug!(
                    score = feedback.overall_score,
                    needs_retrieval = feedback.needs_retrieval,
                    missing = feedback.missing_info.len(),
                    "LLM evaluation"
                );
                feedback
            },
            Err(e) => {
                tracing::warn!(error = %e, "Quality evaluation failed, using heuristic");
                Self::heuristic(request)
            },
        }
    }

    async fn evaluate_with_llm(
        &self,
        llm: &dyn LlmBackend,
        request: &EvaluationRequest<'_>,
    ) -> Result<QualityFeedback, AgentError> {
        let generate = GenerateRequest::new(self.build_prompt(request))
            .with_temperature(0.0)
            .with_max_tokens(EVALUATION_MAX_TOKENS);

        let result = tokio::time::timeout(self.timeout, llm.generate(&generate))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout.as_millis() as u64))??;

        parse_feedback(&result.text)
    }

    /// Length/evidence heuristic
    ///
    /// `0.3 * min(chars / 500, 1) + 0.4 * has_documents + 0.3 * has_profile`
    pub fn heuristic(request: &EvaluationRequest<'_>) -> QualityFeedback {
        let length = (request.answer.chars().count() as f32 / HEURISTIC_FULL_LENGTH).min(1.0);
        let documents = if request.documents.is_empty() { 0.0 } else { 1.0 };
        let profile = if request.has_profile() { 1.0 } else { 0.0 };
        let overall = 0.3 * length + 0.4 * documents + 0.3 * profile;

        QualityFeedback::uniform(overall)
            .with_needs_retrieval(overall < 0.5)
            .with_reason("heuristic")
    }

    fn build_prompt(&self, request: &EvaluationRequest<'_>) -> String {
        let evidence = if request.documents.is_empty() {
            "(없음)".to_string()
        } else {
            let joined = request
                .documents
                .iter()
                .enumerate()
                .map(|(i, d)| format!("[{}] {}", i + 1, d.text.trim()))
                .collect::<Vec<_>>()
                .join("\n");
            char_preview(&joined, self.evidence_preview_chars)
        };

        let profile = request
            .profile
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("(없음)");

        let previous = match request.previous {
            Some(fb) if fb.missing_info.is_empty() => {
                format!("이전 평가 점수: {:.2}", fb.overall_score)
            },
            Some(fb) => format!(
                "이전 평가 점수: {:.2}, 부족했던 정보: {}",
                fb.overall_score,
                fb.missing_info.join(", ")
            ),
            None => "(없음)".to_string(),
        };

        format!(
            "당신은 의료 상담 답변의 품질을 평가하는 검토자입니다.\n\
             아래 질문, 근거 문서, 답변을 읽고 JSON 객체 하나만 출력하세요.\n\n\
             평가 항목 (0.0 ~ 1.0):\n\
             - grounding_score: 답변의 주장이 근거 문서로 뒷받침되는 정도\n\
             - completeness_score: 질문에 빠짐없이 답한 정도\n\
             - accuracy_score: 의학적으로 정확한 정도\n\n\
             추가 필드:\n\
             - missing_info: 답변에 부족한 정보 목록\n\
             - improvement_suggestions: 개선 제안 목록\n\
             - needs_retrieval: 추가 문서 검색이 필요하면 true\n\
             - reason: 한 문장 요약\n\n\
             질문: {query}\n\n\
             사용자 정보: {profile}\n\n\
             근거 문서:\n{evidence}\n\n\
             답변:\n{answer}\n\n\
             이전 평가: {previous}\n\n\
             JSON:",
            query = request.query.trim(),
            answer = char_preview(request.answer, self.answer_preview_chars),
        )
    }
}

/// Parse the evaluator's JSON verdict
///
/// Accepts surrounding prose; reads from the first `{` to the last `}`.
/// Missing or unreadable scores default to 0.5, lists to empty and
/// `needs_retrieval` to false. The model's own overall score is ignored.
pub(crate) fn parse_feedback(response: &str) -> Result<QualityFeedback, AgentError> {
    let start = response
        .find('{')
        .ok_or_else(|| AgentError::Evaluation("no JSON object in response".to_string()))?;
    let end = response
        .rfind('}')
        .filter(|&end| end > start)
        .ok_or_else(|| AgentError::Evaluation("unterminated JSON object".to_string()))?;

    let value: Value = serde_json::from_str(&response[start..=end])
        .map_err(|e| AgentError::Evaluation(format!("invalid JSON: {}", e)))?;
    let Value::Object(fields) = value else {
        return Err(AgentError::Evaluation("verdict is not an object".to_string()));
    };

    let reason = match fields.get("reason") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => "llm".to_string(),
    };

    Ok(QualityFeedback::new(
        score_field(&fields, "grounding_score"),
        score_field(&fields, "completeness_score"),
        score_field(&fields, "accuracy_score"),
    )
    .with_missing_info(list_field(&fields, "missing_info"))
    .with_suggestions(list_field(&fields, "improvement_suggestions"))
    .with_needs_retrieval(bool_field(&fields, "needs_retrieval"))
    .with_reason(reason))
}

fn score_field(fields: &Map<String, Value>, key: &str) -> f32 {
    match fields.get(key) {
        Some(Value::Number(n)) => n.as_f64().map_or(DEFAULT_COMPONENT_SCORE, |v| v as f32),
        Some(Value::String(s)) => s.trim().parse::<f32>().unwrap_or(DEFAULT_COMPONENT_SCORE),
        _ => DEFAULT_COMPONENT_SCORE,
    }
}

fn list_field(fields: &Map<String, Value>, key: &str) -> Vec<String> {
    match fields.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn bool_field(fields: &Map<String, Value>, key: &str) -> bool {
    match fields.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medirag_core::DocumentSource;
    use medirag_llm::{FinishReason, GenerationResult, LlmError};

    struct FixedLlm(Result<String, ()>);

    #[async_trait]
    impl LlmBackend for FixedLlm {
        async fn generate(&self, _request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
            match &self.0 {
                Ok(text) => Ok(GenerationResult {
                    text: text.clone(),
                    tokens: 0,
                    total_time_ms: 0,
                    finish_reason: FinishReason::Stop,
                }),
                Err(()) => Err(LlmError::Network("connection refused".to_string())),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    fn docs() -> Vec<Document> {
        vec![Document::new("d1", "고혈압 기준은 140/90 mmHg 입니다.", 1.0, 1, DocumentSource::Keyword)]
    }

    fn evaluator(response: Result<String, ()>) -> QualityEvaluator {
        QualityEvaluator::new(Arc::new(FixedLlm(response)), &RefineConfig::default())
    }

    fn in_unit(fb: &QualityFeedback) -> bool {
        [
            fb.grounding_score,
            fb.completeness_score,
            fb.accuracy_score,
            fb.overall_score,
        ]
        .iter()
        .all(|s| (0.0..=1.0).contains(s))
    }

    #[tokio::test]
    async fn test_parses_llm_verdict() {
        let response = r#"평가 결과입니다.
{"grounding_score": 0.9, "completeness_score": 0.6, "accuracy_score": 1.0,
 "overall_score": 0.1, "missing_info": ["복용 시간"], "improvement_suggestions": [],
 "needs_retrieval": true, "reason": "복용 시간 누락"}"#;
        let docs = docs();
        let fb = evaluator(Ok(response.to_string()))
            .evaluate(&EvaluationRequest::new("혈압약 언제 먹나요?", "아침에 드세요.", &docs))
            .await;

        // overall recomputed, not the 0.1 from the model
        assert!((fb.overall_score - 0.8).abs() < 1e-5);
        assert_eq!(fb.missing_info, vec!["복용 시간".to_string()]);
        assert!(fb.needs_retrieval);
        assert_eq!(fb.reason, "복용 시간 누락");
    }

    #[tokio::test]
    async fn test_scores_clamped_for_malformed_values() {
        let response = r#"{"grounding_score": 7, "completeness_score": "-2", "accuracy_score": "high",
            "missing_info": "근거", "needs_retrieval": "yes"}"#;
        let docs = docs();
        let fb = evaluator(Ok(response.to_string()))
            .evaluate(&EvaluationRequest::new("q", "a", &docs))
            .await;

        assert!(in_unit(&fb));
        assert_eq!(fb.grounding_score, 1.0);
        assert_eq!(fb.completeness_score, 0.0);
        assert_eq!(fb.accuracy_score, 0.5);
        assert_eq!(fb.missing_info, vec!["근거".to_string()]);
        assert!(fb.needs_retrieval);
    }

    #[tokio::test]
    async fn test_missing_fields_default() {
        let docs = docs();
        let fb = evaluator(Ok("{}".to_string()))
            .evaluate(&EvaluationRequest::new("q", "a", &docs))
            .await;

        assert!((fb.overall_score - 0.5).abs() < 1e-6);
        assert!(fb.missing_info.is_empty());
        assert!(!fb.needs_retrieval);
        assert_eq!(fb.reason, "llm");
    }

    #[tokio::test]
    async fn test_unparseable_response_uses_heuristic() {
        let docs = docs();
        let fb = evaluator(Ok("좋은 답변입니다".to_string()))
            .evaluate(&EvaluationRequest::new("q", "a", &docs))
            .await;
        assert_eq!(fb.reason, "heuristic");
        assert!(in_unit(&fb));
    }

    #[tokio::test]
    async fn test_llm_error_uses_heuristic() {
        let fb = evaluator(Err(()))
            .evaluate(&EvaluationRequest::new("q", "", &[]))
            .await;
        assert_eq!(fb.reason, "heuristic");
        assert_eq!(fb.overall_score, 0.0);
        assert!(fb.needs_retrieval);
    }

    #[test]
    fn test_heuristic_formula() {
        let docs = docs();
        let answer = "가".repeat(250);

        let fb = QualityEvaluator::heuristic(&EvaluationRequest::new("q", &answer, &docs));
        // 0.3 * 0.5 + 0.4
        assert!((fb.overall_score - 0.55).abs() < 1e-5);
        assert!(!fb.needs_retrieval);

        let fb = QualityEvaluator::heuristic(
            &EvaluationRequest::new("q", &answer, &[]).with_profile("  "),
        );
        assert!((fb.overall_score - 0.15).abs() < 1e-5);
        assert!(fb.needs_retrieval);

        let long = "a".repeat(2000);
        let fb = QualityEvaluator::heuristic(
            &EvaluationRequest::new("q", &long, &docs).with_profile("65세 남성"),
        );
        assert!((fb.overall_score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(parse_feedback("no json here").is_err());
        assert!(parse_feedback("} backwards {").is_err());
        assert!(parse_feedback("{not json}").is_err());
    }
}
