//! Feedback-driven query rewriting
//!
//! Turns evaluator feedback into a reformulated retrieval query. Without
//! actionable feedback the query is only enriched with the profile; the LLM
//! is consulted otherwise, and a deterministic concatenation covers every
//! failure.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use medirag_config::RefineConfig;
use medirag_core::{EntitySlots, QualityFeedback};
use medirag_llm::{GenerateRequest, LlmBackend};

use crate::{char_preview, AgentError};

/// Rewrites longer than this are treated as a failed rewrite
const MAX_REWRITE_CHARS: usize = 500;

const REWRITE_MAX_TOKENS: usize = 128;

/// Leading labels models like to put before the query
static LABEL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:rewritten|improved|refined|new|search)\s+)?(?:query|question)\s*[:：]\s*|^\s*(?:재작성된|개선된|수정된|새로운|새|검색)?\s*(?:질문|질의|검색어|쿼리)\s*[:：]\s*",
    )
    .expect("label prefix pattern is valid")
});

const QUOTES: &[char] = &['"', '\'', '`', '“', '”', '‘', '’', '「', '」', '『', '』'];

/// Inputs of one rewrite
#[derive(Debug, Clone, Copy)]
pub struct RewriteRequest<'a> {
    pub original_query: &'a str,
    pub feedback: &'a QualityFeedback,
    pub previous_answer: &'a str,
    pub profile: Option<&'a str>,
    pub slots: Option<&'a EntitySlots>,
    /// Refine iteration that asked for the rewrite
    pub iteration: usize,
}

impl RewriteRequest<'_> {
    fn profile_text(&self) -> Option<&str> {
        self.profile.map(str::trim).filter(|p| !p.is_empty())
    }
}

/// LLM query rewriter with a deterministic fallback
pub struct QueryRewriter {
    llm: Option<Arc<dyn LlmBackend>>,
    timeout: Duration,
    answer_preview_chars: usize,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LlmBackend>, config: &RefineConfig) -> Self {
        Self {
            llm: Some(llm),
            ..Self::heuristic_only(config)
        }
    }

    /// Rewriter that only ever uses the deterministic fallback
    pub fn heuristic_only(config: &RefineConfig) -> Self {
        Self {
            llm: None,
            timeout: Duration::from_millis(config.rewrite_timeout_ms),
            answer_preview_chars: config.answer_preview_chars,
        }
    }

    /// Produce the next retrieval query; never fails
    pub async fn rewrite(&self, request: &RewriteRequest<'_>) -> String {
        if !request.feedback.has_actionable_feedback() {
            return Self::with_profile(request);
        }

        let Some(llm) = &self.llm else {
            return Self::fallback(request);
        };

        match self.rewrite_with_llm(llm.as_ref(), request).await {
            Ok(query) => {
                tracing::debug!(iteration = request.iteration, query = %query, "Query rewritten");
                query
            },
            Err(e) => {
                tracing::warn!(
                    iteration = request.iteration,
                    error = %e,
                    "Query rewrite failed, using fallback"
                );
                Self::fallback(request)
            },
        }
    }

    async fn rewrite_with_llm(
        &self,
        llm: &dyn LlmBackend,
        request: &RewriteRequest<'_>,
    ) -> Result<String, AgentError> {
        let generate = GenerateRequest::new(self.build_prompt(request))
            .with_temperature(0.0)
            .with_max_tokens(REWRITE_MAX_TOKENS);

        let result = tokio::time::timeout(self.timeout, llm.generate(&generate))
            .await
            .map_err(|_| AgentError::Timeout(self.timeout.as_millis() as u64))??;

        let query = clean_rewrite(&result.text)
            .ok_or_else(|| AgentError::Rewrite("empty rewrite".to_string()))?;
        if query.chars().count() > MAX_REWRITE_CHARS {
            return Err(AgentError::Rewrite(format!(
                "rewrite too long ({} chars)",
                query.chars().count()
            )));
        }
        Ok(query)
    }

    /// Original query plus the profile line
    fn with_profile(request: &RewriteRequest<'_>) -> String {
        match request.profile_text() {
            Some(profile) => format!("{}\n{}", request.original_query.trim(), profile),
            None => request.original_query.trim().to_string(),
        }
    }

    /// `original \n missing info \n profile`, empty parts skipped
    pub fn fallback(request: &RewriteRequest<'_>) -> String {
        let missing = request.feedback.missing_info.join(", ");
        [
            request.original_query.trim(),
            missing.trim(),
            request.profile_text().unwrap_or(""),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
    }

    fn build_prompt(&self, request: &RewriteRequest<'_>) -> String {
        let bullets = |items: &[String]| {
            if items.is_empty() {
                "- (없음)".to_string()
            } else {
                items.iter().map(|s| format!("- {}", s)).collect::<Vec<_>>().join("\n")
            }
        };

        let slots = request
            .slots
            .filter(|s| s.has_entities())
            .map(EntitySlots::describe)
            .unwrap_or_else(|| "(없음)".to_string());

        format!(
            "이전 검색으로는 충분한 답변을 만들지 못했습니다. 부족한 정보를 찾을 수 있도록\n\
             검색용 질문을 한 줄로 다시 작성하세요. 원래 질문과 같은 언어를 사용하고\n\
             재작성된 질문만 출력하세요.\n\n\
             원래 질문: {query}\n\n\
             부족한 정보:\n{missing}\n\n\
             개선 제안:\n{suggestions}\n\n\
             이전 답변: {answer}\n\n\
             추출된 의료 정보:\n{slots}\n\n\
             사용자 정보: {profile}\n\n\
             재작성된 질문:",
            query = request.original_query.trim(),
            missing = bullets(&request.feedback.missing_info),
            suggestions = bullets(&request.feedback.improvement_suggestions),
            answer = char_preview(request.previous_answer, self.answer_preview_chars),
            profile = request.profile_text().unwrap_or("(없음)"),
        )
    }
}

/// First non-empty line with any label prefix and quotes removed
fn clean_rewrite(text: &str) -> Option<String> {
    text.lines()
        .map(|line| {
            let line = LABEL_PREFIX.replace(line.trim(), "");
            line.trim().trim_matches(QUOTES).trim().to_string()
        })
        .find(|line| !line.is_empty())
}
