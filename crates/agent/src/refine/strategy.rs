//! Refine strategies
//!
//! A strategy looks at one generated answer and decides whether the loop
//! should retrieve again, producing the rewritten query when it should.

use std::sync::Arc;

use async_trait::async_trait;

use medirag_config::RefineConfig;
use medirag_core::{Document, EntitySlots, QualityFeedback, TerminationReason};

use super::safeguards::SafeguardView;
use crate::evaluator::{EvaluationRequest, QualityEvaluator};
use crate::rewriter::{QueryRewriter, RewriteRequest};

/// What a strategy sees for one iteration
///
/// `iteration`, `previous_feedback` and `safeguards` are filled in from the
/// refine state by [`RefineController::step`](super::RefineController::step).
#[derive(Debug, Clone, Copy)]
pub struct RefineInput<'a> {
    /// The user's question for this turn
    pub query: &'a str,
    pub answer: &'a str,
    /// Evidence the answer was generated from
    pub documents: &'a [Document],
    /// Retrieval output before compression; the duplicate check hashes these
    pub retrieved: &'a [Document],
    pub profile: Option<&'a str>,
    pub slots: Option<&'a EntitySlots>,
    pub iteration: usize,
    pub previous_feedback: Option<&'a QualityFeedback>,
    pub safeguards: Option<SafeguardView<'a>>,
}

impl<'a> RefineInput<'a> {
    pub fn new(query: &'a str, answer: &'a str, documents: &'a [Document]) -> Self {
        Self {
            query,
            answer,
            documents,
            retrieved: documents,
            profile: None,
            slots: None,
            iteration: 0,
            previous_feedback: None,
            safeguards: None,
        }
    }

    /// Retrieved set when `documents` is a compressed form of it
    pub fn with_retrieved(mut self, retrieved: &'a [Document]) -> Self {
        self.retrieved = retrieved;
        self
    }

    pub fn with_profile(mut self, profile: Option<&'a str>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_slots(mut self, slots: Option<&'a EntitySlots>) -> Self {
        self.slots = slots;
        self
    }
}

/// Result of one strategy pass
#[derive(Debug, Clone, PartialEq)]
pub struct RefineOutcome {
    pub quality_score: f32,
    pub feedback: Option<QualityFeedback>,
    pub needs_retrieval: bool,
    pub rewritten_query: Option<String>,
    /// Why the loop should stop; `None` when it should continue. A safeguard
    /// reason here comes with `needs_retrieval` still set.
    pub stop_reason: Option<TerminationReason>,
}

/// Pluggable refine behavior
#[async_trait]
pub trait RefineStrategy: Send + Sync {
    /// Evaluate the answer and decide on re-retrieval
    async fn refine(&self, input: &RefineInput<'_>) -> RefineOutcome;

    /// Score test alone, without safeguards
    fn should_retrieve(&self, feedback: &QualityFeedback, iteration: usize) -> bool;

    fn name(&self) -> &str;
}

/// Never refines; every answer is accepted as is
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicStrategy;

#[async_trait]
impl RefineStrategy for BasicStrategy {
    async fn refine(&self, _input: &RefineInput<'_>) -> RefineOutcome {
        RefineOutcome {
            quality_score: 1.0,
            feedback: None,
            needs_retrieval: false,
            rewritten_query: None,
            stop_reason: Some(TerminationReason::StrategyDisabled),
        }
    }

    fn should_retrieve(&self, _feedback: &QualityFeedback, _iteration: usize) -> bool {
        false
    }

    fn name(&self) -> &str {
        "basic"
    }
}

/// Evaluate, then rewrite and retrieve again while quality is low
pub struct CorrectiveStrategy {
    evaluator: Arc<QualityEvaluator>,
    rewriter: Arc<QueryRewriter>,
    quality_threshold: f32,
    max_iterations: usize,
}

impl CorrectiveStrategy {
    pub fn new(
        evaluator: Arc<QualityEvaluator>,
        rewriter: Arc<QueryRewriter>,
        config: &RefineConfig,
    ) -> Self {
        Self {
            evaluator,
            rewriter,
            quality_threshold: config.quality_threshold,
            max_iterations: config.max_iterations,
        }
    }

    /// Evaluator asked for retrieval and the score is below threshold
    fn wants_retrieval(&self, feedback: &QualityFeedback) -> bool {
        feedback.needs_retrieval && feedback.overall_score < self.quality_threshold
    }
}

#[async_trait]
impl RefineStrategy for CorrectiveStrategy {
    async fn refine(&self, input: &RefineInput<'_>) -> RefineOutcome {
        let mut request = EvaluationRequest::new(input.query, input.answer, input.documents)
            .with_previous(input.previous_feedback);
        request.profile = input.profile;
        let feedback = self.evaluator.evaluate(&request).await;

        let needs_retrieval = self.should_retrieve(&feedback, input.iteration);
        let halted = input
            .safeguards
            .filter(|_| needs_retrieval)
            .and_then(|guards| guards.check(feedback.overall_score));

        let (rewritten_query, stop_reason) = if let Some(reason) = halted {
            (None, Some(reason))
        } else if needs_retrieval {
            let query = self
                .rewriter
                .rewrite(&RewriteRequest {
                    original_query: input.query,
                    feedback: &feedback,
                    previous_answer: input.answer,
                    profile: input.profile,
                    slots: input.slots,
                    iteration: input.iteration,
                })
                .await;
            (Some(query), None)
        } else if self.wants_retrieval(&feedback) {
            (None, Some(TerminationReason::IterationCap))
        } else {
            (None, Some(TerminationReason::QualityAccepted))
        };

        tracing::debug!(
            iteration = input.iteration,
            score = feedback.overall_score,
            needs_retrieval,
            halted = ?halted,
            "Corrective refine"
        );

        RefineOutcome {
            quality_score: feedback.overall_score,
            feedback: Some(feedback),
            needs_retrieval,
            rewritten_query,
            stop_reason,
        }
    }

    fn should_retrieve(&self, feedback: &QualityFeedback, iteration: usize) -> bool {
        self.wants_retrieval(feedback) && iteration < self.max_iterations
    }

    fn name(&self) -> &str {
        "corrective"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use medirag_core::ContentHash;

    use crate::refine::Safeguards;

    fn corrective(max_iterations: usize) -> CorrectiveStrategy {
        let config = RefineConfig {
            max_iterations,
            ..RefineConfig::default()
        };
        CorrectiveStrategy::new(
            Arc::new(QualityEvaluator::heuristic_only(&config)),
            Arc::new(QueryRewriter::heuristic_only(&config)),
            &config,
        )
    }

    #[tokio::test]
    async fn test_basic_always_terminates() {
        let outcome = BasicStrategy.refine(&RefineInput::new("q", "", &[])).await;
        assert_eq!(outcome.quality_score, 1.0);
        assert!(!outcome.needs_retrieval);
        assert_eq!(outcome.stop_reason, Some(TerminationReason::StrategyDisabled));
        assert!(!BasicStrategy.should_retrieve(&QualityFeedback::uniform(0.0), 0));
    }

    #[test]
    fn test_should_retrieve_requires_flag_score_and_budget() {
        let strategy = corrective(2);
        let low = QualityFeedback::uniform(0.3).with_needs_retrieval(true);

        assert!(strategy.should_retrieve(&low, 0));
        assert!(strategy.should_retrieve(&low, 1));
        assert!(!strategy.should_retrieve(&low, 2));
        assert!(!strategy.should_retrieve(&QualityFeedback::uniform(0.3), 0));
        assert!(!strategy.should_retrieve(
            &QualityFeedback::uniform(0.6).with_needs_retrieval(true),
            0
        ));
    }

    #[tokio::test]
    async fn test_corrective_rewrites_low_quality_answer() {
        // heuristic: empty answer, no documents, no profile -> 0.0
        let outcome = corrective(2)
            .refine(&RefineInput::new("당뇨 식단", "", &[]).with_profile(None))
            .await;

        assert!(outcome.needs_retrieval);
        assert_eq!(outcome.rewritten_query.as_deref(), Some("당뇨 식단"));
        assert_eq!(outcome.stop_reason, None);
        assert_eq!(outcome.quality_score, 0.0);
    }

    #[tokio::test]
    async fn test_corrective_skips_rewrite_when_safeguard_fires() {
        let guards = Safeguards::default();
        let history = [BTreeSet::new(), BTreeSet::from([ContentHash::of("고혈압")])];
        let scores = [0.0];

        // 0.0 -> 0.0 is no improvement
        let mut input = RefineInput::new("당뇨 식단", "", &[]);
        input.iteration = 1;
        input.safeguards = Some(guards.view(&history, &scores));
        let outcome = corrective(2).refine(&input).await;

        assert!(outcome.needs_retrieval);
        assert_eq!(outcome.rewritten_query, None);
        assert_eq!(outcome.stop_reason, Some(TerminationReason::Stagnation));
    }

    #[tokio::test]
    async fn test_corrective_hits_iteration_cap() {
        let mut input = RefineInput::new("당뇨 식단", "", &[]);
        input.iteration = 2;
        let outcome = corrective(2).refine(&input).await;

        assert!(!outcome.needs_retrieval);
        assert_eq!(outcome.stop_reason, Some(TerminationReason::IterationCap));
    }

    #[tokio::test]
    async fn test_corrective_accepts_good_answer() {
        let answer = "a".repeat(600);
        let outcome = corrective(2)
            .refine(&RefineInput::new("q", &answer, &[]).with_profile(Some("성인")))
            .await;
        // 0.3 + 0.3
        assert!(!outcome.needs_retrieval);
        assert_eq!(outcome.stop_reason, Some(TerminationReason::QualityAccepted));
    }
}
