//! Refine loop state machine
//!
//! ```text
//! EVALUATING --strategy says retrieve, safeguards pass--> CONTINUE (rewritten query)
//! EVALUATING --otherwise-----------------------------------> TERMINATE (reason)
//! ```
//!
//! The controller owns no turn state; every turn creates its own
//! [`RefineState`] and threads it through [`RefineController::step`].

use std::collections::BTreeSet;
use std::sync::Arc;

use medirag_core::{ContentHash, Document, IterationRecord, QualityFeedback, TerminationReason};

use super::safeguards::Safeguards;
use super::strategy::{RefineInput, RefineStrategy};

/// Per-turn loop state, grown by one entry per iteration
#[derive(Debug, Clone, Default)]
pub struct RefineState {
    pub iteration_count: usize,
    pub quality_score_history: Vec<f32>,
    pub query_rewrite_history: Vec<String>,
    pub retrieved_docs_history: Vec<BTreeSet<ContentHash>>,
    pub iteration_records: Vec<IterationRecord>,
}

impl RefineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_feedback(&self) -> Option<&QualityFeedback> {
        self.iteration_records.last().and_then(|r| r.feedback.as_ref())
    }

    /// Most recent rewritten query, if any
    pub fn last_rewrite(&self) -> Option<&str> {
        self.query_rewrite_history.last().map(String::as_str)
    }
}

/// Outcome of one controller step
#[derive(Debug, Clone, PartialEq)]
pub enum RefineDecision {
    /// Retrieve again with this query
    Continue { query: String },
    /// Return the current answer
    Terminate { reason: TerminationReason },
}

impl RefineDecision {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefineDecision::Terminate { .. })
    }
}

/// Runs one refine iteration: strategy, safeguards, bookkeeping
#[derive(Clone)]
pub struct RefineController {
    strategy: Arc<dyn RefineStrategy>,
    safeguards: Safeguards,
}

impl RefineController {
    pub fn new(strategy: Arc<dyn RefineStrategy>, safeguards: Safeguards) -> Self {
        Self {
            strategy,
            safeguards,
        }
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Evaluate the answer built from `input.documents` and decide the next step
    ///
    /// Duplicate detection compares `input.retrieved`, the documents as
    /// retrieved, so compressing them differently per query does not hide a
    /// repeat.
    pub async fn step(&self, state: &mut RefineState, input: &RefineInput<'_>) -> RefineDecision {
        state
            .retrieved_docs_history
            .push(input.retrieved.iter().map(Document::content_hash).collect());

        let outcome = {
            let input = RefineInput {
                iteration: state.iteration_count,
                previous_feedback: state.last_feedback(),
                safeguards: Some(
                    self.safeguards
                        .view(&state.retrieved_docs_history, &state.quality_score_history),
                ),
                ..*input
            };
            self.strategy.refine(&input).await
        };
        state.quality_score_history.push(outcome.quality_score);

        // strategies that ignore the view are still held to the safeguards
        let decision = match (outcome.needs_retrieval, outcome.stop_reason) {
            (true, None) => match self
                .safeguards
                .check(&state.retrieved_docs_history, &state.quality_score_history)
            {
                Some(reason) => RefineDecision::Terminate { reason },
                None => RefineDecision::Continue {
                    query: outcome
                        .rewritten_query
                        .clone()
                        .unwrap_or_else(|| input.query.to_string()),
                },
            },
            (_, reason) => RefineDecision::Terminate {
                reason: reason.unwrap_or(TerminationReason::QualityAccepted),
            },
        };

        let termination = match &decision {
            RefineDecision::Terminate { reason } => Some(*reason),
            RefineDecision::Continue { .. } => None,
        };

        tracing::info!(
            iteration = state.iteration_count,
            strategy = self.strategy.name(),
            score = outcome.quality_score,
            needs_retrieval = outcome.needs_retrieval,
            docs = input.documents.len(),
            termination = ?termination,
            "Refine step"
        );

        state.iteration_records.push(IterationRecord {
            iteration: state.iteration_count,
            strategy_name: self.strategy.name().to_string(),
            quality_score: outcome.quality_score,
            feedback: outcome.feedback,
            needs_retrieval: outcome.needs_retrieval,
            // only a query that drives the next retrieval is recorded
            rewritten_query: outcome.rewritten_query.filter(|_| termination.is_none()),
            num_docs: input.documents.len(),
            termination,
        });

        if let RefineDecision::Continue { query } = &decision {
            state.query_rewrite_history.push(query.clone());
            state.iteration_count += 1;
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refine::{BasicStrategy, RefineOutcome};
    use async_trait::async_trait;
    use medirag_core::DocumentSource;
    use parking_lot::Mutex;

    /// Replays scores; always asks for retrieval below 0.5
    struct ScriptedStrategy {
        scores: Mutex<Vec<f32>>,
        seen: Mutex<Vec<(usize, bool)>>,
    }

    impl ScriptedStrategy {
        fn new(scores: &[f32]) -> Arc<Self> {
            let mut scores = scores.to_vec();
            scores.reverse();
            Arc::new(Self {
                scores: Mutex::new(scores),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RefineStrategy for ScriptedStrategy {
        async fn refine(&self, input: &RefineInput<'_>) -> RefineOutcome {
            self.seen
                .lock()
                .push((input.iteration, input.previous_feedback.is_some()));
            let score = self.scores.lock().pop().unwrap_or(0.0);
            let feedback = QualityFeedback::uniform(score).with_needs_retrieval(true);
            let needs_retrieval = self.should_retrieve(&feedback, input.iteration);
            RefineOutcome {
                quality_score: score,
                rewritten_query: needs_retrieval.then(|| format!("rewrite {}", input.iteration)),
                feedback: Some(feedback),
                needs_retrieval,
                stop_reason: (!needs_retrieval).then_some(TerminationReason::QualityAccepted),
            }
        }

        fn should_retrieve(&self, feedback: &QualityFeedback, iteration: usize) -> bool {
            feedback.overall_score < 0.5 && iteration < 5
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn docs(texts: &[&str]) -> Vec<Document> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Document::new(format!("d{}", i), *t, 1.0, i + 1, DocumentSource::Fused))
            .collect()
    }

    #[tokio::test]
    async fn test_basic_strategy_terminates_immediately() {
        let controller = RefineController::new(Arc::new(BasicStrategy), Safeguards::default());
        let mut state = RefineState::new();
        let docs = docs(&["a"]);

        let decision = controller.step(&mut state, &RefineInput::new("q", "answer", &docs)).await;
        assert_eq!(
            decision,
            RefineDecision::Terminate {
                reason: TerminationReason::StrategyDisabled
            }
        );
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.iteration_records.len(), 1);
        assert_eq!(state.iteration_records[0].strategy_name, "basic");
    }

    #[tokio::test]
    async fn test_continue_records_rewrite() {
        let strategy = ScriptedStrategy::new(&[0.1, 0.6]);
        let controller = RefineController::new(strategy.clone(), Safeguards::default());
        let mut state = RefineState::new();

        let first = docs(&["고혈압 정의"]);
        let decision = controller.step(&mut state, &RefineInput::new("q", "a", &first)).await;
        assert_eq!(
            decision,
            RefineDecision::Continue {
                query: "rewrite 0".to_string()
            }
        );
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.last_rewrite(), Some("rewrite 0"));

        let second = docs(&["고혈압 약물 치료"]);
        let decision = controller.step(&mut state, &RefineInput::new("q", "a2", &second)).await;
        assert!(decision.is_terminal());
        assert_eq!(state.quality_score_history, vec![0.1, 0.6]);
        assert_eq!(state.iteration_records.len(), 2);
        assert_eq!(state.iteration_records[1].num_docs, 1);

        // iteration and previous feedback come from the state
        assert_eq!(*strategy.seen.lock(), vec![(0, false), (1, true)]);
    }

    #[tokio::test]
    async fn test_stagnation_stops_low_scores() {
        let controller =
            RefineController::new(ScriptedStrategy::new(&[0.40, 0.42]), Safeguards::default());
        let mut state = RefineState::new();

        let first = docs(&["a"]);
        let decision = controller.step(&mut state, &RefineInput::new("q", "a", &first)).await;
        assert!(!decision.is_terminal());

        let second = docs(&["b"]);
        let decision = controller.step(&mut state, &RefineInput::new("q", "a", &second)).await;
        assert_eq!(
            decision,
            RefineDecision::Terminate {
                reason: TerminationReason::Stagnation
            }
        );
        let last = state.iteration_records.last().unwrap();
        assert!(last.needs_retrieval);
        assert_eq!(last.termination, Some(TerminationReason::Stagnation));
        // the strategy's rewrite was never used
        assert_eq!(last.rewritten_query, None);
    }

    #[tokio::test]
    async fn test_duplicate_results_stop_regardless_of_score() {
        let controller =
            RefineController::new(ScriptedStrategy::new(&[0.1, 0.4]), Safeguards::default());
        let mut state = RefineState::new();
        let same = docs(&["a", "b", "c"]);

        controller.step(&mut state, &RefineInput::new("q", "a", &same)).await;
        let decision = controller.step(&mut state, &RefineInput::new("q", "a", &same)).await;
        assert_eq!(
            decision,
            RefineDecision::Terminate {
                reason: TerminationReason::DuplicateResults
            }
        );
        assert_eq!(state.iteration_count, 1);
    }

    #[tokio::test]
    async fn test_duplicates_compare_retrieved_not_compressed() {
        let controller =
            RefineController::new(ScriptedStrategy::new(&[0.1, 0.4]), Safeguards::default());
        let mut state = RefineState::new();
        let retrieved = docs(&["고혈압 치료제는 여러 종류가 있습니다. 이뇨제가 흔합니다."]);
        let first_cut = docs(&["고혈압 치료제는 여러 종류가 있습니다."]);
        let second_cut = docs(&["이뇨제가 흔합니다."]);

        let input = RefineInput::new("q", "a", &first_cut).with_retrieved(&retrieved);
        assert!(!controller.step(&mut state, &input).await.is_terminal());

        let input = RefineInput::new("q", "a", &second_cut).with_retrieved(&retrieved);
        assert_eq!(
            controller.step(&mut state, &input).await,
            RefineDecision::Terminate {
                reason: TerminationReason::DuplicateResults
            }
        );
        assert_eq!(state.iteration_records[1].num_docs, 1);
    }

    #[tokio::test]
    async fn test_strategy_sees_safeguard_view() {
        let strategy = ViewRecorder::default();
        let strategy = Arc::new(strategy);
        let controller = RefineController::new(strategy.clone(), Safeguards::default());
        let mut state = RefineState::new();
        let same = docs(&["a"]);

        controller.step(&mut state, &RefineInput::new("q", "a", &same)).await;
        controller.step(&mut state, &RefineInput::new("q", "a", &same)).await;

        assert_eq!(
            *strategy.verdicts.lock(),
            vec![None, Some(TerminationReason::DuplicateResults)]
        );
    }

    /// Records what the safeguard view says for a score of 0.0
    #[derive(Default)]
    struct ViewRecorder {
        verdicts: Mutex<Vec<Option<TerminationReason>>>,
    }

    #[async_trait]
    impl RefineStrategy for ViewRecorder {
        async fn refine(&self, input: &RefineInput<'_>) -> RefineOutcome {
            let verdict = input.safeguards.and_then(|g| g.check(0.0));
            self.verdicts.lock().push(verdict);
            RefineOutcome {
                quality_score: 0.0,
                feedback: None,
                needs_retrieval: true,
                rewritten_query: Some("next".to_string()),
                stop_reason: verdict,
            }
        }

        fn should_retrieve(&self, _feedback: &QualityFeedback, _iteration: usize) -> bool {
            true
        }

        fn name(&self) -> &str {
            "view"
        }
    }
}
