//! Anti-thrash safeguards
//!
//! Either check can stop the loop even when the score test asks for another
//! retrieval.

use std::collections::BTreeSet;

use medirag_config::RefineConfig;
use medirag_core::{ContentHash, TerminationReason};

/// Duplicate-result and stagnation thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Safeguards {
    /// Jaccard similarity of consecutive document sets that counts as a repeat
    pub duplicate_threshold: f32,
    /// Minimum score improvement between consecutive iterations
    pub stagnation_delta: f32,
}

impl Default for Safeguards {
    fn default() -> Self {
        use medirag_config::constants::refine;
        Self {
            duplicate_threshold: refine::DUPLICATE_JACCARD,
            stagnation_delta: refine::STAGNATION_DELTA,
        }
    }
}

impl Safeguards {
    pub fn from_settings(config: &RefineConfig) -> Self {
        Self {
            duplicate_threshold: config.duplicate_jaccard_threshold,
            stagnation_delta: config.stagnation_delta,
        }
    }

    /// Jaccard similarity; two empty sets are identical
    pub fn jaccard(a: &BTreeSet<ContentHash>, b: &BTreeSet<ContentHash>) -> f32 {
        let union = a.union(b).count();
        if union == 0 {
            return 1.0;
        }
        a.intersection(b).count() as f32 / union as f32
    }

    /// Last two retrieved sets are near-identical
    pub fn is_duplicate(&self, history: &[BTreeSet<ContentHash>]) -> bool {
        match history {
            [.., previous, current] => Self::jaccard(previous, current) >= self.duplicate_threshold,
            _ => false,
        }
    }

    /// Last score did not improve on the one before by at least the delta
    pub fn is_stagnant(&self, scores: &[f32]) -> bool {
        match scores {
            [.., previous, current] => current - previous < self.stagnation_delta,
            _ => false,
        }
    }

    /// The recorded histories, to be checked against a score not yet recorded
    pub fn view<'a>(
        &'a self,
        docs_history: &'a [BTreeSet<ContentHash>],
        scores: &'a [f32],
    ) -> SafeguardView<'a> {
        SafeguardView {
            safeguards: self,
            docs_history,
            scores,
        }
    }

    /// First safeguard that fires, duplicate check first
    pub fn check(
        &self,
        docs_history: &[BTreeSet<ContentHash>],
        scores: &[f32],
    ) -> Option<TerminationReason> {
        if self.is_duplicate(docs_history) {
            Some(TerminationReason::DuplicateResults)
        } else if self.is_stagnant(scores) {
            Some(TerminationReason::Stagnation)
        } else {
            None
        }
    }
}

/// Safeguards over an iteration in progress
///
/// The current document set is already in `docs_history`; the current score
/// is passed to [`SafeguardView::check`].
#[derive(Debug, Clone, Copy)]
pub struct SafeguardView<'a> {
    safeguards: &'a Safeguards,
    docs_history: &'a [BTreeSet<ContentHash>],
    scores: &'a [f32],
}

impl SafeguardView<'_> {
    pub fn check(&self, score: f32) -> Option<TerminationReason> {
        if self.safeguards.is_duplicate(self.docs_history) {
            return Some(TerminationReason::DuplicateResults);
        }
        match self.scores.last() {
            Some(previous) if score - previous < self.safeguards.stagnation_delta => {
                Some(TerminationReason::Stagnation)
            },
            _ => None,
        }
    }
}
