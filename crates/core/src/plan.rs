//! Per-turn token plan

use serde::{Deserialize, Serialize};

/// Split of the total context budget into sub-budgets
///
/// Built once per turn and never mutated afterwards; fields are private so a
/// plan can only come from [`TokenPlan::new`], which enforces that the
/// sub-budgets sum to at most `max_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPlan {
    max_total: usize,
    for_query: usize,
    for_profile: usize,
    for_recent: usize,
    for_longterm: usize,
    for_docs: usize,
}

impl TokenPlan {
    /// Build a plan, returning `None` if the parts overflow `max_total`
    pub fn new(
        max_total: usize,
        for_query: usize,
        for_profile: usize,
        for_recent: usize,
        for_longterm: usize,
        for_docs: usize,
    ) -> Option<Self> {
        let sum = for_query
            .checked_add(for_profile)?
            .checked_add(for_recent)?
            .checked_add(for_longterm)?
            .checked_add(for_docs)?;
        if sum > max_total {
            return None;
        }
        Some(Self {
            max_total,
            for_query,
            for_profile,
            for_recent,
            for_longterm,
            for_docs,
        })
    }

    /// Plan that gives everything to evidence (tests and single-purpose callers)
    pub fn docs_only(for_docs: usize) -> Self {
        Self {
            max_total: for_docs,
            for_query: 0,
            for_profile: 0,
            for_recent: 0,
            for_longterm: 0,
            for_docs,
        }
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }

    pub fn for_query(&self) -> usize {
        self.for_query
    }

    pub fn for_profile(&self) -> usize {
        self.for_profile
    }

    pub fn for_recent(&self) -> usize {
        self.for_recent
    }

    pub fn for_longterm(&self) -> usize {
        self.for_longterm
    }

    pub fn for_docs(&self) -> usize {
        self.for_docs
    }

    /// Sum of all sub-budgets
    pub fn allocated(&self) -> usize {
        self.for_query + self.for_profile + self.for_recent + self.for_longterm + self.for_docs
    }
}
