//! Token budget allocation
//!
//! Splits the per-turn context budget into sections. Query, profile, recent
//! dialogue and long-term summary each get a ratio-capped share sized to what
//! they actually need; evidence receives everything left over.

use medirag_config::{BudgetConfig, ConfigError};
use medirag_core::TokenPlan;

use crate::RagError;

/// Token demand of the non-evidence sections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SectionDemand {
    pub query: usize,
    pub profile: usize,
    pub recent: usize,
    pub longterm: usize,
}

/// Budget allocator
#[derive(Debug, Clone)]
pub struct TokenBudgetAllocator {
    max_total: usize,
    query_ratio: f32,
    profile_ratio: f32,
    recent_ratio: f32,
    longterm_ratio: f32,
}

impl TokenBudgetAllocator {
    pub fn new(config: &BudgetConfig) -> Result<Self, RagError> {
        if config.max_total == 0 {
            return Err(ConfigError::invalid("budget.max_total", "Must be greater than zero").into());
        }
        let ratios = [
            ("budget.query_ratio", config.query_ratio),
            ("budget.profile_ratio", config.profile_ratio),
            ("budget.recent_ratio", config.recent_ratio),
            ("budget.longterm_ratio", config.longterm_ratio),
        ];
        for (field, ratio) in ratios {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::invalid(field, format!("Must be in [0, 1], got {}", ratio)).into());
            }
        }
        let sum: f32 = ratios.iter().map(|(_, r)| r).sum();
        if sum > 1.0 + f32::EPSILON {
            return Err(ConfigError::invalid("budget", format!("Ratios sum to {}", sum)).into());
        }

        Ok(Self {
            max_total: config.max_total,
            query_ratio: config.query_ratio,
            profile_ratio: config.profile_ratio,
            recent_ratio: config.recent_ratio,
            longterm_ratio: config.longterm_ratio,
        })
    }

    pub fn max_total(&self) -> usize {
        self.max_total
    }

    /// Plan for the configured total
    pub fn allocate(&self, demand: SectionDemand) -> TokenPlan {
        self.allocate_with_total(self.max_total, demand)
    }

    /// Plan for an explicit total (a fresh plan when a turn needs more room)
    pub fn allocate_with_total(&self, max_total: usize, demand: SectionDemand) -> TokenPlan {
        let scale = |ratio: f32| ((max_total as f64) * (ratio as f64)).floor() as usize;

        let for_query = demand.query.min(scale(self.query_ratio));
        let for_profile = demand.profile.min(scale(self.profile_ratio));
        let for_recent = demand.recent.min(scale(self.recent_ratio));
        let for_longterm = demand.longterm.min(scale(self.longterm_ratio));
        let reserved = for_query + for_profile + for_recent + for_longterm;
        let for_docs = max_total.saturating_sub(reserved);

        let plan = TokenPlan::new(max_total, for_query, for_profile, for_recent, for_longterm, for_docs)
            .unwrap_or_else(|| TokenPlan::docs_only(max_total));

        tracing::debug!(
            max_total,
            for_query,
            for_profile,
            for_recent,
            for_longterm,
            for_docs = plan.for_docs(),
            "Token plan allocated"
        );
        plan
    }
}
