//! Refine strategy registry
//!
//! Maps a configuration string to a strategy factory. An unknown name is the
//! one configuration value that auto-recovers: it logs a warning and builds
//! the corrective strategy.

use std::collections::HashMap;
use std::sync::Arc;

use medirag_config::RefineConfig;

use super::strategy::{BasicStrategy, CorrectiveStrategy, RefineStrategy};
use crate::evaluator::QualityEvaluator;
use crate::rewriter::QueryRewriter;

/// Collaborators a strategy may be built from
#[derive(Clone)]
pub struct StrategyDeps {
    pub evaluator: Arc<QualityEvaluator>,
    pub rewriter: Arc<QueryRewriter>,
    pub config: RefineConfig,
}

type StrategyFactory = Box<dyn Fn(&StrategyDeps) -> Arc<dyn RefineStrategy> + Send + Sync>;

const CORRECTIVE: &str = "corrective";

/// Registry of refine strategy factories keyed by lowercase name
pub struct StrategyRegistry {
    factories: HashMap<String, StrategyFactory>,
}

impl StrategyRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// `basic` (aliases `disabled`, `none`) and `corrective`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for name in ["basic", "disabled", "none"] {
            registry.register(name, |_| Arc::new(BasicStrategy) as Arc<dyn RefineStrategy>);
        }
        registry.register(CORRECTIVE, corrective);
        registry
    }

    /// Register a factory, replacing any previous one under the same name
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&StrategyDeps) -> Arc<dyn RefineStrategy> + Send + Sync + 'static,
    {
        self.factories.insert(name.trim().to_lowercase(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.trim().to_lowercase())
    }

    /// Sorted registered names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the strategy named `name`; unknown names fall back to corrective
    pub fn create(&self, name: &str, deps: &StrategyDeps) -> Arc<dyn RefineStrategy> {
        let key = name.trim().to_lowercase();
        if let Some(factory) = self.factories.get(&key) {
            return factory(deps);
        }

        tracing::warn!(strategy = %name, fallback = CORRECTIVE, "Unknown refine strategy");
        match self.factories.get(CORRECTIVE) {
            Some(factory) => factory(deps),
            None => corrective(deps),
        }
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn corrective(deps: &StrategyDeps) -> Arc<dyn RefineStrategy> {
    Arc::new(CorrectiveStrategy::new(
        deps.evaluator.clone(),
        deps.rewriter.clone(),
        &deps.config,
    ))
}
