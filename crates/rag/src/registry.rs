//! Process-scoped retriever handles keyed by routing label
//!
//! Handles are registered once at startup and shared read-only by concurrent
//! turns. Registration is append-only; an existing label is never replaced.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::retriever::HybridRetriever;
use crate::RagError;

pub struct RetrieverRegistry {
    default_label: String,
    retrievers: RwLock<HashMap<String, Arc<HybridRetriever>>>,
}

impl RetrieverRegistry {
    pub fn new(default_label: impl Into<String>) -> Self {
        Self {
            default_label: default_label.into(),
            retrievers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a retriever under `label`
    pub fn register(&self, label: impl Into<String>, retriever: Arc<HybridRetriever>) -> Result<(), RagError> {
        let label = label.into();
        let mut guard = self.retrievers.write();
        if guard.contains_key(&label) {
            return Err(RagError::Config(format!("retriever '{}' already registered", label)));
        }
        tracing::info!(label = %label, "Registered retriever");
        guard.insert(label, retriever);
        Ok(())
    }

    /// Retriever for `label`, or the default route when absent/unknown
    pub fn get(&self, label: Option<&str>) -> Option<Arc<HybridRetriever>> {
        let guard = self.retrievers.read();
        if let Some(label) = label {
            if let Some(r) = guard.get(label) {
                return Some(Arc::clone(r));
            }
            tracing::debug!(label = %label, "Unknown retriever label, using default");
        }
        guard.get(&self.default_label).cloned()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.retrievers.read().contains_key(label)
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.retrievers.read().keys().cloned().collect();
        labels.sort();
        labels
    }

    pub fn is_empty(&self) -> bool {
        self.retrievers.read().is_empty()
    }
}
