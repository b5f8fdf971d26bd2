//! Response cache
//!
//! Wraps any [`LlmBackend`] and memoizes completions by a SHA-256 fingerprint
//! of the full request. Entries are inserted once and never mutated, so a
//! turn cancelled mid-flight can never leave a half-written entry behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::backend::{FinishReason, GenerateRequest, GenerationResult, LlmBackend};
use crate::LlmError;

/// Cache hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Fingerprint-keyed, append-only completion cache
pub struct CachedBackend {
    inner: Arc<dyn LlmBackend>,
    entries: DashMap<String, String>,
    /// 0 means unbounded
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedBackend {
    pub fn new(inner: Arc<dyn LlmBackend>, capacity: usize) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn is_full(&self) -> bool {
        self.capacity > 0 && self.entries.len() >= self.capacity
    }
}

#[async_trait]
impl LlmBackend for CachedBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerationResult, LlmError> {
        let key = request.fingerprint(self.inner.model_name());

        if let Some(text) = self.entries.get(&key).map(|e| e.value().clone()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(key = %&key[..12], "LLM cache hit");
            return Ok(GenerationResult {
                text,
                tokens: 0,
                total_time_ms: 0,
                finish_reason: FinishReason::Stop,
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.generate(request).await?;

        if !self.is_full() {
            // first writer wins; existing entries are never overwritten
            self.entries.entry(key).or_insert_with(|| result.text.clone());
        }

        Ok(result)
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
