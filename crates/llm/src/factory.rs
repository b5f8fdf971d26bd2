//! Backend construction from settings

use std::sync::Arc;

use medirag_config::{LlmProvider, LlmSettings};

use crate::backend::{LlmBackend, LlmConfig, OllamaBackend, OpenAIBackend};
use crate::cache::CachedBackend;
use crate::LlmError;

/// Create the configured backend, wrapped in a response cache when enabled
pub fn create_backend(settings: &LlmSettings) -> Result<Arc<dyn LlmBackend>, LlmError> {
    let config = LlmConfig::from_settings(settings);

    let backend: Arc<dyn LlmBackend> = match settings.provider {
        LlmProvider::Ollama => Arc::new(OllamaBackend::new(config)?),
        LlmProvider::OpenAi => Arc::new(OpenAIBackend::new(config)?),
    };

    tracing::info!(
        provider = ?settings.provider,
        model = %settings.model,
        endpoint = %settings.resolved_endpoint(),
        cache = settings.cache_enabled,
        "LLM backend created"
    );

    if settings.cache_enabled {
        Ok(Arc::new(CachedBackend::new(backend, settings.cache_capacity)))
    } else {
        Ok(backend)
    }
}
