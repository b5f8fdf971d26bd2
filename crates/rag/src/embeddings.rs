//! Ollama Embeddings
//!
//! Query and document embeddings via Ollama's `/api/embed` endpoint. Every
//! vector is checked against the configured dimension before it reaches an
//! index.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use medirag_config::EmbeddingConfig;
use medirag_core::Embedder;

use crate::RagError;

#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dimension: usize,
    pub timeout: Duration,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        use medirag_config::constants::{endpoints, llm, rag, timeouts};
        Self {
            endpoint: endpoints::OLLAMA_DEFAULT.to_string(),
            model: llm::EMBEDDING_MODEL.to_string(),
            dimension: rag::EMBEDDING_DIM,
            timeout: Duration::from_millis(timeouts::EMBED_MS),
        }
    }
}

impl OllamaEmbeddingConfig {
    pub fn from_settings(settings: &EmbeddingConfig) -> Self {
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            dimension: settings.dimension,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbeddingConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Embed several texts in one request
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest {
            model: &self.config.model,
            input: texts.to_vec(),
        };
        let url = format!("{}/api/embed", self.config.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("Ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "Ollama embedding failed: {} - {}",
                status, text
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        self.validate(parsed.embeddings, texts.len())
    }

    fn validate(&self, embeddings: Vec<Vec<f32>>, expected: usize) -> Result<Vec<Vec<f32>>, RagError> {
        if embeddings.len() != expected {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                expected,
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.config.dimension) {
            return Err(RagError::Embedding(format!(
                "Model {} returned dimension {}, configured {}",
                self.config.model,
                bad.len(),
                self.config.dimension
            )));
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> medirag_core::Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text]).await?;
        batch
            .pop()
            .ok_or_else(|| medirag_core::Error::Embedding("No embedding returned".to_string()))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(dimension: usize) -> OllamaEmbedder {
        OllamaEmbedder::new(OllamaEmbeddingConfig {
            dimension,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_request_shape() {
        let request = EmbedRequest {
            model: "nomic-embed-text",
            input: vec!["고혈압"],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["input"][0], "고혈압");
    }

    #[test]
    fn test_response_parsing() {
        let parsed: EmbedResponse =
            serde_json::from_str(r#"{"model":"m","embeddings":[[0.1,0.2,0.3]]}"#).unwrap();
        assert_eq!(parsed.embeddings[0].len(), 3);
    }

    #[test]
    fn test_validate_dimension_and_count() {
        let e = embedder(3);
        assert!(e.validate(vec![vec![0.0; 3]], 1).is_ok());
        assert!(e.validate(vec![vec![0.0; 4]], 1).is_err());
        assert!(e.validate(vec![], 1).is_err());
    }

    #[test]
    fn test_from_settings_trims_endpoint() {
        let settings = EmbeddingConfig {
            endpoint: "http://ollama:11434/".to_string(),
            ..Default::default()
        };
        let config = OllamaEmbeddingConfig::from_settings(&settings);
        assert_eq!(config.endpoint, "http://ollama:11434");
    }
}
