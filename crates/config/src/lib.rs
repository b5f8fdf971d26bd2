//! Configuration management
//!
//! Supports loading configuration from:
//! - YAML/TOML files under `config/`
//! - Environment variables (`MEDIRAG__` prefix, `__` separator)
//! - Built-in defaults backed by [`constants`]

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, AuditConfig, BudgetConfig, CompressionConfig,
    EmbeddingConfig, IntentConfig, LexiconConfig, LlmProvider, LlmSettings, ObservabilityConfig,
    RefineConfig, RetrievalConfig, RuntimeEnvironment, ServerConfig, Settings, VectorBackend,
};

use thiserror::Error;

/// Loading or validation failure
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for medirag_core::Error {
    fn from(err: ConfigError) -> Self {
        medirag_core::Error::Config(err.to_string())
    }
}
