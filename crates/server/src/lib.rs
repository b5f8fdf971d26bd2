//! MediRAG Server
//!
//! HTTP surface over the turn processor.

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use medirag_agent::AgentError;
use medirag_config::ConfigError;
use medirag_rag::RagError;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Retrieval error: {0}")]
    Rag(#[from] RagError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<&ServerError> for StatusCode {
    fn from(err: &ServerError) -> Self {
        match err {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Startup(_)
            | ServerError::Config(_)
            | ServerError::Rag(_)
            | ServerError::Agent(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from(&self);
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
