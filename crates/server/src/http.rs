//! HTTP Endpoints
//!
//! REST API over the turn processor.

use std::time::Duration;

use axum::{
    extract::{Json, State},
    http::{HeaderValue, Method, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use medirag_agent::{IntentDecision, TurnRequest, TurnResponse};
use medirag_core::{EntitySlots, Turn};

use crate::state::AppState;
use crate::ServerError;

const LOCAL_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.settings.server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let timeout = Duration::from_secs(server.timeout_seconds);

    Router::new()
        .route("/api/ask", post(ask))
        .route("/api/classify", post(classify))
        .route("/api/retrievers", get(list_retrievers))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - disabled: permissive (development only)
/// - no origins configured: localhost:3000
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        if !origins.is_empty() {
            tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        }
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static(LOCAL_ORIGIN))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Answer one turn
async fn ask(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ServerError> {
    if request.query.trim().is_empty() {
        return Err(ServerError::InvalidRequest("query must not be empty".to_string()));
    }
    if let Some(route) = request.route.as_deref() {
        if !state.retrievers.contains(route) {
            tracing::debug!(route = %route, "Unknown route, default retriever will answer");
        }
    }

    Ok(Json(state.processor.process(&request).await))
}

#[derive(Debug, Deserialize)]
struct ClassifyRequest {
    query: String,
    #[serde(default)]
    history: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClassifyResponse {
    intent: IntentDecision,
    slots: EntitySlots,
}

/// Intent decision without answering
async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> Result<Json<ClassifyResponse>, ServerError> {
    if request.query.trim().is_empty() {
        return Err(ServerError::InvalidRequest("query must not be empty".to_string()));
    }

    let processor = &state.processor;
    let (intent, slots) = processor
        .classifier()
        .classify_query(&request.query, processor.extractor(), &request.history)
        .await;
    Ok(Json(ClassifyResponse { intent, slots }))
}

async fn list_retrievers(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "default": state.retrievers.default_label(),
        "labels": state.retrievers.labels(),
    }))
}

/// Liveness plus static component facts
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let settings = &state.settings;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.uptime_secs(),
        "model": state.llm.model_name(),
        "indexed_documents": state.indexed_documents,
        "refine_strategy": settings.refine.strategy,
        "compression": settings.compression.enabled,
    }))
}

/// Readiness: the text-generation service answers
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let llm_status = match tokio::time::timeout(Duration::from_secs(2), state.llm.is_available()).await {
        Ok(true) => "ok",
        Ok(false) => "unreachable",
        Err(_) => "timeout",
    };
    let retrievers_ok = !state.retrievers.is_empty();

    let ready = llm_status == "ok" && retrievers_ok;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": ready,
            "checks": {
                "llm": { "status": llm_status, "model": state.llm.model_name() },
                "retrievers": {
                    "status": if retrievers_ok { "ok" } else { "empty" },
                    "labels": state.retrievers.labels(),
                },
            },
        })),
    )
}
