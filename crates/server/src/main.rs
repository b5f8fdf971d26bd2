//! MediRAG Server Entry Point

use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use medirag_config::{load_settings, ObservabilityConfig, Settings};
use medirag_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("MEDIRAG_ENV").ok();
    // Tracing is configured from settings, so load failures go to stderr
    let settings = load_settings(env.as_deref()).unwrap_or_else(|e| {
        eprintln!("medirag: configuration not loaded ({e}), using built-in defaults");
        Settings::default()
    });
    settings.validate()?;

    init_tracing(&settings.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "medirag starting");
    tracing::info!(
        environment = ?settings.environment,
        profile = env.as_deref().unwrap_or("default"),
        strategy = %settings.refine.strategy,
        "Configuration loaded"
    );

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let state = AppState::build(settings).await?;
    tracing::info!(
        documents = state.indexed_documents,
        retrievers = ?state.retrievers.labels(),
        "Initialized application state"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Stopped");
    Ok(())
}

/// Resolves on the first of Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires; the other one still does.
async fn shutdown_signal() {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => "interrupt",
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for interrupt");
                std::future::pending().await
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                "terminate"
            },
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending().await
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<&str>();

    let signal = tokio::select! {
        name = interrupt => name,
        name = terminate => name,
    };
    tracing::info!(signal, "Shutting down, draining in-flight requests");
}

/// Console or JSON log lines, filtered by `RUST_LOG` when set
fn init_tracing(config: &ObservabilityConfig) {
    let level = config.log_level.as_str();
    let default_filter = ["medirag", "medirag_server", "medirag_agent", "medirag_rag", "medirag_llm"]
        .iter()
        .map(|target| format!("{target}={level}"))
        .chain(std::iter::once("tower_http=debug".to_string()))
        .collect::<Vec<_>>()
        .join(",");
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let output = if config.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };
    tracing_subscriber::registry().with(filter).with(output).init();
}
