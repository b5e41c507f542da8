//! Reading Copilot Server
//!
//! Serves PDF documents, manual highlights and auto-highlight runs that
//! mark the passages most relevant to a reader's profile and goal.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reading_copilot_server::annotations::SqliteDocumentStore;
use reading_copilot_server::chunker::Chunker;
use reading_copilot_server::config::Config;
use reading_copilot_server::documents::DocumentStore;
use reading_copilot_server::engine::RunEngine;
use reading_copilot_server::extraction::{LineCache, MupdfLineSource};
use reading_copilot_server::registry::RunRegistry;
use reading_copilot_server::routes;
use reading_copilot_server::scorer::build_scorer;
use reading_copilot_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "reading_copilot_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Starting Reading Copilot Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        batch_size = config.engine.batch_size,
        concurrency = config.engine.scoring_concurrency,
        threshold = config.engine.min_threshold,
        "Auto-highlight engine settings"
    );

    // Initialize database
    let persistence = SqliteDocumentStore::connect(&config.database.url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    tracing::info!("Database initialized at {}", config.database.url);

    let documents = DocumentStore::load(Arc::new(persistence))
        .await
        .context("Failed to load documents")?;

    let lines = LineCache::with_capacity(
        Arc::new(MupdfLineSource::new()),
        config.extraction.cache_capacity,
        config.extraction.timeout_secs,
    );

    let engine = RunEngine::new(
        documents.clone(),
        lines.clone(),
        build_scorer(&config.scorer),
        Chunker::new(config.chunker),
        config.engine.clone(),
    );
    if let Some(dir) = &config.engine.log_dir {
        tracing::info!("Run reports will be written to {}", dir.display());
    }

    let registry = RunRegistry::new(engine, config.registry.clone());
    let _cleanup = registry.clone().start_cleanup_task();

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;

    let app = routes::app(AppState::new(config, documents, lines, registry));

    // Start server with graceful shutdown
    tracing::info!("Reading Copilot Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
