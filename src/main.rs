use axum::routing::{delete, get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use context_retrieval::api;
use context_retrieval::config::Config;
use context_retrieval::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    if let Some(url) = &config.reranker.base_url {
        tracing::info!("Reranker sidecar: {url}");
    }

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/chunk", post(api::documents::chunk))
        .route("/api/embed", post(api::documents::embed))
        .route("/api/documents", post(api::documents::ingest))
        .route("/api/documents/{id}", delete(api::documents::delete_document))
        .route("/api/retrieve", post(api::search::retrieve))
        .route("/api/search", post(api::search::search))
        .route("/api/models", get(api::models::list_models))
        .route("/api/models", post(api::models::load_model))
        .route("/api/models/{name}", delete(api::models::release_model))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the idle sweeper before the runtime goes away.
    state.resources.stop_sweeper();
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}
