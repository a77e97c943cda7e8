use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::error_response;
use crate::models::{ModelKind, RetrieveRequest, RetrieveResponse, SearchRequest};
use crate::retrieval::{self, RetrievalOptions};
use crate::state::AppState;

/// POST /api/retrieve — two-stage retrieval over candidates supplied in the
/// request body:
///   1. Prefilter: combined vector similarity, threshold, top-k
///   2. Optional cross-encoder rerank of the survivors
pub async fn retrieve(
    State(state): State<AppState>,
    Json(req): Json<RetrieveRequest>,
) -> Result<Json<RetrieveResponse>, (StatusCode, String)> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }

    let options = resolve_options(
        &state,
        req.embedding_model,
        req.reranker_model,
        req.top_k,
        req.threshold,
        req.should_rerank,
    );

    let results = retrieval::retrieve(&state.resources, &query, req.candidates, &options)
        .await
        .map_err(error_response)?;

    let reranked = results.iter().any(|r| r.reranked_score.is_some());
    Ok(Json(RetrieveResponse {
        query,
        results,
        reranked,
    }))
}

/// POST /api/search — same pipeline, but Stage 1 is delegated to the
/// persisted chunk store.
pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<RetrieveResponse>, (StatusCode, String)> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Query is required".to_string()));
    }

    let options = resolve_options(
        &state,
        req.embedding_model,
        req.reranker_model,
        req.top_k,
        req.threshold,
        req.should_rerank,
    );
    options.validate().map_err(error_response)?;

    // ── Stage 1: store-side prefilter ─────────────────────
    let embedder = state
        .resources
        .acquire(&options.embedding_model, ModelKind::Embedding)
        .await
        .map_err(error_response)?;
    let query_embedding = embedder.embed(&query).await.map_err(error_response)?;

    let mut results = state
        .store
        .search(&query_embedding, options.threshold, options.top_k)
        .map_err(error_response)?;

    // ── Stage 2: optional rerank ──────────────────────────
    if options.should_rerank && !results.is_empty() {
        let model = options.reranker_model.as_deref().ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "should_rerank requires a reranker model".to_string(),
            )
        })?;
        let reranker = state
            .resources
            .acquire(model, ModelKind::Reranker)
            .await
            .map_err(error_response)?;
        retrieval::rerank(&reranker, &query, &mut results)
            .await
            .map_err(error_response)?;
        results.truncate(options.top_k);
    }

    let reranked = results.iter().any(|r| r.reranked_score.is_some());
    Ok(Json(RetrieveResponse {
        query,
        results,
        reranked,
    }))
}

fn resolve_options(
    state: &AppState,
    embedding_model: Option<String>,
    reranker_model: Option<String>,
    top_k: usize,
    threshold: f32,
    should_rerank: bool,
) -> RetrievalOptions {
    RetrievalOptions {
        embedding_model: embedding_model
            .unwrap_or_else(|| state.config.llm.embedding_model.clone()),
        reranker_model: reranker_model.or_else(|| state.config.reranker.model.clone()),
        top_k,
        threshold,
        should_rerank,
    }
}
