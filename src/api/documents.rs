use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::error_response;
use crate::chunking;
use crate::models::{
    Chunk, ChunkRequest, ChunkResponse, EmbedRequest, IngestRequest, IngestResponse, ModelKind,
};
use crate::retrieval::embed_chunks;
use crate::state::AppState;

/// POST /api/chunk — split a document into overlapping chunks, optionally
/// generating a situating context per chunk.
pub async fn chunk(
    State(state): State<AppState>,
    Json(req): Json<ChunkRequest>,
) -> Result<Json<ChunkResponse>, (StatusCode, String)> {
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Text is required".to_string()));
    }

    let chunks = process_chunks(&state, &req.text, &req.options, req.context_model.as_deref())
        .await
        .map_err(error_response)?;

    Ok(Json(ChunkResponse { chunks }))
}

/// POST /api/embed — attach embedding vectors to the given chunks.
pub async fn embed(
    State(state): State<AppState>,
    Json(req): Json<EmbedRequest>,
) -> Result<Json<ChunkResponse>, (StatusCode, String)> {
    let model = req
        .embedding_model
        .unwrap_or_else(|| state.config.llm.embedding_model.clone());

    let mut chunks = req.chunks;
    embed_chunks(&state.resources, &model, &mut chunks)
        .await
        .map_err(error_response)?;

    Ok(Json(ChunkResponse { chunks }))
}

/// POST /api/documents — full ingest: chunk, situate, embed, persist.
/// Nothing is stored unless every chunk made it through the whole pipeline.
pub async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, (StatusCode, String)> {
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Text is required".to_string()));
    }

    let mut chunks = process_chunks(&state, &req.text, &req.options, req.context_model.as_deref())
        .await
        .map_err(error_response)?;

    let embedding_model = req
        .embedding_model
        .unwrap_or_else(|| state.config.llm.embedding_model.clone());
    embed_chunks(&state.resources, &embedding_model, &mut chunks)
        .await
        .map_err(error_response)?;

    let document_id = req.document_id.unwrap_or_else(Uuid::new_v4);
    let chunk_count = state
        .store
        .add_document(document_id, chunks)
        .map_err(error_response)?;

    tracing::info!("Ingested document {document_id} ({chunk_count} chunks)");
    Ok(Json(IngestResponse {
        document_id,
        chunk_count,
    }))
}

/// DELETE /api/documents/{id} — drop a document's chunks from the store.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let removed = state.store.delete_document(&id).map_err(error_response)?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Unknown document: {id}")))
    }
}

/// Chunk `text` and, when asked, situate each chunk with the chat model.
async fn process_chunks(
    state: &AppState,
    text: &str,
    options: &chunking::ChunkOptions,
    context_model: Option<&str>,
) -> crate::error::Result<Vec<Chunk>> {
    let mut chunks = chunking::chunk_text(text, options)?;

    if options.generate_context && !chunks.is_empty() {
        let model = context_model.unwrap_or(&state.config.llm.chat_model);
        let chat = state.resources.acquire(model, ModelKind::Chat).await?;
        chunking::context::generate_contexts(&chat, text, &mut chunks).await?;
    }

    Ok(chunks)
}
