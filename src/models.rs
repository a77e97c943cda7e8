use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A bounded span of a document's text, optionally paired with a generated
/// "context" string situating it within the whole document.
///
/// Produced by the chunker; embeddings are attached afterwards by the
/// embedding pass. Immutable once scored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A chunk with similarity scores attached by the retrieval pipeline.
///
/// `reranked_score` is present only if the reranking stage ran.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    pub content_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_score: Option<f32>,
    pub combined_score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranked_score: Option<f32>,
}

impl ScoredChunk {
    /// Ordering key: the reranked score when present, else the combined score.
    pub fn sort_key(&self) -> f32 {
        self.reranked_score.unwrap_or(self.combined_score)
    }
}

/// What a model is loaded for. Part of the resource cache key; determines
/// which operations the loaded resource can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Chat,
    Embedding,
    Reranker,
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelKind::Chat => write!(f, "chat"),
            ModelKind::Embedding => write!(f, "embedding"),
            ModelKind::Reranker => write!(f, "reranker"),
        }
    }
}

/// A single chat turn (user or assistant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

// ─── Request / response types ────────────────────────────

/// Chunk-only request: split text, optionally generate situating contexts.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRequest {
    pub text: String,
    #[serde(flatten)]
    pub options: crate::chunking::ChunkOptions,
    /// Chat model used for context generation; falls back to the configured
    /// default when omitted.
    pub context_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub chunks: Vec<Chunk>,
}

/// Embed request: augment the given chunks with embedding vectors.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbedRequest {
    pub chunks: Vec<Chunk>,
    /// Embedding model; falls back to the configured default when omitted.
    pub embedding_model: Option<String>,
}

/// Ingest request: chunk, situate, embed, and persist a document.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub text: String,
    #[serde(flatten)]
    pub options: crate::chunking::ChunkOptions,
    /// Identifier for the stored document; generated when omitted.
    pub document_id: Option<Uuid>,
    pub context_model: Option<String>,
    pub embedding_model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub document_id: Uuid,
    pub chunk_count: usize,
}

/// Retrieval over caller-provided candidates.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
    pub candidates: Vec<Chunk>,
    pub embedding_model: Option<String>,
    pub reranker_model: Option<String>,
    #[serde(default = "default_retrieve_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default = "default_true")]
    pub should_rerank: bool,
}

/// Retrieval over the persisted chunk store.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub embedding_model: Option<String>,
    pub reranker_model: Option<String>,
    #[serde(default = "default_search_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub threshold: f32,
    #[serde(default = "default_true")]
    pub should_rerank: bool,
}

fn default_retrieve_top_k() -> usize {
    4
}

fn default_search_top_k() -> usize {
    3
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub results: Vec<ScoredChunk>,
    pub reranked: bool,
}

/// Explicit model load request.
#[derive(Debug, Clone, Deserialize)]
pub struct LoadModelRequest {
    pub name: String,
    pub kind: ModelKind,
}

/// One entry in the resource listing.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub name: String,
    pub kind: ModelKind,
    /// False while a load for this key is still in flight.
    pub loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_serializes_to_snake_case() {
        let json = serde_json::to_value(ModelKind::Embedding).unwrap();
        assert_eq!(json, "embedding");
    }

    #[test]
    fn test_model_kind_round_trips() {
        let json = serde_json::to_string(&ModelKind::Reranker).unwrap();
        let back: ModelKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ModelKind::Reranker);
    }

    #[test]
    fn test_chunk_optional_fields_default_to_none() {
        let chunk: Chunk = serde_json::from_str(r#"{"content":"hello"}"#).unwrap();
        assert_eq!(chunk.content, "hello");
        assert!(chunk.context.is_none());
        assert!(chunk.content_embedding.is_none());
        assert!(chunk.metadata.is_empty());
    }

    #[test]
    fn test_retrieve_request_defaults() {
        let req: RetrieveRequest =
            serde_json::from_str(r#"{"query":"q","candidates":[]}"#).unwrap();
        assert_eq!(req.top_k, 4);
        assert_eq!(req.threshold, 0.0);
        assert!(req.should_rerank);
    }

    #[test]
    fn test_search_request_defaults() {
        let req: SearchRequest = serde_json::from_str(r#"{"query":"q"}"#).unwrap();
        assert_eq!(req.top_k, 3);
        assert!(req.should_rerank);
    }

    #[test]
    fn test_sort_key_prefers_reranked_score() {
        let chunk: Chunk = serde_json::from_str(r#"{"content":"c"}"#).unwrap();
        let mut scored = ScoredChunk {
            chunk,
            content_score: 0.5,
            context_score: None,
            combined_score: 0.5,
            reranked_score: None,
        };
        assert_eq!(scored.sort_key(), 0.5);
        scored.reranked_score = Some(0.9);
        assert_eq!(scored.sort_key(), 0.9);
    }
}
