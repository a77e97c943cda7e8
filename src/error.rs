use axum::http::StatusCode;
use thiserror::Error;

use crate::models::ModelKind;

/// Errors surfaced by the retrieval core.
///
/// Every variant is a local-operation failure: it is reported to the
/// immediate caller and nothing is retried automatically. The HTTP layer
/// maps variants to status codes via [`Error::status`].
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input parameters (bad threshold range, overlap >= chunk
    /// size, missing required fields). Rejects the single request; no state
    /// is mutated.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The named model does not exist on the inference backend.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// A model was resolved but lacks the capability the operation needs,
    /// e.g. asking a chat resource to rank documents.
    #[error("Model '{model}' ({kind}) does not support {operation}")]
    UnsupportedCapability {
        model: String,
        kind: ModelKind,
        operation: &'static str,
    },

    /// Two vectors of unequal length were compared. Indicates embeddings
    /// from different models were mixed upstream; never coerced.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A per-chunk step (context generation or embedding) failed mid-batch.
    /// The whole batch is aborted; nothing is persisted for the document.
    #[error("Chunk {failed_index} failed during batch processing: {source}")]
    PartialBatch {
        failed_index: usize,
        #[source]
        source: Box<Error>,
    },

    /// Any other failure from an external collaborator (inference backend,
    /// storage, I/O).
    #[error(transparent)]
    Runtime(#[from] anyhow::Error),
}

impl Error {
    /// Status code the HTTP layer responds with for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidConfig(_) => StatusCode::BAD_REQUEST,
            Error::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Error::UnsupportedCapability { .. } => StatusCode::BAD_REQUEST,
            Error::DimensionMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::PartialBatch { .. } => StatusCode::BAD_GATEWAY,
            Error::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_maps_to_404() {
        let err = Error::ModelNotFound("nomic-embed-text".to_string());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_config_maps_to_400() {
        let err = Error::InvalidConfig("threshold out of range".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unsupported_capability_maps_to_400() {
        let err = Error::UnsupportedCapability {
            model: "llama3.2".to_string(),
            kind: ModelKind::Chat,
            operation: "rank",
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("llama3.2"));
        assert!(err.to_string().contains("rank"));
    }

    #[test]
    fn test_partial_batch_keeps_cause() {
        let err = Error::PartialBatch {
            failed_index: 3,
            source: Box::new(Error::ModelNotFound("m".to_string())),
        };
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("Chunk 3"));
    }
}
