//! Axum HTTP handlers for the retrieval service.

pub mod documents;
pub mod models;
pub mod search;

use axum::http::StatusCode;

use crate::error::Error;

/// Map a core error to an HTTP response: the status from the error taxonomy
/// plus the display message as the body.
pub(crate) fn error_response(err: Error) -> (StatusCode, String) {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!("Request failed: {err}");
    }
    (status, err.to_string())
}
