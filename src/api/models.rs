use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::error_response;
use crate::models::{LoadModelRequest, ResourceStatus};
use crate::state::AppState;

/// GET /api/models — list cached model resources and their load state.
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ResourceStatus>> {
    Json(state.resources.list())
}

/// POST /api/models — load a model eagerly instead of on first use.
pub async fn load_model(
    State(state): State<AppState>,
    Json(req): Json<LoadModelRequest>,
) -> Result<(StatusCode, Json<ResourceStatus>), (StatusCode, String)> {
    if req.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Model name is required".to_string()));
    }

    let resource = state
        .resources
        .acquire(&req.name, req.kind)
        .await
        .map_err(error_response)?;

    Ok((
        StatusCode::CREATED,
        Json(ResourceStatus {
            name: resource.name.clone(),
            kind: resource.kind,
            loaded: true,
        }),
    ))
}

/// DELETE /api/models/{name} — dispose a model regardless of idle time.
pub async fn release_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.resources.release(&name).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Model not loaded: {name}")))
    }
}
