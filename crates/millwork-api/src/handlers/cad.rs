//! Read-only CAD document endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::{ApiError, AppState};

/// Layers, groups and likely cabinet groups of the open document.
#[utoipa::path(get, path = "/cad/document", tag = "CAD",
    responses((status = 200, description = "Document summary"), (status = 502, description = "CAD tool unreachable")))]
pub async fn document(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = state.extractor.document_summary().await?;
    Ok(Json(json!(summary)))
}

/// Drawing views found from title text, grouped by kind.
#[utoipa::path(get, path = "/cad/views", tag = "CAD",
    responses((status = 200, description = "View analysis"), (status = 502, description = "CAD tool unreachable")))]
pub async fn views(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let analysis = state.extractor.analyze_views().await?;
    Ok(Json(json!(analysis)))
}
