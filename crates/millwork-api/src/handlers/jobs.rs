//! Extraction job endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use millwork_core::{RequestContext, ScanOptions};

use crate::{ApiError, AppState};

/// Scan request. Omitted options take their defaults.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub project_ref: Option<i64>,
    pub force: Option<bool>,
    pub include_fixtures: Option<bool>,
    pub auto_approve_high_confidence: Option<bool>,
}

impl CreateJobRequest {
    pub fn options(&self) -> ScanOptions {
        let defaults = ScanOptions::default();
        ScanOptions {
            force: self.force.unwrap_or(defaults.force),
            include_fixtures: self.include_fixtures.unwrap_or(defaults.include_fixtures),
            auto_approve_high_confidence: self
                .auto_approve_high_confidence
                .unwrap_or(defaults.auto_approve_high_confidence),
        }
    }
}

/// Queue a document scan.
///
/// Returns at once. Without `force`, an active scan of the same project is
/// returned instead of starting a second one.
#[utoipa::path(post, path = "/extraction/jobs", tag = "Extraction",
    request_body = CreateJobRequest,
    responses((status = 202, description = "Job queued")))]
pub async fn create_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let handle = state
        .orchestrator
        .enqueue(&ctx, req.project_ref, req.options())
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "jobId": handle.job.id,
            "uuid": handle.job.uuid,
            "status": handle.job.status,
            "created": handle.created,
        })),
    ))
}

/// Job with its review items and summary.
#[utoipa::path(get, path = "/extraction/jobs/{id}", tag = "Extraction",
    params(("id" = i64, Path, description = "Job id")),
    responses((status = 200, description = "Job details"), (status = 404, description = "Not found")))]
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (job, reviews) = state.orchestrator.job_details(id).await?;
    let results = job.summary.clone();
    Ok(Json(json!({
        "job": job,
        "reviews": reviews,
        "results": results,
    })))
}
