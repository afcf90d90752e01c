//! Review queue endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use millwork_core::{
    defaults, DimensionSet, Error, InterpretationResult, RequestContext, ReviewFilter,
    ReviewStatus, ReviewType,
};
use millwork_review::ApproveRequest;

use crate::{ApiError, AppState, ListResponse};

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Queue filter. `status=all` lists every status; the default is `pending`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ReviewQueueQuery {
    pub status: Option<String>,
    pub project_ref: Option<i64>,
    pub review_type: Option<String>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    /// Newest review per project and group only.
    pub dedupe: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ReviewQueueQuery {
    pub fn into_filter(self) -> Result<ReviewFilter, Error> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") => Some(ReviewStatus::Pending),
            Some("all") => None,
            Some(s) => Some(s.parse::<ReviewStatus>()?),
        };
        let review_type = match self.review_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(s.parse::<ReviewType>()?),
        };
        Ok(ReviewFilter {
            status,
            project_id: self.project_ref,
            review_type,
            min_confidence: self.min_confidence,
            max_confidence: self.max_confidence,
            dedupe: self.dedupe.unwrap_or(false),
            limit: self.limit.unwrap_or(defaults::PAGE_LIMIT),
            offset: self.offset.unwrap_or(defaults::PAGE_OFFSET),
        })
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    pub corrections: Option<DimensionSet>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveInterpretationBody {
    #[schema(value_type = Object)]
    pub interpretation: InterpretationResult,
    #[serde(default)]
    pub auto_apply: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterpretBody {
    #[serde(default)]
    pub auto_apply: bool,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// Paged review queue.
#[utoipa::path(get, path = "/extraction/review-queue", tag = "Review",
    params(ReviewQueueQuery),
    responses((status = 200, description = "Page of reviews"), (status = 400, description = "Invalid filter")))]
pub async fn list_reviews(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ReviewQueueQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let filter = query.into_filter()?;
    let page = state.reviews.list(&ctx, filter).await?;
    let response = ListResponse::new(
        page.items,
        page.total.max(0) as usize,
        page.limit.max(0) as usize,
        page.offset.max(0) as usize,
    );
    Ok(Json(json!(response)))
}

#[utoipa::path(get, path = "/extraction/review/{id}", tag = "Review",
    params(("id" = i64, Path, description = "Review id")),
    responses((status = 200, description = "Review"), (status = 404, description = "Not found")))]
pub async fn get_review(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let review = state.reviews.get(&ctx, id).await?;
    Ok(Json(json!({ "review": review })))
}

/// Approve a pending review, materializing its cabinet.
#[utoipa::path(post, path = "/extraction/review/{id}/approve", tag = "Review",
    params(("id" = i64, Path, description = "Review id")),
    request_body = ApproveBody,
    responses((status = 200, description = "Approved"), (status = 400, description = "Not pending or invalid corrections")))]
pub async fn approve_review(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
    Json(body): Json<ApproveBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = ApproveRequest {
        corrections: body.corrections,
        notes: body.notes,
        ..Default::default()
    };
    let review = state.reviews.approve(&ctx, id, request).await?;
    Ok(Json(json!({ "review": review })))
}

#[utoipa::path(post, path = "/extraction/review/{id}/reject", tag = "Review",
    params(("id" = i64, Path, description = "Review id")),
    request_body = RejectBody,
    responses((status = 200, description = "Rejected"), (status = 400, description = "Not pending or missing reason")))]
pub async fn reject_review(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
    Json(body): Json<RejectBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let review = state.reviews.reject(&ctx, id, &body.reason).await?;
    Ok(Json(json!({ "review": review })))
}

/// Prepared prompt and payload for an external reasoning actor.
#[utoipa::path(get, path = "/extraction/review/{id}/interpretation-context", tag = "Review",
    params(("id" = i64, Path, description = "Review id")),
    responses((status = 200, description = "Interpretation context")))]
pub async fn interpretation_context(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let context = state.reviews.interpretation_context(&ctx, id).await?;
    Ok(Json(json!({ "context": context })))
}

/// Merge an externally produced interpretation into a review.
#[utoipa::path(post, path = "/extraction/review/{id}/save-interpretation", tag = "Review",
    params(("id" = i64, Path, description = "Review id")),
    request_body = SaveInterpretationBody,
    responses((status = 200, description = "Interpretation saved")))]
pub async fn save_interpretation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
    Json(body): Json<SaveInterpretationBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let saved = state
        .reviews
        .save_interpretation(&ctx, id, body.interpretation, body.auto_apply)
        .await?;
    Ok(Json(json!({
        "review": saved.review,
        "autoApplied": saved.auto_applied,
    })))
}

/// Interpret a review in the background. The result is saved to the review.
#[utoipa::path(post, path = "/extraction/review/{id}/interpret", tag = "Review",
    params(("id" = i64, Path, description = "Review id")),
    request_body = InterpretBody,
    responses((status = 202, description = "Interpretation started")))]
pub async fn request_interpretation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<i64>,
    body: Option<Json<InterpretBody>>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let auto_apply = body.map(|Json(b)| b.auto_apply).unwrap_or(false);
    // Detached; the task saves its own result.
    let _task = state
        .reviews
        .request_interpretation(&ctx, id, auto_apply)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "reviewId": id,
            "status": "interpreting",
            "autoApply": auto_apply,
        })),
    ))
}
