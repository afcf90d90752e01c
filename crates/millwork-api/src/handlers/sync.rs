//! CAD / system-of-record sync endpoints.
//!
//! Push, pull and force answer with the sync envelope: `200 {success, details}`
//! or `500 {success: false, error}` when the CAD side could not be reached.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};

use millwork_core::{
    defaults, Error, PullOptions, RequestContext, SyncDirection, SyncOutcome,
};

use crate::{ApiError, AppState, SyncError};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushBody {
    /// Cabinet id.
    pub entity_ref: Option<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PullBody {
    pub project_ref: Option<i64>,
    pub auto_merge: Option<bool>,
    pub create_new: Option<bool>,
}

impl PullBody {
    pub fn options(&self) -> PullOptions {
        let defaults = PullOptions::default();
        PullOptions {
            auto_merge: self.auto_merge.unwrap_or(defaults.auto_merge),
            create_new: self.create_new.unwrap_or(defaults.create_new),
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForceBody {
    pub review_id: Option<i64>,
    /// `erp` or `rhino` (`cad` is accepted too).
    pub direction: Option<String>,
}

impl ForceBody {
    /// Review id and direction. Neither is ever inferred.
    pub fn parse(&self) -> Result<(i64, SyncDirection), Error> {
        let review_id = self
            .review_id
            .ok_or_else(|| Error::Validation("reviewId is required".to_string()))?;
        let direction = self
            .direction
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| Error::Validation("direction is required".to_string()))?
            .to_ascii_lowercase()
            .parse::<SyncDirection>()?;
        Ok((review_id, direction))
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProjectQuery {
    pub project_ref: Option<i64>,
    pub limit: Option<i64>,
}

fn envelope(outcome: SyncOutcome) -> (StatusCode, Json<SyncOutcome>) {
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(outcome))
}

/// Write a cabinet's dimensions to its CAD group.
#[utoipa::path(post, path = "/sync/push", tag = "Sync",
    request_body = PushBody,
    responses((status = 200, body = SyncOutcome), (status = 409, description = "Open sync conflict"), (status = 500, body = SyncOutcome)))]
pub async fn push(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<PushBody>,
) -> Result<(StatusCode, Json<SyncOutcome>), SyncError> {
    let cabinet_id = body
        .entity_ref
        .ok_or_else(|| Error::Validation("entityRef is required".to_string()))?;
    let outcome = state.sync.push(&ctx, cabinet_id).await?;
    Ok(envelope(outcome))
}

/// Reconcile CAD state into the system of record.
#[utoipa::path(post, path = "/sync/pull", tag = "Sync",
    request_body = PullBody,
    responses((status = 200, body = SyncOutcome), (status = 500, body = SyncOutcome)))]
pub async fn pull(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<PullBody>,
) -> Result<(StatusCode, Json<SyncOutcome>), SyncError> {
    let project_id = body
        .project_ref
        .ok_or_else(|| Error::Validation("projectRef is required".to_string()))?;
    let outcome = state.sync.pull(&ctx, Some(project_id), body.options()).await?;
    Ok(envelope(outcome))
}

/// Resolve a sync conflict review in favour of one side.
#[utoipa::path(post, path = "/sync/force", tag = "Sync",
    request_body = ForceBody,
    responses((status = 200, body = SyncOutcome), (status = 400, description = "Missing direction or not a conflict"), (status = 500, body = SyncOutcome)))]
pub async fn force(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(body): Json<ForceBody>,
) -> Result<(StatusCode, Json<SyncOutcome>), SyncError> {
    let (review_id, direction) = body.parse()?;
    let outcome = state.sync.force(&ctx, review_id, direction).await?;
    Ok(envelope(outcome))
}

#[utoipa::path(get, path = "/sync/status", tag = "Sync",
    params(ProjectQuery),
    responses((status = 200, description = "Sync overview")))]
pub async fn status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.sync.status(&ctx, query.project_ref).await?;
    Ok(Json(json!(status)))
}

/// Sync audit log, newest first.
#[utoipa::path(get, path = "/sync/history", tag = "Sync",
    params(ProjectQuery),
    responses((status = 200, description = "Sync events")))]
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<ProjectQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(defaults::PAGE_LIMIT)
        .clamp(1, defaults::PAGE_LIMIT_MAX);
    let events = state.sync.history(query.project_ref, limit).await?;
    Ok(Json(json!({ "data": events })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_requires_direction() {
        let body = ForceBody {
            review_id: Some(3),
            direction: None,
        };
        assert!(matches!(body.parse(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_force_accepts_rhino_alias() {
        let body: ForceBody =
            serde_json::from_str(r#"{"reviewId": 3, "direction": "Rhino"}"#).unwrap();
        assert_eq!(body.parse().unwrap(), (3, SyncDirection::Cad));
    }

    #[test]
    fn test_pull_defaults() {
        let body: PullBody = serde_json::from_str(r#"{"projectRef": 2}"#).unwrap();
        assert_eq!(body.options(), PullOptions::default());
    }
}
