//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use millwork_core::Error;
use serde_json::json;

/// Error returned by handlers. Renders as `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Status for a domain error. Boundary failures are a 502 here; sync
/// endpoints override that.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyProcessed(_) | Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::ExternalBoundary(_) => StatusCode::BAD_GATEWAY,
        Error::Database(_) | Error::Serialization(_) | Error::Config(_) | Error::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match status_for(&err) {
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::BAD_REQUEST => ApiError::BadRequest(message),
            StatusCode::FORBIDDEN => ApiError::Forbidden(message),
            StatusCode::CONFLICT => ApiError::Conflict(message),
            StatusCode::BAD_GATEWAY => ApiError::BadGateway(message),
            _ => {
                tracing::error!(error = %err, kind = err.kind(), "Request failed");
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// Error from a sync endpoint. Same status mapping as [`ApiError`] except
/// boundary failures, which are a 500, and the body is the sync envelope
/// `{"success": false, "error": message}`.
#[derive(Debug)]
pub struct SyncError(pub Error);

impl From<Error> for SyncError {
    fn from(err: Error) -> Self {
        SyncError(err)
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = match status_for(&self.0) {
            StatusCode::BAD_GATEWAY => StatusCode::INTERNAL_SERVER_ERROR,
            other => other,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!(error = %self.0, kind = self.0.kind(), "Sync request failed");
        }
        let body = Json(json!({
            "success": false,
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
