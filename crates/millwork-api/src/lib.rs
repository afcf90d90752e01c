//! # millwork-api
//!
//! HTTP surface for cabinet extraction, the review queue and CAD sync.
//!
//! The binary in `main.rs` wires real backends; [`router`] is usable on its
//! own with any [`AppState`], which is how the integration tests drive it.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, Method};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::{Config, SwaggerUi};
use uuid::Uuid;

use millwork_cad::DataExtractor;
use millwork_core::{defaults, ConfidenceScorer};
use millwork_db::Stores;
use millwork_inference::DimensionInterpreter;
use millwork_jobs::ExtractionOrchestrator;
use millwork_review::ReviewQueue;
use millwork_sync::SyncService;

pub use config::AppConfig;
pub use error::{ApiError, SyncError};

use handlers::{cad, jobs, reviews, sync};

// =============================================================================
// STATE
// =============================================================================

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ExtractionOrchestrator>,
    pub reviews: Arc<ReviewQueue>,
    pub sync: Arc<SyncService>,
    pub extractor: Arc<DataExtractor>,
}

impl AppState {
    /// Build every service over the same stores and CAD document. The
    /// scoring policy is shared so scans, reviews and pulls grade alike.
    pub fn new(
        stores: &Stores,
        extractor: Arc<DataExtractor>,
        interpreter: Arc<DimensionInterpreter>,
        config: &AppConfig,
    ) -> Self {
        let scorer = ConfidenceScorer::new(config.scoring.clone());
        let orchestrator = ExtractionOrchestrator::new(stores, extractor.clone())
            .with_scorer(scorer.clone())
            .with_job_timeout(Duration::from_secs(config.worker.job_timeout_secs));
        let reviews = ReviewQueue::new(stores, interpreter)
            .with_scorer(scorer.clone())
            .with_config(config.review);
        let sync = SyncService::new(stores, extractor.clone())
            .with_scorer(scorer)
            .with_config(config.sync);
        Self {
            orchestrator: Arc::new(orchestrator),
            reviews: Arc::new(reviews),
            sync: Arc::new(sync),
            extractor,
        }
    }
}

// =============================================================================
// STANDARD RESPONSE TYPES
// =============================================================================

/// Pagination metadata for list responses.
#[derive(Serialize, Deserialize, Debug)]
pub struct PaginationMeta {
    /// Items matching the query across all pages
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    /// True if more items are available after this page
    pub has_more: bool,
}

/// `{"data": [...], "pagination": {...}}`
#[derive(Serialize, Deserialize, Debug)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> ListResponse<T> {
    /// `has_more` is derived from offset, page length and total.
    pub fn new(data: Vec<T>, total: usize, limit: usize, offset: usize) -> Self {
        let has_more = offset + data.len() < total;
        Self {
            data,
            pagination: PaginationMeta {
                total,
                limit,
                offset,
                has_more,
            },
        }
    }
}

// =============================================================================
// OPENAPI
// =============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Millwork Extraction API",
        description = "Cabinet extraction from CAD drawings, human review, and CAD / ERP sync"
    ),
    paths(
        jobs::create_job,
        jobs::get_job,
        reviews::list_reviews,
        reviews::get_review,
        reviews::approve_review,
        reviews::reject_review,
        reviews::interpretation_context,
        reviews::save_interpretation,
        reviews::request_interpretation,
        sync::push,
        sync::pull,
        sync::force,
        sync::status,
        sync::history,
        cad::document,
        cad::views,
        health_check,
    ),
    components(schemas(
        jobs::CreateJobRequest,
        reviews::ApproveBody,
        reviews::RejectBody,
        reviews::SaveInterpretationBody,
        reviews::InterpretBody,
        sync::PushBody,
        sync::PullBody,
        sync::ForceBody,
        millwork_core::DimensionSet,
        millwork_core::SyncOutcome,
        millwork_core::SyncDirection,
    )),
    tags(
        (name = "Extraction", description = "Document scans"),
        (name = "Review", description = "Human-in-the-loop review queue"),
        (name = "Sync", description = "CAD / system-of-record sync"),
        (name = "CAD", description = "Open document inspection"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

#[utoipa::path(get, path = "/health", tag = "System",
    responses((status = 200, description = "Service is up")))]
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// ROUTER
// =============================================================================

#[derive(Clone, Copy)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

pub fn router(state: AppState, config: &AppConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(
            SwaggerUi::new("/docs").config(
                Config::new(["/openapi.json"])
                    .try_it_out_enabled(true)
                    .display_request_duration(true),
            ),
        )
        .route("/openapi.json", get(openapi_json))
        // Extraction jobs
        .route("/extraction/jobs", post(jobs::create_job))
        .route("/extraction/jobs/:id", get(jobs::get_job))
        // Review queue
        .route("/extraction/review-queue", get(reviews::list_reviews))
        .route("/extraction/review/:id", get(reviews::get_review))
        .route("/extraction/review/:id/approve", post(reviews::approve_review))
        .route("/extraction/review/:id/reject", post(reviews::reject_review))
        .route(
            "/extraction/review/:id/interpretation-context",
            get(reviews::interpretation_context),
        )
        .route(
            "/extraction/review/:id/save-interpretation",
            post(reviews::save_interpretation),
        )
        .route(
            "/extraction/review/:id/interpret",
            post(reviews::request_interpretation),
        )
        // Sync
        .route("/sync/push", post(sync::push))
        .route("/sync/pull", post(sync::pull))
        .route("/sync/force", post(sync::force))
        .route("/sync/status", get(sync::status))
        .route("/sync/history", get(sync::history))
        // CAD document
        .route("/cad/document", get(cad::document))
        .route("/cad/views", get(cad::views))
        // Middleware
        .layer(axum::middleware::from_fn(
            middleware::request_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.allowed_origins.clone()))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    HeaderName::from_static(middleware::ACTOR_HEADER),
                    HeaderName::from_static(middleware::COMPANY_HEADER),
                ])
                .max_age(Duration::from_secs(3600)),
        )
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(defaults::MAX_BODY_SIZE_BYTES))
        .with_state(state)
}
