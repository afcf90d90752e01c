//! Core traits for millwork abstractions.
//!
//! Repositories are the persistence seam (PostgreSQL in production, an
//! in-memory store in tests). `CadConnector` and `GenerationBackend` are the
//! two external boundaries.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::*;
use crate::policy::LevelThresholds;

// =============================================================================
// JOB REPOSITORY TRAITS
// =============================================================================

/// Durable extraction job queue.
#[async_trait]
pub trait ExtractionJobRepository: Send + Sync {
    /// Insert a job in `pending`.
    async fn queue(&self, job: NewExtractionJob) -> Result<ExtractionJob>;

    /// Insert a job unless one is already pending or running for the same
    /// project, in which case that job is returned with `created = false`.
    async fn queue_deduplicated(&self, job: NewExtractionJob) -> Result<(ExtractionJob, bool)>;

    async fn get(&self, id: i64) -> Result<Option<ExtractionJob>>;

    /// Atomically move the oldest pending job to `running`.
    async fn claim_next(&self) -> Result<Option<ExtractionJob>>;

    /// Terminal write `running → complete`. Returns false if the job was not
    /// running (already terminal, or reaped).
    async fn complete(&self, id: i64, summary: &JobSummary) -> Result<bool>;

    /// Terminal write `running → failed`, keeping whatever summary was gathered.
    async fn fail(&self, id: i64, error: &str, summary: Option<&JobSummary>) -> Result<bool>;

    /// Fail every job that has been `running` since before `started_before`.
    async fn fail_stale(&self, started_before: DateTime<Utc>, error: &str) -> Result<Vec<i64>>;

    /// Most recently created job for a project.
    async fn latest_for_project(&self, project_id: Option<i64>) -> Result<Option<ExtractionJob>>;
}

// =============================================================================
// REVIEW REPOSITORY TRAITS
// =============================================================================

/// Durable review queue storage.
///
/// `approve` and `reject` are compare-and-set on `status`: they succeed only
/// from `pending` and fail with `Error::AlreadyProcessed` otherwise. The
/// approval effect commits in the same unit as the status flip.
#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn create(&self, review: NewReview) -> Result<ExtractionReview>;

    async fn get(&self, id: i64) -> Result<Option<ExtractionReview>>;

    async fn list(&self, filter: &ReviewFilter) -> Result<ReviewPage>;

    async fn list_for_job(&self, job_id: i64) -> Result<Vec<ExtractionReview>>;

    async fn approve(
        &self,
        id: i64,
        approval: Approval,
        effect: ApprovalEffect,
    ) -> Result<ExtractionReview>;

    async fn reject(
        &self,
        id: i64,
        reviewer_id: Option<i64>,
        reason: &str,
    ) -> Result<ExtractionReview>;

    /// Store an interpretation. The stored score becomes
    /// `max(current, improved_confidence)` and the level follows it.
    async fn record_interpretation(
        &self,
        id: i64,
        interpretation: &InterpretationResult,
        thresholds: &LevelThresholds,
    ) -> Result<ExtractionReview>;

    /// Pending `sync_conflict` review for a cabinet, if any.
    async fn pending_conflict_for_cabinet(&self, cabinet_id: i64)
        -> Result<Option<ExtractionReview>>;

    async fn count_pending(
        &self,
        project_id: Option<i64>,
        review_type: Option<ReviewType>,
    ) -> Result<i64>;

    /// Whether a pending review of `review_type` already covers the group.
    async fn has_pending_for_group(
        &self,
        project_id: Option<i64>,
        group_name: &str,
        review_type: ReviewType,
    ) -> Result<bool>;
}

// =============================================================================
// CABINET REPOSITORY TRAITS
// =============================================================================

/// System-of-record cabinet storage.
#[async_trait]
pub trait CabinetRepository: Send + Sync {
    async fn create(&self, draft: &CabinetDraft, source_review_id: Option<i64>) -> Result<Cabinet>;

    /// Insert all drafts in one transaction.
    async fn create_many(
        &self,
        drafts: &[CabinetDraft],
        source_review_id: Option<i64>,
    ) -> Result<Vec<Cabinet>>;

    async fn get(&self, id: i64) -> Result<Option<Cabinet>>;

    async fn find_by_group(&self, project_id: Option<i64>, group_name: &str)
        -> Result<Option<Cabinet>>;

    async fn find_by_number(
        &self,
        project_id: Option<i64>,
        cabinet_number: &str,
    ) -> Result<Option<Cabinet>>;

    async fn list_for_project(&self, project_id: Option<i64>) -> Result<Vec<Cabinet>>;

    /// Overwrite present dimension fields, optionally replacing the baseline.
    async fn update_dimensions(
        &self,
        id: i64,
        dimensions: &DimensionSet,
        baseline: Option<&SyncBaseline>,
    ) -> Result<Cabinet>;

    async fn set_baseline(&self, id: i64, baseline: &SyncBaseline) -> Result<()>;
}

// =============================================================================
// SYNC EVENT TRAITS
// =============================================================================

/// Append-only audit log of sync operations.
#[async_trait]
pub trait SyncEventRepository: Send + Sync {
    async fn record(&self, event: NewSyncEvent) -> Result<SyncEvent>;

    /// Latest successful event of a kind for a project.
    async fn latest(&self, project_id: Option<i64>, kind: SyncEventKind)
        -> Result<Option<SyncEvent>>;

    async fn list(&self, project_id: Option<i64>, limit: i64) -> Result<Vec<SyncEvent>>;
}

// =============================================================================
// CAD BOUNDARY
// =============================================================================

/// Opaque RPC boundary to the external CAD tool.
///
/// Every call is bounded by a timeout; `execute_script` callers pass one
/// explicitly and implementations clamp it to the allowed range.
#[async_trait]
pub trait CadConnector: Send + Sync {
    async fn document_info(&self) -> Result<DocumentInfo>;

    async fn layers(&self) -> Result<Vec<CadLayer>>;

    /// Names of every named group in the document.
    async fn groups(&self) -> Result<Vec<String>>;

    /// Combined bounding box of a group's objects; `None` for an empty group.
    async fn group_bounding_box(&self, group: &str) -> Result<Option<BoundingBox>>;

    async fn text_objects(&self) -> Result<Vec<TextLabel>>;

    async fn dimensions(&self) -> Result<Vec<DimensionAnnotation>>;

    async fn block_instances(&self) -> Result<Vec<BlockInstance>>;

    /// Run a script in the CAD tool. `timeout_secs` of `None` uses the default.
    async fn execute_script(&self, script: &str, timeout_secs: Option<u64>)
        -> Result<ScriptOutput>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
