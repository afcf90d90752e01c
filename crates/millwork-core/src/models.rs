//! Core data models for millwork.
//!
//! These types are shared across all millwork crates: extraction jobs,
//! confidence scores, review items, materialized cabinets, and sync state.

pub mod cad;

pub use cad::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// CONFIDENCE TYPES
// =============================================================================

/// Confidence band derived from a score total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::Low => "low",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfidenceLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "high" => Ok(ConfidenceLevel::High),
            "medium" => Ok(ConfidenceLevel::Medium),
            "low" => Ok(ConfidenceLevel::Low),
            other => Err(Error::Validation(format!(
                "unknown confidence level: {other}"
            ))),
        }
    }
}

/// One rubric signal's contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    /// Sub-score in [0, 100].
    pub score: f64,
    /// Normalised weight applied to `score`.
    pub weight: f64,
    /// Human-readable reasons that raised or lowered the sub-score.
    pub reasons: Vec<String>,
}

/// Problem category reported alongside a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    DimensionOutOfRange,
    BoundingBoxMismatch,
    UnusualRatio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreIssue {
    pub kind: IssueKind,
    pub field: String,
    #[serde(default)]
    pub value: Option<f64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingField {
    pub field: String,
    pub importance: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSuggestion {
    pub priority: String,
    pub area: String,
    pub action: String,
}

/// Rubric-based trust measure for a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Weighted total, clamped to [0, 100].
    pub total: f64,
    pub level: ConfidenceLevel,
    /// Signal name → sub-score, weight and reasons.
    pub details: BTreeMap<String, SignalScore>,
    /// Set when the total was capped because required geometry is missing.
    #[serde(default)]
    pub capped: bool,
    #[serde(default)]
    pub missing_fields: Vec<MissingField>,
    #[serde(default)]
    pub issues: Vec<ScoreIssue>,
    #[serde(default)]
    pub recommendations: Vec<ScoreSuggestion>,
}

/// Level counts for a batch of scores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_candidates: usize,
    pub average_score: f64,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
}

// =============================================================================
// DIMENSION SETS
// =============================================================================

/// Field-level cabinet values used for corrections, sync comparison and
/// interpretation output. Absent fields mean "no value / no change".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct DimensionSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawer_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub door_count: Option<i32>,
}

/// Names of the length fields in a [`DimensionSet`], in comparison order.
pub const LENGTH_FIELDS: [&str; 3] = ["width", "height", "depth"];

impl DimensionSet {
    pub fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.depth.is_none()
            && self.drawer_count.is_none()
            && self.door_count.is_none()
    }

    /// Values from `over` win wherever they are present.
    pub fn overlay(&self, over: &DimensionSet) -> DimensionSet {
        DimensionSet {
            width: over.width.or(self.width),
            height: over.height.or(self.height),
            depth: over.depth.or(self.depth),
            drawer_count: over.drawer_count.or(self.drawer_count),
            door_count: over.door_count.or(self.door_count),
        }
    }

    /// Length field by name.
    pub fn length(&self, field: &str) -> Option<f64> {
        match field {
            "width" => self.width,
            "height" => self.height,
            "depth" => self.depth,
            _ => None,
        }
    }

    pub fn set_length(&mut self, field: &str, value: Option<f64>) {
        match field {
            "width" => self.width = value,
            "height" => self.height = value,
            "depth" => self.depth = value,
            _ => {}
        }
    }

    pub fn from_candidate(candidate: &Candidate) -> Self {
        let counted = !candidate.components.is_empty();
        DimensionSet {
            width: candidate.width,
            height: candidate.height,
            depth: candidate.depth,
            drawer_count: counted.then_some(candidate.components.drawer_count as i32),
            door_count: counted.then_some(candidate.components.door_count as i32),
        }
    }

    /// Lengths of the CAD group itself: bounding box extents, falling back per
    /// field to the extracted value when the box is missing or flat. This is
    /// the quantity a push writes, so sync compares against it.
    pub fn group_geometry(candidate: &Candidate) -> Self {
        let positive = |v: f64| (v > 0.0).then_some(v);
        let bbox = candidate.bounding_box.as_ref();
        DimensionSet {
            width: bbox.and_then(|b| positive(b.width())).or(candidate.width),
            height: bbox.and_then(|b| positive(b.height())).or(candidate.height),
            depth: bbox.and_then(|b| positive(b.depth())).or(candidate.depth),
            drawer_count: None,
            door_count: None,
        }
    }

    /// Write present values into a candidate.
    pub fn apply_to(&self, candidate: &mut Candidate) {
        if let Some(w) = self.width {
            candidate.width = Some(w);
        }
        if let Some(h) = self.height {
            candidate.height = Some(h);
        }
        if let Some(d) = self.depth {
            candidate.depth = Some(d);
        }
        if let Some(n) = self.drawer_count {
            candidate.components.drawer_count = n.max(0) as u32;
        }
        if let Some(n) = self.door_count {
            candidate.components.door_count = n.max(0) as u32;
        }
    }

    /// Check every present value against the accepted cabinet ranges.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("width", self.width, defaults::WIDTH_RANGE),
            ("height", self.height, defaults::HEIGHT_RANGE),
            ("depth", self.depth, defaults::DEPTH_RANGE),
        ];
        for (field, value, (min, max)) in checks {
            if let Some(v) = value {
                if !v.is_finite() || v < min || v > max {
                    return Err(Error::Validation(format!(
                        "{field} must be between {min} and {max} inches, got {v}"
                    )));
                }
            }
        }
        for (field, value) in [
            ("drawer_count", self.drawer_count),
            ("door_count", self.door_count),
        ] {
            if let Some(n) = value {
                if n < 0 {
                    return Err(Error::Validation(format!(
                        "{field} must be zero or greater, got {n}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Stable sha256 fingerprint of the values, rounded to 1/10000 inch.
    pub fn fingerprint(&self) -> String {
        fn len(v: Option<f64>) -> String {
            v.map(|x| format!("{:.4}", round4(x)))
                .unwrap_or_else(|| "-".to_string())
        }
        fn count(v: Option<i32>) -> String {
            v.map(|x| x.to_string()).unwrap_or_else(|| "-".to_string())
        }
        let canonical = format!(
            "w={};h={};d={};dr={};do={}",
            len(self.width),
            len(self.height),
            len(self.depth),
            count(self.drawer_count),
            count(self.door_count)
        );
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

// =============================================================================
// EXTRACTION JOB TYPES
// =============================================================================

/// Lifecycle of an extraction job. Monotonic: pending → running → terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Only forward transitions are legal; terminal states never change.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Complete)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "complete" => Ok(JobStatus::Complete),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::Validation(format!("unknown job status: {other}"))),
        }
    }
}

/// Options captured when a scan is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ScanOptions {
    /// Create a new job even if one is already active for the project.
    #[serde(default)]
    pub force: bool,
    #[serde(default = "default_true")]
    pub include_fixtures: bool,
    #[serde(default = "default_true")]
    pub auto_approve_high_confidence: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            force: false,
            include_fixtures: true,
            auto_approve_high_confidence: true,
        }
    }
}

/// Counts recorded on a job at completion, or as far as it got on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub groups_found: usize,
    pub candidates: usize,
    pub reviews_created: usize,
    pub auto_materialized: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    #[serde(default)]
    pub average_score: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub review_ids: Vec<i64>,
    #[serde(default)]
    pub cabinet_ids: Vec<i64>,
    /// Last phase reached: "extract", "score", "route", "done".
    #[serde(default)]
    pub phase: Option<String>,
}

/// One document scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub id: i64,
    pub uuid: Uuid,
    pub project_id: Option<i64>,
    pub requested_by: Option<i64>,
    pub company_id: Option<i64>,
    pub status: JobStatus,
    pub options: ScanOptions,
    pub summary: Option<JobSummary>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Insert request for a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewExtractionJob {
    pub project_id: Option<i64>,
    pub requested_by: Option<i64>,
    pub company_id: Option<i64>,
    pub options: ScanOptions,
}

// =============================================================================
// REVIEW TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(Error::Validation(format!("unknown review status: {other}"))),
        }
    }
}

/// Why a review item exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    LowConfidence,
    Ambiguous,
    Confirmation,
    SyncConflict,
    NewFromCad,
}

impl ReviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewType::LowConfidence => "low_confidence",
            ReviewType::Ambiguous => "ambiguous",
            ReviewType::Confirmation => "confirmation",
            ReviewType::SyncConflict => "sync_conflict",
            ReviewType::NewFromCad => "new_from_cad",
        }
    }
}

impl fmt::Display for ReviewType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low_confidence" => Ok(ReviewType::LowConfidence),
            "ambiguous" => Ok(ReviewType::Ambiguous),
            "confirmation" => Ok(ReviewType::Confirmation),
            "sync_conflict" => Ok(ReviewType::SyncConflict),
            "new_from_cad" => Ok(ReviewType::NewFromCad),
            other => Err(Error::Validation(format!("unknown review type: {other}"))),
        }
    }
}

/// Interpretation verdict from the reasoning boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Review,
    Reject,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Approve => "approve",
            Recommendation::Review => "review",
            Recommendation::Reject => "reject",
        }
    }
}

/// Where an interpretation came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpretationSource {
    #[default]
    Model,
    Rules,
    External,
}

/// Advisory disambiguation proposal for one review item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationResult {
    pub recommendation: Recommendation,
    #[serde(default)]
    pub corrected_dimensions: Option<DimensionSet>,
    /// Proposed score in [0, 100].
    #[serde(default)]
    pub improved_confidence: Option<f64>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub source: InterpretationSource,
}

impl InterpretationResult {
    pub fn validate(&self) -> Result<()> {
        if let Some(score) = self.improved_confidence {
            if !(0.0..=100.0).contains(&score) {
                return Err(Error::Validation(format!(
                    "improved confidence must be between 0 and 100, got {score}"
                )));
            }
        }
        if let Some(dims) = &self.corrected_dimensions {
            dims.validate()?;
        }
        Ok(())
    }
}

/// Which side won a forced sync, and who authorised it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResolution {
    pub direction: SyncDirection,
    pub actor_id: Option<i64>,
    pub resolved_at: DateTime<Utc>,
}

/// The durable human-in-the-loop unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReview {
    pub id: i64,
    /// None for reviews raised by sync rather than by a scan.
    pub job_id: Option<i64>,
    pub project_id: Option<i64>,
    pub review_type: ReviewType,
    pub group_name: String,
    pub extraction_data: Candidate,
    pub confidence_score: f64,
    pub confidence_level: ConfidenceLevel,
    #[serde(default)]
    pub score_details: Option<ConfidenceScore>,
    #[serde(default)]
    pub ai_interpretation: Option<InterpretationResult>,
    pub status: ReviewStatus,
    pub reviewer_id: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub corrections: Option<DimensionSet>,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    /// Downstream cabinet: created on approval, or the subject of a sync conflict.
    pub cabinet_id: Option<i64>,
    #[serde(default)]
    pub sync_conflict: Option<SyncConflict>,
    #[serde(default)]
    pub resolution: Option<SyncResolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExtractionReview {
    pub fn is_pending(&self) -> bool {
        self.status == ReviewStatus::Pending
    }

    /// Stored candidate with any corrections applied.
    pub fn effective_candidate(&self) -> Candidate {
        let mut candidate = self.extraction_data.clone();
        if let Some(corrections) = &self.corrections {
            corrections.apply_to(&mut candidate);
        }
        candidate
    }
}

/// Insert request for a review.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub job_id: Option<i64>,
    pub project_id: Option<i64>,
    pub review_type: ReviewType,
    pub candidate: Candidate,
    pub score: ConfidenceScore,
    pub cabinet_id: Option<i64>,
    pub sync_conflict: Option<SyncConflict>,
}

/// Reviewer decision payload for an approval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Approval {
    pub reviewer_id: Option<i64>,
    pub corrections: Option<DimensionSet>,
    pub notes: Option<String>,
    pub resolution: Option<SyncResolution>,
}

/// Side effect committed atomically with an approval.
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalEffect {
    /// Flip status only.
    None,
    /// Materialize a new cabinet and link it to the review. The baseline, if
    /// any, is stored with the cabinet in the same unit.
    CreateCabinet {
        draft: Box<CabinetDraft>,
        baseline: Option<SyncBaseline>,
    },
    /// Overwrite an existing cabinet's values and sync baseline.
    UpdateCabinet {
        cabinet_id: i64,
        dimensions: DimensionSet,
        baseline: Option<SyncBaseline>,
    },
}

/// Review queue filter. `status: None` means every status.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewFilter {
    pub status: Option<ReviewStatus>,
    pub project_id: Option<i64>,
    pub review_type: Option<ReviewType>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
    /// Keep only the newest review per (project, group name).
    pub dedupe: bool,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ReviewFilter {
    fn default() -> Self {
        Self {
            status: Some(ReviewStatus::Pending),
            project_id: None,
            review_type: None,
            min_confidence: None,
            max_confidence: None,
            dedupe: false,
            limit: defaults::PAGE_LIMIT,
            offset: defaults::PAGE_OFFSET,
        }
    }
}

/// One page of reviews plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewPage {
    pub items: Vec<ExtractionReview>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl ReviewPage {
    pub fn has_more(&self) -> bool {
        self.offset + (self.items.len() as i64) < self.total
    }
}

// =============================================================================
// CABINET TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConstructionType {
    #[default]
    FaceFrame,
    Frameless,
}

impl ConstructionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstructionType::FaceFrame => "face_frame",
            ConstructionType::Frameless => "frameless",
        }
    }
}

impl FromStr for ConstructionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "face_frame" => Ok(ConstructionType::FaceFrame),
            "frameless" => Ok(ConstructionType::Frameless),
            other => Err(Error::Validation(format!(
                "unknown construction type: {other}"
            ))),
        }
    }
}

/// Sub-entity of a cabinet: a run of identical openings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabinetSection {
    pub kind: ComponentKind,
    pub count: i32,
}

/// A field the mapper could not fill, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingFieldNote {
    pub field: String,
    pub reason: String,
}

/// Where a draft came from in the CAD document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CadSource {
    pub group_name: String,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub detected_from: DetectionSource,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
}

/// A cabinet ready to be written to the system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabinetDraft {
    pub project_id: Option<i64>,
    pub cabinet_number: String,
    pub full_code: Option<String>,
    pub group_name: String,
    pub length_inches: Option<f64>,
    pub height_inches: Option<f64>,
    pub depth_inches: Option<f64>,
    pub construction_type: ConstructionType,
    pub face_frame_stile_width: Option<f64>,
    pub face_frame_rail_width: Option<f64>,
    pub door_gap: Option<f64>,
    pub drawer_count: i32,
    pub door_count: i32,
    pub sections: Vec<CabinetSection>,
    pub shop_notes: Option<String>,
    pub source: CadSource,
    pub auto_populated_fields: Vec<String>,
    pub missing_fields: Vec<MissingFieldNote>,
    /// Template defaults that filled otherwise empty fields.
    #[serde(default)]
    pub applied_template_defaults: Vec<String>,
}

impl CabinetDraft {
    pub fn dimensions(&self) -> DimensionSet {
        DimensionSet {
            width: self.length_inches,
            height: self.height_inches,
            depth: self.depth_inches,
            drawer_count: Some(self.drawer_count),
            door_count: Some(self.door_count),
        }
    }
}

/// Last values both sides agreed on.
///
/// `dimensions` are the system-of-record values. `cad_geometry` is the group
/// geometry observed at the same moment; when absent the CAD side is taken to
/// match `dimensions`, which holds right after a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncBaseline {
    pub dimensions: DimensionSet,
    pub fingerprint: String,
    pub direction: SyncDirection,
    pub synced_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cad_geometry: Option<DimensionSet>,
}

impl SyncBaseline {
    pub fn new(dimensions: DimensionSet, direction: SyncDirection) -> Self {
        Self {
            fingerprint: dimensions.fingerprint(),
            dimensions,
            direction,
            synced_at: Utc::now(),
            cad_geometry: None,
        }
    }

    pub fn with_cad_geometry(mut self, geometry: DimensionSet) -> Self {
        self.cad_geometry = Some(geometry);
        self
    }

    /// CAD-side reference for change detection.
    pub fn cad_reference(&self) -> DimensionSet {
        self.cad_geometry.unwrap_or(self.dimensions)
    }
}

/// A materialized cabinet in the system of record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cabinet {
    pub id: i64,
    pub project_id: Option<i64>,
    pub cabinet_number: String,
    pub full_code: Option<String>,
    pub group_name: String,
    pub length_inches: Option<f64>,
    pub height_inches: Option<f64>,
    pub depth_inches: Option<f64>,
    pub construction_type: ConstructionType,
    pub face_frame_stile_width: Option<f64>,
    pub face_frame_rail_width: Option<f64>,
    pub door_gap: Option<f64>,
    pub drawer_count: i32,
    pub door_count: i32,
    pub sections: Vec<CabinetSection>,
    pub shop_notes: Option<String>,
    pub source: CadSource,
    pub source_review_id: Option<i64>,
    pub sync_baseline: Option<SyncBaseline>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cabinet {
    /// Current system-of-record values in comparable form.
    pub fn dimensions(&self) -> DimensionSet {
        DimensionSet {
            width: self.length_inches,
            height: self.height_inches,
            depth: self.depth_inches,
            drawer_count: Some(self.drawer_count),
            door_count: Some(self.door_count),
        }
    }
}

// =============================================================================
// SYNC TYPES
// =============================================================================

/// Side of a sync. `rhino` is accepted as an alias for the CAD side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Erp,
    #[serde(alias = "rhino")]
    Cad,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Erp => "erp",
            SyncDirection::Cad => "cad",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "erp" => Ok(SyncDirection::Erp),
            "cad" | "rhino" => Ok(SyncDirection::Cad),
            other => Err(Error::Validation(format!(
                "direction must be 'erp' or 'rhino', got '{other}'"
            ))),
        }
    }
}

/// One field that changed on both sides since the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub baseline: Option<f64>,
    pub erp: Option<f64>,
    pub cad: Option<f64>,
}

/// Divergent state captured on a sync conflict review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub cabinet_id: i64,
    pub erp: DimensionSet,
    pub cad: DimensionSet,
    pub baseline: Option<DimensionSet>,
    pub fields: Vec<FieldConflict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncEventKind {
    Push,
    Pull,
    Force,
}

impl SyncEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEventKind::Push => "push",
            SyncEventKind::Pull => "pull",
            SyncEventKind::Force => "force",
        }
    }
}

impl FromStr for SyncEventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "push" => Ok(SyncEventKind::Push),
            "pull" => Ok(SyncEventKind::Pull),
            "force" => Ok(SyncEventKind::Force),
            other => Err(Error::Validation(format!("unknown sync event: {other}"))),
        }
    }
}

/// Audit record of one push, pull or forced resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: i64,
    pub project_id: Option<i64>,
    pub cabinet_id: Option<i64>,
    pub review_id: Option<i64>,
    pub kind: SyncEventKind,
    pub direction: SyncDirection,
    pub actor_id: Option<i64>,
    pub success: bool,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncEvent {
    pub project_id: Option<i64>,
    pub cabinet_id: Option<i64>,
    pub review_id: Option<i64>,
    pub kind: SyncEventKind,
    pub direction: SyncDirection,
    pub actor_id: Option<i64>,
    pub success: bool,
    pub details: JsonValue,
}

/// Options for pulling CAD state into the system of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PullOptions {
    #[serde(default = "default_true")]
    pub auto_merge: bool,
    #[serde(default)]
    pub create_new: bool,
}

impl Default for PullOptions {
    fn default() -> Self {
        Self {
            auto_merge: true,
            create_new: false,
        }
    }
}

/// `{success, details|error}` envelope returned by sync operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SyncOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncOutcome {
    pub fn ok(details: JsonValue) -> Self {
        Self {
            success: true,
            details: Some(details),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            details: None,
            error: Some(error.into()),
        }
    }
}

/// Read-only sync overview for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub project_id: Option<i64>,
    pub last_push: Option<DateTime<Utc>>,
    pub last_pull: Option<DateTime<Utc>>,
    pub last_direction: Option<SyncDirection>,
    pub conflict_count: i64,
    pub pending_reviews: i64,
    pub cabinet_count: i64,
    /// No pending conflicts and every cabinet has a baseline.
    pub in_agreement: bool,
    pub last_extraction: Option<ExtractionJob>,
    pub sync_available: bool,
}
