//! Centralized default constants for millwork.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Scoring weights and thresholds here are only the defaults of
//! [`ScoringPolicy`](crate::policy::ScoringPolicy); deployments tune them
//! through a policy file.
//!
//! All lengths are inches.

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for the review queue.
pub const PAGE_LIMIT: i64 = 20;

/// Maximum page size accepted by list endpoints.
pub const PAGE_LIMIT_MAX: i64 = 100;

/// Default offset for paginated queries.
pub const PAGE_OFFSET: i64 = 0;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Request body limit for API payloads.
pub const MAX_BODY_SIZE_BYTES: usize = 2 * 1024 * 1024;

/// Maximum length of review notes and rejection reasons.
pub const NOTES_MAX_LEN: usize = 1000;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model for dimension interpretation.
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Generation request timeout.
pub const GEN_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Worker poll interval when no notification arrives.
pub const JOB_POLL_INTERVAL_MS: u64 = 5_000;

/// Maximum extraction jobs processed concurrently by one worker.
pub const JOB_MAX_CONCURRENT: usize = 2;

/// Upper bound on a single extraction run.
pub const JOB_TIMEOUT_SECS: u64 = 600;

/// A `running` job whose claim is older than this is considered abandoned.
pub const JOB_STALE_AFTER_SECS: u64 = 900;

/// How often the reaper scans for abandoned jobs.
pub const JOB_REAPER_INTERVAL_SECS: u64 = 60;

/// Error message written by the reaper.
pub const JOB_WORKER_LOST_MSG: &str = "worker lost: job exceeded stale timeout while running";

// =============================================================================
// CAD BOUNDARY
// =============================================================================

/// Default CAD MCP bridge URL.
pub const CAD_RPC_URL: &str = "http://127.0.0.1:8765/mcp";

/// Default script execution timeout.
pub const SCRIPT_TIMEOUT_SECS: u64 = 30;

/// Smallest script timeout a caller may request.
pub const SCRIPT_TIMEOUT_MIN_SECS: u64 = 1;

/// Largest script timeout a caller may request.
pub const SCRIPT_TIMEOUT_MAX_SECS: u64 = 300;

/// Timeout for bulk reads (text objects, dimensions), which are slower than
/// metadata calls.
pub const SCRIPT_LONG_TIMEOUT_SECS: u64 = 120;

/// Clamp a requested script timeout into the allowed window.
pub fn clamp_script_timeout(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(SCRIPT_TIMEOUT_SECS)
        .clamp(SCRIPT_TIMEOUT_MIN_SECS, SCRIPT_TIMEOUT_MAX_SECS)
}

// =============================================================================
// CONFIDENCE SCORING
// =============================================================================

/// Weight of the dimensions-found signal.
pub const WEIGHT_DIMENSIONS: f64 = 0.40;

/// Weight of the standard-size validity signal.
pub const WEIGHT_VALIDITY: f64 = 0.20;

/// Weight of the component detection signal.
pub const WEIGHT_COMPONENTS: f64 = 0.15;

/// Weight of the plan/elevation correlation signal.
pub const WEIGHT_MULTI_VIEW: f64 = 0.15;

/// Weight of the naming/label signal.
pub const WEIGHT_LABELS: f64 = 0.10;

/// Minimum total for the `high` level.
pub const THRESHOLD_HIGH: f64 = 80.0;

/// Minimum total for the `medium` level.
pub const THRESHOLD_MEDIUM: f64 = 50.0;

/// Cap applied when a required dimension is missing. Must stay below
/// [`THRESHOLD_MEDIUM`].
pub const INCOMPLETE_CEILING: f64 = 49.0;

/// Tolerance when matching a value against a standard size.
pub const DIMENSION_TOLERANCE: f64 = 1.0;

/// Standard cabinet widths.
pub const STANDARD_WIDTHS: &[f64] = &[
    9.0, 12.0, 15.0, 18.0, 21.0, 24.0, 27.0, 30.0, 33.0, 36.0, 42.0, 48.0, 60.0, 72.0, 84.0,
];

/// Standard cabinet heights (base, vanity, wall, tall).
pub const STANDARD_HEIGHTS: &[f64] = &[30.0, 34.5, 36.0, 42.0, 48.0, 84.0, 90.0, 96.0];

/// Standard cabinet depths.
pub const STANDARD_DEPTHS: &[f64] = &[12.0, 15.0, 18.0, 21.0, 24.0];

/// Width difference from the bounding box that is reported as an issue.
pub const BBOX_MISMATCH_TOLERANCE: f64 = 5.0;

// =============================================================================
// DIMENSION RANGES
// =============================================================================

/// Accepted width range for materialized cabinets and corrections.
pub const WIDTH_RANGE: (f64, f64) = (6.0, 96.0);

/// Accepted height range for materialized cabinets and corrections.
pub const HEIGHT_RANGE: (f64, f64) = (12.0, 108.0);

/// Accepted depth range for materialized cabinets and corrections.
pub const DEPTH_RANGE: (f64, f64) = (6.0, 36.0);

/// Plausible width range used when scoring (wider than the materialization range
/// so long runs are flagged, not dropped).
pub const SCORE_WIDTH_RANGE: (f64, f64) = (6.0, 120.0);

// =============================================================================
// EXTRACTION HEURISTICS
// =============================================================================

/// Horizontal half-extent of a view's search window around its label.
pub const VIEW_HALF_WIDTH: f64 = 250.0;

/// Distance above the view label included in the window.
pub const VIEW_ABOVE: f64 = 100.0;

/// Distance below the view label included in the window.
pub const VIEW_BELOW: f64 = 300.0;

/// Values in this range are treated as face frame stiles/rails.
pub const FACE_FRAME_RANGE: (f64, f64) = (1.4, 2.1);

/// Vertical dimensions in this range are height candidates.
pub const HEIGHT_CANDIDATE_RANGE: (f64, f64) = (20.0, 96.0);

/// Horizontal dimensions in this range are width candidates.
pub const WIDTH_CANDIDATE_RANGE: (f64, f64) = (9.0, 84.0);

/// Dimensions in this range are depth candidates.
pub const DEPTH_CANDIDATE_RANGE: (f64, f64) = (10.0, 36.0);

/// Depths the depth heuristic gravitates to, most common first.
pub const COMMON_DEPTHS: &[f64] = &[19.0, 21.0, 24.0, 12.0, 15.0, 18.0];

/// Fixtures within this distance of a cabinet's bounding box are attached to it.
pub const FIXTURE_TOLERANCE: f64 = 50.0;

/// Component labels within this distance of a cabinet's bounding box count
/// toward it.
pub const COMPONENT_LABEL_MARGIN: f64 = 12.0;

/// Search radius for dimensions around a label in label-search mode.
pub const LABEL_DIMENSION_RADIUS: f64 = 100.0;

/// Search radius for component labels in label-search mode.
pub const LABEL_COMPONENT_RADIUS: f64 = 150.0;

// =============================================================================
// CONSTRUCTION STANDARDS
// =============================================================================

/// Face frame stile width.
pub const STILE_WIDTH: f64 = 1.75;

/// Face frame rail width.
pub const RAIL_WIDTH: f64 = 1.5;

/// Gap between doors.
pub const DOOR_GAP: f64 = 0.125;

/// Carcass material thickness.
pub const MATERIAL_THICKNESS: f64 = 0.75;

/// Back panel thickness.
pub const BACK_PANEL_THICKNESS: f64 = 0.25;

// =============================================================================
// REVIEW
// =============================================================================

/// Minimum interpreted score before a recommendation may be auto-applied.
pub const AUTO_APPLY_MIN_CONFIDENCE: f64 = 80.0;

// =============================================================================
// SYNC
// =============================================================================

/// Differences at or below this are treated as equal during sync.
pub const SYNC_CONFLICT_TOLERANCE: f64 = 0.5;
