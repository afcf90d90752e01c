//! Structured logging schema and field name constants for millwork.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, soft extraction warning, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, job completion, review decisions, sync) |
//! | DEBUG | Decision points, routing choices, config values |
//! | TRACE | Per-group and per-dimension iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → job → sub-calls.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "cad", "inference", "jobs", "review", "sync"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "mcp", "extractor", "worker", "reaper", "ollama"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "execute_script", "claim_next", "approve", "pull"
pub const OPERATION: &str = "op";

/// Authorizing actor (reviewer, sync operator).
pub const ACTOR_ID: &str = "actor_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Extraction job id.
pub const JOB_ID: &str = "job_id";

/// Review id.
pub const REVIEW_ID: &str = "review_id";

/// Project reference.
pub const PROJECT_ID: &str = "project_id";

/// Cabinet (materialized entity) id.
pub const CABINET_ID: &str = "cabinet_id";

/// CAD group name.
pub const GROUP_NAME: &str = "group_name";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of candidates produced by an extraction.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of review items created.
pub const REVIEW_COUNT: &str = "review_count";

/// Confidence total in [0, 100].
pub const CONFIDENCE: &str = "confidence";

/// Byte length of a script or prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a boundary response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for interpretation.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Sync direction ("erp", "cad").
pub const DIRECTION: &str = "direction";
