//! Sync configuration.

use millwork_core::defaults;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Largest difference, in inches, still treated as the same value.
    pub conflict_tolerance: f64,
    /// Timeout handed to push scripts.
    pub script_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_tolerance: defaults::SYNC_CONFLICT_TOLERANCE,
            script_timeout_secs: defaults::SCRIPT_TIMEOUT_SECS,
        }
    }
}

impl SyncConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SYNC_CONFLICT_TOLERANCE` | `0.5` |
    /// | `SYNC_SCRIPT_TIMEOUT_SECS` | `30` (clamped to the script window) |
    pub fn from_env() -> Self {
        let conflict_tolerance = std::env::var("SYNC_CONFLICT_TOLERANCE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(defaults::SYNC_CONFLICT_TOLERANCE);
        let script_timeout = std::env::var("SYNC_SCRIPT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok());
        Self {
            conflict_tolerance,
            script_timeout_secs: defaults::clamp_script_timeout(script_timeout),
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.conflict_tolerance = tolerance;
        self
    }
}
