//! Review queue configuration.

use millwork_core::{defaults, LevelThresholds};

/// Settings for decisions and interpretation merges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewConfig {
    /// Interpreted score required before an `approve` recommendation is
    /// applied automatically.
    pub auto_apply_min_confidence: f64,
    /// Bands used to re-level a review after an interpretation raises its score.
    pub thresholds: LevelThresholds,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            auto_apply_min_confidence: defaults::AUTO_APPLY_MIN_CONFIDENCE,
            thresholds: LevelThresholds::default(),
        }
    }
}

impl ReviewConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `REVIEW_AUTO_APPLY_MIN_CONFIDENCE` | `80` |
    pub fn from_env() -> Self {
        let auto_apply_min_confidence = std::env::var("REVIEW_AUTO_APPLY_MIN_CONFIDENCE")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| (0.0..=100.0).contains(v))
            .unwrap_or(defaults::AUTO_APPLY_MIN_CONFIDENCE);
        Self {
            auto_apply_min_confidence,
            ..Default::default()
        }
    }

    pub fn with_thresholds(mut self, thresholds: LevelThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}
