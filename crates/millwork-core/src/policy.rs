//! Tunable scoring policy.
//!
//! Every weight, threshold and standard-size table the scorer uses lives in
//! [`ScoringPolicy`]. The defaults come from [`crate::defaults`]; deployments
//! override them with a YAML file named by `MILLWORK_SCORING_POLICY`.
//!
//! ```yaml
//! weights:
//!   dimensions: 0.5
//!   labels: 0.05
//! thresholds:
//!   high: 85
//! require_components: false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::defaults;
use crate::error::{Error, Result};
use crate::models::ConfidenceLevel;

/// Env var naming a YAML policy file.
pub const POLICY_PATH_ENV: &str = "MILLWORK_SCORING_POLICY";

/// Relative weight of each rubric signal. Normalised by their sum when scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub dimensions: f64,
    pub validity: f64,
    pub components: f64,
    pub multi_view: f64,
    pub labels: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            dimensions: defaults::WEIGHT_DIMENSIONS,
            validity: defaults::WEIGHT_VALIDITY,
            components: defaults::WEIGHT_COMPONENTS,
            multi_view: defaults::WEIGHT_MULTI_VIEW,
            labels: defaults::WEIGHT_LABELS,
        }
    }
}

impl SignalWeights {
    pub fn sum(&self) -> f64 {
        self.dimensions + self.validity + self.components + self.multi_view + self.labels
    }

    fn as_pairs(&self) -> [(&'static str, f64); 5] {
        [
            ("dimensions", self.dimensions),
            ("validity", self.validity),
            ("components", self.components),
            ("multi_view", self.multi_view),
            ("labels", self.labels),
        ]
    }
}

/// Level boundaries on the total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelThresholds {
    pub high: f64,
    pub medium: f64,
}

impl LevelThresholds {
    /// Level for a total. Pure function of the total and the thresholds.
    pub fn level_for(&self, total: f64) -> ConfidenceLevel {
        if total >= self.high {
            ConfidenceLevel::High
        } else if total >= self.medium {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl Default for LevelThresholds {
    fn default() -> Self {
        Self {
            high: defaults::THRESHOLD_HIGH,
            medium: defaults::THRESHOLD_MEDIUM,
        }
    }
}

/// Plausible ranges; values outside are reported as issues.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlausibleRanges {
    pub width: (f64, f64),
    pub height: (f64, f64),
    pub depth: (f64, f64),
}

impl Default for PlausibleRanges {
    fn default() -> Self {
        Self {
            width: defaults::SCORE_WIDTH_RANGE,
            height: defaults::HEIGHT_RANGE,
            depth: defaults::DEPTH_RANGE,
        }
    }
}

/// A cabinet dimension the policy can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionField {
    Width,
    Height,
    Depth,
}

impl DimensionField {
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionField::Width => "width",
            DimensionField::Height => "height",
            DimensionField::Depth => "depth",
        }
    }
}

/// Complete scoring rubric configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub weights: SignalWeights,
    pub thresholds: LevelThresholds,
    /// Ceiling applied when required geometry is missing. Must be below
    /// `thresholds.medium`.
    pub incomplete_ceiling: f64,
    pub required_dimensions: Vec<DimensionField>,
    /// When set (the default), a candidate with no detected door, drawer or
    /// other sub-component is capped like one missing a required dimension.
    pub require_components: bool,
    pub tolerance: f64,
    pub standard_widths: Vec<f64>,
    pub standard_heights: Vec<f64>,
    pub standard_depths: Vec<f64>,
    pub ranges: PlausibleRanges,
    pub bbox_mismatch_tolerance: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            thresholds: LevelThresholds::default(),
            incomplete_ceiling: defaults::INCOMPLETE_CEILING,
            required_dimensions: vec![
                DimensionField::Width,
                DimensionField::Height,
                DimensionField::Depth,
            ],
            require_components: true,
            tolerance: defaults::DIMENSION_TOLERANCE,
            standard_widths: defaults::STANDARD_WIDTHS.to_vec(),
            standard_heights: defaults::STANDARD_HEIGHTS.to_vec(),
            standard_depths: defaults::STANDARD_DEPTHS.to_vec(),
            ranges: PlausibleRanges::default(),
            bbox_mismatch_tolerance: defaults::BBOX_MISMATCH_TOLERANCE,
        }
    }
}

impl ScoringPolicy {
    /// Parse and validate a YAML policy. Missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let policy: ScoringPolicy = serde_yaml::from_str(yaml)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let policy = Self::from_yaml_str(&raw)?;
        info!(path = %path.display(), "Loaded scoring policy");
        Ok(policy)
    }

    /// Policy from `MILLWORK_SCORING_POLICY`, or the defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(POLICY_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_path(path.trim()),
            _ => {
                debug!("No scoring policy file configured, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in self.weights.as_pairs() {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Config(format!(
                    "weight '{name}' must be a non-negative number, got {w}"
                )));
            }
        }
        if self.weights.sum() <= 0.0 {
            return Err(Error::Config("signal weights must not all be zero".into()));
        }
        let t = &self.thresholds;
        if !(0.0..=100.0).contains(&t.medium) || !(0.0..=100.0).contains(&t.high) {
            return Err(Error::Config("thresholds must lie in [0, 100]".into()));
        }
        if t.medium >= t.high {
            return Err(Error::Config(format!(
                "medium threshold ({}) must be below high threshold ({})",
                t.medium, t.high
            )));
        }
        if self.incomplete_ceiling < 0.0 || self.incomplete_ceiling >= t.medium {
            return Err(Error::Config(format!(
                "incomplete_ceiling ({}) must be below the medium threshold ({})",
                self.incomplete_ceiling, t.medium
            )));
        }
        if self.tolerance < 0.0 {
            return Err(Error::Config("tolerance must not be negative".into()));
        }
        Ok(())
    }

    pub fn level_for(&self, total: f64) -> ConfidenceLevel {
        self.thresholds.level_for(total)
    }

    /// Weight for a signal after normalisation.
    pub fn normalised_weight(&self, signal: &str) -> f64 {
        let sum = self.weights.sum();
        self.weights
            .as_pairs()
            .iter()
            .find(|(name, _)| *name == signal)
            .map(|(_, w)| w / sum)
            .unwrap_or(0.0)
    }
}
