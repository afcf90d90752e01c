//! Confidence scoring for extracted candidates.
//!
//! A weighted rubric over five independent signals, each scored 0–100 with
//! reason strings:
//!
//! | Signal | Raised by |
//! |--------|-----------|
//! | `dimensions` | width (40), height (35), depth (25) present |
//! | `validity` | share of present dimensions near a standard size |
//! | `components` | labels found (30), drawers (25), doors (25), U-drawer (10), lazy susan (10) |
//! | `multi_view` | elevation view (40), plan view (40), widths agree across views (20) |
//! | `labels` | group name (40), parsed identifier (30), matching text labels (30) |
//!
//! The total is the weight-normalised sum clamped to [0, 100]. When a required
//! dimension is missing, or no sub-component was detected, the total is capped
//! at the policy's incomplete ceiling, so naming heuristics alone can never
//! lift such a candidate out of the `low` band.

use std::collections::BTreeMap;

use crate::dimensions::{near_standard, nearest_standard, within};
use crate::models::{
    BatchSummary, Candidate, ConfidenceLevel, ConfidenceScore, DetectionSource, IssueKind,
    MeasuredDimension, MissingField, Orientation, ScoreIssue, ScoreSuggestion, SignalScore,
};
use crate::policy::{DimensionField, ScoringPolicy};

/// Scores candidates against a [`ScoringPolicy`]. Stateless apart from the
/// policy, so scoring one candidate never depends on another.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    policy: ScoringPolicy,
}

struct Signal {
    score: f64,
    reasons: Vec<String>,
}

impl ConfidenceScorer {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score one candidate.
    pub fn score(&self, candidate: &Candidate) -> ConfidenceScore {
        let signals = [
            ("dimensions", self.score_dimensions(candidate)),
            ("validity", self.score_validity(candidate)),
            ("components", self.score_components(candidate)),
            ("multi_view", self.score_multi_view(candidate)),
            ("labels", self.score_labels(candidate)),
        ];

        let mut details = BTreeMap::new();
        let mut total = 0.0;
        for (name, signal) in signals {
            let weight = self.policy.normalised_weight(name);
            let score = signal.score.clamp(0.0, 100.0);
            total += score * weight;
            details.insert(
                name.to_string(),
                SignalScore {
                    score: round2(score),
                    weight,
                    reasons: signal.reasons,
                },
            );
        }
        let mut total = round2(total.clamp(0.0, 100.0));

        let missing_required = self.missing_required(candidate);
        let capped = !missing_required.is_empty() && total > self.policy.incomplete_ceiling;
        if !missing_required.is_empty() {
            total = total.min(self.policy.incomplete_ceiling);
            if let Some(dims) = details.get_mut("dimensions") {
                dims.reasons.push(format!(
                    "Required geometry missing ({}); total capped at {}",
                    missing_required.join(", "),
                    self.policy.incomplete_ceiling
                ));
            }
        }

        let level = self.policy.level_for(total);
        let recommendations = self.recommendations(&details, level);

        ConfidenceScore {
            total,
            level,
            details,
            capped,
            missing_fields: missing_fields(candidate),
            issues: self.issues(candidate),
            recommendations,
        }
    }

    /// Score each candidate independently; element `i` equals `score(&candidates[i])`.
    pub fn batch_score(&self, candidates: &[Candidate]) -> Vec<ConfidenceScore> {
        candidates.iter().map(|c| self.score(c)).collect()
    }

    /// Level counts and average for a batch of scores.
    pub fn batch_summary(scores: &[ConfidenceScore]) -> BatchSummary {
        let count = |level| scores.iter().filter(|s| s.level == level).count();
        let average = if scores.is_empty() {
            0.0
        } else {
            round2(scores.iter().map(|s| s.total).sum::<f64>() / scores.len() as f64)
        };
        BatchSummary {
            total_candidates: scores.len(),
            average_score: average,
            high_confidence: count(ConfidenceLevel::High),
            medium_confidence: count(ConfidenceLevel::Medium),
            low_confidence: count(ConfidenceLevel::Low),
        }
    }

    fn missing_required(&self, candidate: &Candidate) -> Vec<&'static str> {
        let mut missing: Vec<&'static str> = self
            .policy
            .required_dimensions
            .iter()
            .filter(|field| {
                let value = match field {
                    DimensionField::Width => candidate.width,
                    DimensionField::Height => candidate.height,
                    DimensionField::Depth => candidate.depth,
                };
                !present(value)
            })
            .map(|field| field.as_str())
            .collect();
        if self.policy.require_components && candidate.components.is_empty() {
            missing.push("components");
        }
        missing
    }

    fn score_dimensions(&self, candidate: &Candidate) -> Signal {
        let mut score = 0.0;
        let mut reasons = Vec::new();
        for (field, value, points, hint) in [
            ("width", candidate.width, 40.0, "elevation"),
            ("height", candidate.height, 35.0, "elevation"),
            ("depth", candidate.depth, 25.0, "plan"),
        ] {
            match value {
                Some(v) if v > 0.0 => {
                    score += points;
                    reasons.push(format!("{field} found: {v}\""));
                }
                _ => reasons.push(format!("No {field} dimension found in {hint} view")),
            }
        }
        Signal { score, reasons }
    }

    fn score_validity(&self, candidate: &Candidate) -> Signal {
        let p = &self.policy;
        let mut reasons = Vec::new();
        let mut checked = 0u32;
        let mut passed = 0u32;

        for (field, value, standards) in [
            ("width", candidate.width, &p.standard_widths),
            ("height", candidate.height, &p.standard_heights),
            ("depth", candidate.depth, &p.standard_depths),
        ] {
            let Some(v) = value.filter(|v| *v > 0.0) else {
                continue;
            };
            checked += 1;
            if near_standard(v, standards, p.tolerance) {
                passed += 1;
                reasons.push(format!("Standard {field}"));
            } else {
                let nearest = nearest_standard(v, standards)
                    .map(|n| format!(" (nearest standard {n}\")"))
                    .unwrap_or_default();
                reasons.push(format!("Non-standard {field} {v}\"{nearest}"));
            }
        }

        if let Some(ratio) = height_width_ratio(candidate) {
            if !(0.1..=10.0).contains(&ratio) {
                reasons.push(format!(
                    "Unusual height/width ratio ({ratio:.2}), may indicate extraction error"
                ));
            }
        }

        let score = if checked > 0 {
            f64::from(passed) / f64::from(checked) * 100.0
        } else {
            reasons.push("No dimensions to validate".to_string());
            0.0
        };
        Signal { score, reasons }
    }

    fn score_components(&self, candidate: &Candidate) -> Signal {
        let c = &candidate.components;
        let mut score = 0.0;
        let mut reasons = Vec::new();

        if c.detected.is_empty() {
            reasons.push("No component labels detected".to_string());
        } else {
            score += 30.0;
            reasons.push(format!("{} component label(s) detected", c.detected.len()));
        }
        if c.drawer_count > 0 {
            score += 25.0;
            reasons.push(format!("{} drawer(s)", c.drawer_count));
        }
        if c.door_count > 0 {
            score += 25.0;
            reasons.push(format!("{} door(s)", c.door_count));
        }
        if c.has_u_shaped_drawer {
            score += 10.0;
            reasons.push("U-shaped drawer".to_string());
        }
        if c.has_lazy_susan {
            score += 10.0;
            reasons.push("Lazy susan".to_string());
        }
        Signal {
            score: f64::min(score, 100.0),
            reasons,
        }
    }

    fn score_multi_view(&self, candidate: &Candidate) -> Signal {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        match &candidate.elevation_view {
            Some(view) => {
                score += 40.0;
                reasons.push(format!("Elevation view matched: {}", view.label));
            }
            None => reasons.push("No elevation view matched".to_string()),
        }
        match &candidate.plan_view {
            Some(view) => {
                score += 40.0;
                reasons.push(format!("Plan view matched: {}", view.label));
            }
            None => reasons.push("No plan view matched".to_string()),
        }

        let elevation_width = max_horizontal(&candidate.elevation_dims);
        let plan_width = max_horizontal(&candidate.plan_dims);
        if let (Some(e), Some(p)) = (elevation_width, plan_width) {
            let diff = (e - p).abs();
            if diff <= self.policy.tolerance {
                score += 20.0;
                reasons.push(format!("Widths agree across views (difference {diff:.2}\")"));
            } else {
                reasons.push(format!(
                    "Width mismatch: elevation {e}\" vs plan {p}\""
                ));
            }
        }
        Signal { score, reasons }
    }

    fn score_labels(&self, candidate: &Candidate) -> Signal {
        let mut score = 0.0;
        let mut reasons = Vec::new();

        if !candidate.name.trim().is_empty() {
            score += 40.0;
            reasons.push(format!("Group name: {}", candidate.name));
        }
        if !candidate.identifier.is_empty() && candidate.identifier != candidate.name {
            score += 30.0;
            reasons.push(format!("Identifier: {}", candidate.identifier));
        }
        if candidate.labels.is_empty() {
            reasons.push("No text labels matched to this cabinet".to_string());
        } else {
            score += 30.0;
            reasons.push(format!("{} matching label(s)", candidate.labels.len()));
        }
        Signal { score, reasons }
    }

    fn issues(&self, candidate: &Candidate) -> Vec<ScoreIssue> {
        let ranges = &self.policy.ranges;
        let mut issues = Vec::new();

        for (field, value, range) in [
            ("width", candidate.width, ranges.width),
            ("height", candidate.height, ranges.height),
            ("depth", candidate.depth, ranges.depth),
        ] {
            if let Some(v) = value.filter(|v| *v > 0.0) {
                if !within(v, range) {
                    issues.push(ScoreIssue {
                        kind: IssueKind::DimensionOutOfRange,
                        field: field.to_string(),
                        value: Some(v),
                        message: format!(
                            "{} outside typical cabinet range ({}-{}\")",
                            capitalize(field),
                            range.0,
                            range.1
                        ),
                    });
                }
            }
        }

        if let Some(ratio) = height_width_ratio(candidate) {
            if !(0.1..=10.0).contains(&ratio) {
                issues.push(ScoreIssue {
                    kind: IssueKind::UnusualRatio,
                    field: "height".to_string(),
                    value: Some(round2(ratio)),
                    message: "Unusual height/width ratio".to_string(),
                });
            }
        }

        if let (Some(bbox), Some(width)) = (&candidate.bounding_box, candidate.width) {
            let bbox_width = bbox.width();
            if width > 0.0 && (bbox_width - width).abs() > self.policy.bbox_mismatch_tolerance {
                issues.push(ScoreIssue {
                    kind: IssueKind::BoundingBoxMismatch,
                    field: "width".to_string(),
                    value: Some(bbox_width),
                    message: format!(
                        "Extracted width {width}\" differs significantly from bounding box {bbox_width}\""
                    ),
                });
            }
        }
        issues
    }

    fn recommendations(
        &self,
        details: &BTreeMap<String, SignalScore>,
        level: ConfidenceLevel,
    ) -> Vec<ScoreSuggestion> {
        let sub = |name: &str| details.get(name).map(|s| s.score).unwrap_or(0.0);
        let mut out = Vec::new();
        let mut push = |priority: &str, area: &str, action: &str| {
            out.push(ScoreSuggestion {
                priority: priority.to_string(),
                area: area.to_string(),
                action: action.to_string(),
            })
        };

        if sub("dimensions") < 70.0 {
            push(
                "high",
                "dimensions",
                "Verify missing dimensions manually from the CAD drawing",
            );
        }
        if sub("validity") < 50.0 {
            push(
                "medium",
                "validity",
                "Check if non-standard dimensions are intentional",
            );
        }
        if sub("multi_view") < 50.0 {
            push(
                "medium",
                "views",
                "Ensure cabinet appears in both plan and elevation views",
            );
        }
        match level {
            ConfidenceLevel::Low => push("high", "review", "Manual review required before import"),
            ConfidenceLevel::Medium => push(
                "medium",
                "review",
                "Interpretation suggested; review corrections before import",
            ),
            ConfidenceLevel::High => {}
        }
        out
    }
}

/// A candidate needs human disambiguation regardless of its level when it was
/// assembled from a label search or when scoring found concrete problems.
pub fn is_ambiguous(candidate: &Candidate, score: &ConfidenceScore) -> bool {
    candidate.detected_from == DetectionSource::LabelSearch || !score.issues.is_empty()
}

fn missing_fields(candidate: &Candidate) -> Vec<MissingField> {
    let mut missing = Vec::new();
    let mut push = |field: &str, importance: &str, suggestion: &str| {
        missing.push(MissingField {
            field: field.to_string(),
            importance: importance.to_string(),
            suggestion: suggestion.to_string(),
        })
    };
    if !present(candidate.width) {
        push(
            "width",
            "critical",
            "Check elevation view for horizontal dimension",
        );
    }
    if !present(candidate.height) {
        push(
            "height",
            "critical",
            "Check elevation view for vertical dimension",
        );
    }
    if !present(candidate.depth) {
        push("depth", "high", "Check plan view for depth dimension");
    }
    let c = &candidate.components;
    if c.drawer_count == 0 && c.door_count == 0 {
        push(
            "components",
            "medium",
            "No doors or drawers detected, verify cabinet type",
        );
    }
    missing
}

fn present(value: Option<f64>) -> bool {
    matches!(value, Some(v) if v > 0.0 && v.is_finite())
}

fn height_width_ratio(candidate: &Candidate) -> Option<f64> {
    match (candidate.width, candidate.height) {
        (Some(w), Some(h)) if w > 0.0 && h > 0.0 => Some(h / w),
        _ => None,
    }
}

fn max_horizontal(dims: &[MeasuredDimension]) -> Option<f64> {
    dims.iter()
        .filter(|d| d.orientation == Orientation::Horizontal)
        .map(|d| d.value)
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        BoundingBox, ComponentKind, DetectedComponent, TextLabel, ViewKind, ViewRegion,
    };

    fn view(kind: ViewKind, label: &str) -> ViewRegion {
        ViewRegion {
            label: label.to_string(),
            kind,
            center: [0.0, 0.0],
            x_min: -250.0,
            x_max: 250.0,
            y_min: -100.0,
            y_max: 300.0,
        }
    }

    fn dim(value: f64, orientation: Orientation) -> MeasuredDimension {
        MeasuredDimension {
            id: String::new(),
            text: value.to_string(),
            value,
            orientation,
            layer: None,
        }
    }

    fn label(text: &str) -> TextLabel {
        TextLabel {
            id: String::new(),
            text: text.to_string(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            layer: None,
        }
    }

    fn component(kind: ComponentKind) -> DetectedComponent {
        DetectedComponent {
            kind,
            label: kind.as_str().to_string(),
            x: 0.0,
            y: 0.0,
        }
    }

    /// A well-documented 36" vanity seen in both views.
    fn strong_candidate() -> Candidate {
        let mut c = Candidate::named("Austin-Van").with_dimensions(36.0, 34.5, 21.0);
        c.bounding_box = Some(BoundingBox::new([0.0, 0.0, 0.0], [36.0, 21.0, 34.5]));
        c.elevation_view = Some(view(ViewKind::Elevation, "Elevation"));
        c.plan_view = Some(view(ViewKind::Plan, "Plan View"));
        c.elevation_dims = vec![dim(36.0, Orientation::Horizontal), dim(34.5, Orientation::Vertical)];
        c.plan_dims = vec![dim(36.0, Orientation::Horizontal), dim(21.0, Orientation::Vertical)];
        c.components.record(component(ComponentKind::Drawer));
        c.components.record(component(ComponentKind::Door));
        c.components.record(component(ComponentKind::Door));
        c.labels = vec![label("Austin-Van")];
        c
    }

    #[test]
    fn test_strong_candidate_scores_high() {
        let scorer = ConfidenceScorer::default();
        let score = scorer.score(&strong_candidate());
        assert_eq!(score.level, ConfidenceLevel::High);
        assert!(score.total >= 80.0, "total was {}", score.total);
        assert!(!score.capped);
        assert!(score.issues.is_empty());
        assert_eq!(score.details.len(), 5);
        assert_eq!(score.details["dimensions"].score, 100.0);
        assert_eq!(score.details["validity"].score, 100.0);
    }

    #[test]
    fn test_total_is_clamped_and_bounded() {
        let scorer = ConfidenceScorer::default();
        let score = scorer.score(&strong_candidate());
        assert!((0.0..=100.0).contains(&score.total));
    }

    #[test]
    fn test_missing_all_geometry_is_low_despite_naming() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.width = None;
        c.height = None;
        c.depth = None;
        let score = scorer.score(&c);
        assert_eq!(score.level, ConfidenceLevel::Low);
        assert!(score.total < 50.0);
    }

    #[test]
    fn test_missing_one_required_dimension_caps_total() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.depth = None;
        let score = scorer.score(&c);
        assert!(score.capped);
        assert_eq!(score.total, scorer.policy().incomplete_ceiling);
        assert_eq!(score.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_cap_holds_even_with_weights_skewed_to_labels() {
        let policy = ScoringPolicy::from_yaml_str(
            "weights:\n  dimensions: 0\n  validity: 0\n  components: 0\n  multi_view: 0\n  labels: 1\n",
        )
        .unwrap();
        let scorer = ConfidenceScorer::new(policy);
        let mut c = strong_candidate();
        c.width = None;
        c.height = None;
        c.depth = None;
        let score = scorer.score(&c);
        assert!(score.total < 50.0);
        assert!(score.capped);
    }

    #[test]
    fn test_default_policy_caps_candidate_without_components() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.components = Default::default();
        let score = scorer.score(&c);
        assert!(score.total < 50.0, "total was {}", score.total);
        assert!(score.capped);
        assert_eq!(score.level, ConfidenceLevel::Low);
        assert!(score.details["dimensions"]
            .reasons
            .iter()
            .any(|r| r.contains("components")));
    }

    #[test]
    fn test_components_requirement_can_be_relaxed() {
        let policy = ScoringPolicy::from_yaml_str("require_components: false\n").unwrap();
        let scorer = ConfidenceScorer::new(policy);
        let mut c = strong_candidate();
        c.components = Default::default();
        let score = scorer.score(&c);
        assert!(!score.capped);
        assert!(score.total >= 50.0, "total was {}", score.total);
    }

    #[test]
    fn test_batch_equals_individual() {
        let scorer = ConfidenceScorer::default();
        let mut weak = Candidate::named("Pantry");
        weak.height = Some(84.0);
        let mut odd = strong_candidate();
        odd.width = Some(31.7);
        let candidates = vec![strong_candidate(), weak, odd];

        let batch = scorer.batch_score(&candidates);
        let single: Vec<_> = candidates.iter().map(|c| scorer.score(c)).collect();
        assert_eq!(batch, single);

        let reversed: Vec<_> = candidates.iter().rev().cloned().collect();
        let mut batch_rev = scorer.batch_score(&reversed);
        batch_rev.reverse();
        assert_eq!(batch_rev, batch);
    }

    #[test]
    fn test_non_standard_width_lowers_validity() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.width = Some(31.7);
        let score = scorer.score(&c);
        let validity = &score.details["validity"];
        assert!((validity.score - 66.67).abs() < 0.01);
        assert!(validity
            .reasons
            .iter()
            .any(|r| r.starts_with("Non-standard width")));
    }

    #[test]
    fn test_bounding_box_mismatch_issue() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.bounding_box = Some(BoundingBox::new([0.0, 0.0, 0.0], [48.0, 21.0, 34.5]));
        let score = scorer.score(&c);
        assert!(score
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::BoundingBoxMismatch));
        assert!(is_ambiguous(&c, &score));
    }

    #[test]
    fn test_out_of_range_issue() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.depth = Some(40.0);
        let score = scorer.score(&c);
        assert!(score
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::DimensionOutOfRange && i.field == "depth"));
    }

    #[test]
    fn test_label_search_candidates_are_ambiguous() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.detected_from = DetectionSource::LabelSearch;
        let score = scorer.score(&c);
        assert!(is_ambiguous(&c, &score));
        assert!(!is_ambiguous(&strong_candidate(), &scorer.score(&strong_candidate())));
    }

    #[test]
    fn test_multi_view_width_correlation() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.plan_dims = vec![dim(30.0, Orientation::Horizontal)];
        let score = scorer.score(&c);
        assert_eq!(score.details["multi_view"].score, 80.0);
    }

    #[test]
    fn test_components_capped_at_100() {
        let scorer = ConfidenceScorer::default();
        let mut c = strong_candidate();
        c.components.record(component(ComponentKind::UShapedDrawer));
        c.components.record(component(ComponentKind::LazySusan));
        let score = scorer.score(&c);
        assert_eq!(score.details["components"].score, 100.0);
    }

    #[test]
    fn test_low_level_recommends_manual_review() {
        let scorer = ConfidenceScorer::default();
        let score = scorer.score(&Candidate::named("Cab-1"));
        assert_eq!(score.level, ConfidenceLevel::Low);
        assert!(score
            .recommendations
            .iter()
            .any(|r| r.area == "review" && r.priority == "high"));
        assert!(score.missing_fields.iter().any(|m| m.field == "width"));
    }

    #[test]
    fn test_batch_summary_counts() {
        let scorer = ConfidenceScorer::default();
        let scores = scorer.batch_score(&[strong_candidate(), Candidate::named("Cab-1")]);
        let summary = ConfidenceScorer::batch_summary(&scores);
        assert_eq!(summary.total_candidates, 2);
        assert_eq!(summary.high_confidence, 1);
        assert_eq!(summary.low_confidence, 1);
        assert_eq!(ConfidenceScorer::batch_summary(&[]).average_score, 0.0);
    }
}
