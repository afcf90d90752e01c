//! Cabinet extraction from a CAD document.
//!
//! The extractor reads everything it needs from the connector up front
//! (groups, text, dimensions, blocks) and then works on that snapshot with
//! pure functions. Given an unchanged document it returns the same result on
//! every call.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

use millwork_core::defaults::{
    COMMON_DEPTHS, COMPONENT_LABEL_MARGIN, DEPTH_CANDIDATE_RANGE, FACE_FRAME_RANGE,
    FIXTURE_TOLERANCE, HEIGHT_CANDIDATE_RANGE, LABEL_COMPONENT_RADIUS, LABEL_DIMENSION_RADIUS,
    VIEW_ABOVE, VIEW_BELOW, VIEW_HALF_WIDTH, WIDTH_CANDIDATE_RANGE,
};
use millwork_core::dimensions::{parse_dimension_text, within};
use millwork_core::{
    identifier_from_group, BlockInstance, BoundingBox, CadConnector, CadLayer, Candidate,
    ComponentCounts, ComponentKind, DetectedComponent, DetectionSource, DimensionAnnotation,
    DocumentInfo, ExtractionResult, ExtractionWarning, FaceFrame, Fixture, MeasuredDimension,
    Orientation, Result, TextLabel, ViewKind, ViewRegion,
};

// =============================================================================
// PATTERNS
// =============================================================================

const VIEW_PATTERNS: &[(ViewKind, &[&str])] = &[
    (ViewKind::Plan, &["plan view", "plan", "layout"]),
    (
        ViewKind::Elevation,
        &["elevation", "wall elevation", "front view", "elev"],
    ),
    (ViewKind::Detail, &["detail", "section", "close-up"]),
];

static CABINET_GROUP_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^[A-Z][a-z]+-[A-Z][A-Za-z/]+$",
        r"^[A-Z][a-z]+-\d+$",
        r"(?i)^Cabinet[-_]?\d+$",
        r"(?i)^Cab[-_]?\d+$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static SHORT_GROUP_EXCEPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[A-Z]\d{1,2}$").expect("static regex"));

const CABINET_KEYWORDS: &[&str] = &["van", "vanity", "w/d", "base", "wall", "tall", "pantry", "sink"];

/// Component label patterns, checked in order; a label counts once, as the
/// first kind that matches.
static COMPONENT_PATTERNS: Lazy<Vec<(ComponentKind, Regex)>> = Lazy::new(|| {
    [
        (ComponentKind::UShapedDrawer, r"(?i)u-shaped drawer|u-drawer|trash"),
        (ComponentKind::Drawer, r"(?i)drawer|\bdwr\b|\bdrw\b"),
        (ComponentKind::Door, r"(?i)door|\bdr\b"),
        (ComponentKind::Shelf, r"(?i)shelf|\bsh\b"),
        (ComponentKind::Pullout, r"(?i)pull-?\s?out"),
        (ComponentKind::LazySusan, r"(?i)lazy susan|\bls\b|spinning"),
    ]
    .into_iter()
    .map(|(kind, p)| (kind, Regex::new(p).expect("static regex")))
    .collect()
});

static LABEL_CABINET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([A-Z][a-z]*-?(?:Van(?:ity)?|W/D|Base|Wall|Tall|Sink))").expect("static regex")
});

// =============================================================================
// REPORTS
// =============================================================================

/// Quick read-only overview of the open document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub document_info: DocumentInfo,
    pub layer_count: usize,
    pub layers: Vec<CadLayer>,
    pub group_count: usize,
    pub groups: Vec<String>,
    pub text_label_count: usize,
    pub potential_cabinet_groups: Vec<String>,
}

/// View titles grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewsByKind {
    pub plan: Vec<String>,
    pub elevation: Vec<String>,
    pub detail: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewAnalysis {
    pub view_count: usize,
    pub views_by_type: ViewsByKind,
    pub all_views: Vec<ViewRegion>,
}

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Turns the groups of a CAD document into cabinet candidates.
pub struct DataExtractor {
    connector: Arc<dyn CadConnector>,
}

/// Everything the extractor reads from the document, fetched once.
struct Snapshot {
    texts: Vec<TextLabel>,
    dims: Vec<DimensionAnnotation>,
    views: Vec<ViewRegion>,
    fixtures: Vec<Fixture>,
}

impl DataExtractor {
    pub fn new(connector: Arc<dyn CadConnector>) -> Self {
        Self { connector }
    }

    pub fn connector(&self) -> &Arc<dyn CadConnector> {
        &self.connector
    }

    /// Extract cabinet candidates from the open document.
    ///
    /// A group that cannot be measured is skipped and reported in
    /// `warnings`; only a failure to read the document itself is an error.
    #[instrument(skip(self), fields(subsystem = "cad", component = "extractor", op = "extract"))]
    pub async fn extract(&self, include_fixtures: bool) -> Result<ExtractionResult> {
        let start = Instant::now();

        let mut groups = self.connector.groups().await?;
        let texts = self.connector.text_objects().await?;
        let dims = self.connector.dimensions().await?;
        let fixtures = if include_fixtures {
            fixtures_from_blocks(&self.connector.block_instances().await?)
        } else {
            Vec::new()
        };
        let views = detect_views(&texts);

        let groups_found = groups.len();
        groups.sort();
        groups.dedup();
        debug!(
            groups = groups_found,
            text_labels = texts.len(),
            dimensions = dims.len(),
            views = views.len(),
            fixtures = fixtures.len(),
            "Document snapshot loaded"
        );

        let snapshot = Snapshot {
            texts,
            dims,
            views,
            fixtures,
        };

        let mut candidates = Vec::new();
        let mut warnings = Vec::new();
        let mut qualifying = 0usize;

        for group in groups.iter().filter(|g| is_cabinet_group(g)) {
            qualifying += 1;
            let bbox = match self.connector.group_bounding_box(group).await {
                Ok(Some(bbox)) => bbox,
                Ok(None) => {
                    warnings.push(group_warning(group, "group has no measurable geometry"));
                    continue;
                }
                Err(e) => {
                    warnings.push(group_warning(group, &format!("bounding box unavailable: {e}")));
                    continue;
                }
            };
            if let Some(problem) = bbox_problem(&bbox) {
                warnings.push(group_warning(group, problem));
                continue;
            }
            trace!(group_name = %group, "Building candidate");
            candidates.push(build_group_candidate(group, bbox, &snapshot));
        }

        if candidates.is_empty() && qualifying == 0 {
            candidates = label_search_candidates(&snapshot);
            if !candidates.is_empty() {
                debug!(
                    candidate_count = candidates.len(),
                    "No cabinet groups, fell back to label search"
                );
            }
        }

        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        for w in &warnings {
            warn!(group_name = w.group.as_deref().unwrap_or_default(), message = %w.message, "Group skipped");
        }
        info!(
            candidate_count = candidates.len(),
            warning_count = warnings.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Extraction complete"
        );

        Ok(ExtractionResult {
            candidates,
            fixtures: snapshot.fixtures,
            views: snapshot.views,
            warnings,
            groups_found,
        })
    }

    /// Document info, layers, groups and which groups look like cabinets.
    #[instrument(skip(self), fields(subsystem = "cad", component = "extractor", op = "document_summary"))]
    pub async fn document_summary(&self) -> Result<DocumentSummary> {
        let document_info = self.connector.document_info().await?;
        let layers = self.connector.layers().await?;
        let groups = self.connector.groups().await?;
        let texts = self.connector.text_objects().await?;

        let potential_cabinet_groups = groups
            .iter()
            .filter(|g| is_cabinet_group(g))
            .cloned()
            .collect();
        Ok(DocumentSummary {
            document_info,
            layer_count: layers.len(),
            layers,
            group_count: groups.len(),
            groups,
            text_label_count: texts.len(),
            potential_cabinet_groups,
        })
    }

    pub async fn analyze_views(&self) -> Result<ViewAnalysis> {
        let texts = self.connector.text_objects().await?;
        Ok(view_analysis(detect_views(&texts)))
    }
}

fn group_warning(group: &str, message: &str) -> ExtractionWarning {
    ExtractionWarning {
        group: Some(group.to_string()),
        message: message.to_string(),
    }
}

fn bbox_problem(bbox: &BoundingBox) -> Option<&'static str> {
    let coords = bbox.min.iter().chain(bbox.max.iter());
    if coords.into_iter().any(|c| !c.is_finite()) {
        return Some("bounding box has non-finite coordinates");
    }
    if bbox.width() <= 0.0 && bbox.depth() <= 0.0 && bbox.height() <= 0.0 {
        return Some("bounding box is degenerate");
    }
    None
}

pub fn view_analysis(views: Vec<ViewRegion>) -> ViewAnalysis {
    let mut by_kind = ViewsByKind::default();
    for view in &views {
        let bucket = match view.kind {
            ViewKind::Plan => &mut by_kind.plan,
            ViewKind::Elevation => &mut by_kind.elevation,
            ViewKind::Detail => &mut by_kind.detail,
        };
        bucket.push(view.label.clone());
    }
    ViewAnalysis {
        view_count: views.len(),
        views_by_type: by_kind,
        all_views: views,
    }
}

// =============================================================================
// GROUPS AND VIEWS
// =============================================================================

/// True when a group name follows the cabinet naming conventions.
pub fn is_cabinet_group(name: &str) -> bool {
    if name.chars().count() <= 3 && !SHORT_GROUP_EXCEPTION.is_match(name) {
        return false;
    }
    if CABINET_GROUP_PATTERNS.iter().any(|re| re.is_match(name)) {
        return true;
    }
    let lower = name.to_lowercase();
    CABINET_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub fn detect_view_kind(text: &str) -> Option<ViewKind> {
    let lower = text.to_lowercase();
    VIEW_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|p| lower.contains(p)))
        .map(|(kind, _)| *kind)
}

/// One view per title label, with its search window.
pub fn detect_views(texts: &[TextLabel]) -> Vec<ViewRegion> {
    texts
        .iter()
        .filter_map(|label| {
            detect_view_kind(&label.text).map(|kind| ViewRegion {
                label: label.text.clone(),
                kind,
                center: [label.x, label.y],
                x_min: label.x - VIEW_HALF_WIDTH,
                x_max: label.x + VIEW_HALF_WIDTH,
                y_min: label.y - VIEW_ABOVE,
                y_max: label.y + VIEW_BELOW,
            })
        })
        .collect()
}

/// Text labels naming the group: the full name, its identifier, or the name
/// with dashes read as spaces.
pub fn cabinet_labels(group: &str, texts: &[TextLabel]) -> Vec<TextLabel> {
    let group_lower = group.to_lowercase();
    let identifier = identifier_from_group(group).to_lowercase();
    let spaced = group_lower.replace('-', " ");
    texts
        .iter()
        .filter(|label| {
            let text = label.text.to_lowercase();
            text.contains(&group_lower) || text.contains(&identifier) || text.contains(&spaced)
        })
        .cloned()
        .collect()
}

fn view_containing(views: &[ViewRegion], labels: &[TextLabel], kind: ViewKind) -> Option<ViewRegion> {
    views
        .iter()
        .filter(|v| v.kind == kind)
        .find(|v| labels.iter().any(|l| v.contains(l.x, l.y)))
        .cloned()
}

// =============================================================================
// DIMENSIONS
// =============================================================================

/// Orientation from the layer name, then from typical value ranges.
pub fn infer_orientation(layer: Option<&str>, value: Option<f64>) -> Orientation {
    let layer = layer.unwrap_or_default().to_lowercase();
    if layer.contains("height") || layer.contains("vert") {
        return Orientation::Vertical;
    }
    if layer.contains("width") || layer.contains("horiz") {
        return Orientation::Horizontal;
    }
    match value {
        Some(v) if within(v, FACE_FRAME_RANGE) => Orientation::Horizontal,
        Some(v) if within(v, (30.0, 96.0)) => Orientation::Vertical,
        Some(v) if within(v, (9.0, 48.0)) => Orientation::Horizontal,
        _ => Orientation::Unknown,
    }
}

fn measure(dim: &DimensionAnnotation) -> Option<MeasuredDimension> {
    let value = dim.value.or_else(|| parse_dimension_text(&dim.text))?;
    Some(MeasuredDimension {
        id: dim.id.clone(),
        text: dim.text.clone(),
        value,
        orientation: infer_orientation(dim.layer.as_deref(), Some(value)),
        layer: dim.layer.clone(),
    })
}

fn dims_where(
    dims: &[DimensionAnnotation],
    keep: impl Fn(f64, f64) -> bool,
) -> Vec<MeasuredDimension> {
    dims.iter()
        .filter(|d| d.center.map_or(false, |c| keep(c[0], c[1])))
        .filter_map(measure)
        .collect()
}

fn largest(dims: &[MeasuredDimension], orientation: Orientation, range: (f64, f64)) -> Option<f64> {
    dims.iter()
        .filter(|d| d.orientation == orientation && within(d.value, range))
        .map(|d| d.value)
        .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
}

/// Largest vertical dimension in the cabinet height range.
pub fn likely_height(dims: &[MeasuredDimension]) -> Option<f64> {
    largest(dims, Orientation::Vertical, HEIGHT_CANDIDATE_RANGE)
}

/// Largest horizontal dimension in the cabinet width range.
pub fn likely_width(dims: &[MeasuredDimension]) -> Option<f64> {
    largest(dims, Orientation::Horizontal, WIDTH_CANDIDATE_RANGE)
}

/// The depth-range dimension closest to a common cabinet depth. Ties keep the
/// first dimension seen.
pub fn likely_depth(dims: &[MeasuredDimension]) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for value in dims
        .iter()
        .map(|d| d.value)
        .filter(|v| within(*v, DEPTH_CANDIDATE_RANGE))
    {
        for common in COMMON_DEPTHS {
            let distance = (value - common).abs();
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, value));
            }
        }
    }
    best.map(|(_, value)| value)
}

/// First horizontal face frame member is the stile, first vertical the rail.
pub fn face_frame(dims: &[MeasuredDimension]) -> FaceFrame {
    let mut frame = FaceFrame::default();
    for dim in dims.iter().filter(|d| within(d.value, FACE_FRAME_RANGE)) {
        match dim.orientation {
            Orientation::Horizontal if frame.stile_width.is_none() => {
                frame.stile_width = Some(dim.value)
            }
            Orientation::Vertical if frame.rail_width.is_none() => {
                frame.rail_width = Some(dim.value)
            }
            _ => {}
        }
    }
    frame
}

// =============================================================================
// COMPONENTS AND FIXTURES
// =============================================================================

pub fn component_kind(text: &str) -> Option<ComponentKind> {
    COMPONENT_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(text))
        .map(|(kind, _)| *kind)
}

/// Tally component labels accepted by `near`.
pub fn count_components<'a>(
    labels: impl IntoIterator<Item = &'a TextLabel>,
    near: impl Fn(&TextLabel) -> bool,
) -> ComponentCounts {
    let mut counts = ComponentCounts::default();
    for label in labels.into_iter().filter(|l| near(l)) {
        if let Some(kind) = component_kind(&label.text) {
            counts.record(DetectedComponent {
                kind,
                label: label.text.clone(),
                x: label.x,
                y: label.y,
            });
        }
    }
    counts
}

/// Blocks carrying product data (PRODUCT, MODELNUMBER or MODEL).
pub fn fixtures_from_blocks(blocks: &[BlockInstance]) -> Vec<Fixture> {
    blocks
        .iter()
        .filter(|b| {
            ["PRODUCT", "MODELNUMBER", "MODEL"]
                .iter()
                .any(|k| b.attributes.contains_key(*k))
        })
        .map(|b| {
            let attr = |key: &str| b.attributes.get(key).cloned();
            Fixture {
                block_name: if b.block_name.is_empty() {
                    "Unknown".to_string()
                } else {
                    b.block_name.clone()
                },
                product: attr("PRODUCT"),
                model: attr("MODELNUMBER").or_else(|| attr("MODEL")),
                manufacturer: attr("MANUFACTURER"),
                material: attr("MATERIAL"),
                position: b.insertion_point,
                attributes: b.attributes.clone(),
            }
        })
        .collect()
}

pub fn fixtures_near(fixtures: &[Fixture], bbox: &BoundingBox) -> Vec<Fixture> {
    fixtures
        .iter()
        .filter(|f| bbox.contains_xy(f.position[0], f.position[1], FIXTURE_TOLERANCE))
        .cloned()
        .collect()
}

fn material_hints(fixtures: &[Fixture]) -> Vec<String> {
    fixtures
        .iter()
        .filter_map(|f| f.material.clone())
        .filter(|m| !m.trim().is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// =============================================================================
// CANDIDATES
// =============================================================================

fn build_group_candidate(group: &str, bbox: BoundingBox, snapshot: &Snapshot) -> Candidate {
    let labels = cabinet_labels(group, &snapshot.texts);
    let elevation_view = view_containing(&snapshot.views, &labels, ViewKind::Elevation);
    let plan_view = view_containing(&snapshot.views, &labels, ViewKind::Plan);

    let elevation_dims = elevation_view
        .as_ref()
        .map(|v| dims_where(&snapshot.dims, |x, y| v.contains(x, y)))
        .unwrap_or_default();
    let plan_dims = plan_view
        .as_ref()
        .map(|v| dims_where(&snapshot.dims, |x, y| v.contains(x, y)))
        .unwrap_or_default();

    let positive = |v: f64| (v > 0.0).then_some(v);
    let width = likely_width(&elevation_dims)
        .or_else(|| likely_width(&plan_dims))
        .or_else(|| positive(bbox.width()));
    let height = likely_height(&elevation_dims).or_else(|| positive(bbox.height()));
    let depth = likely_depth(&plan_dims).or_else(|| positive(bbox.depth()));

    let mut components = count_components(&snapshot.texts, |l| {
        bbox.contains_xy(l.x, l.y, COMPONENT_LABEL_MARGIN)
    });
    if components.is_empty() && !labels.is_empty() {
        components = count_components(&snapshot.texts, |l| {
            labels.iter().any(|c| {
                (l.x - c.x).abs() <= LABEL_COMPONENT_RADIUS
                    && (l.y - c.y).abs() <= LABEL_COMPONENT_RADIUS
            })
        });
    }

    let fixtures = fixtures_near(&snapshot.fixtures, &bbox);
    let material_hints = material_hints(&fixtures);

    Candidate {
        name: group.to_string(),
        identifier: identifier_from_group(group),
        width,
        height,
        depth,
        bounding_box: Some(bbox),
        layer: None,
        face_frame: face_frame(&elevation_dims),
        elevation_view,
        plan_view,
        elevation_dims,
        plan_dims,
        components,
        fixtures,
        labels,
        material_hints,
        detected_from: DetectionSource::Group,
    }
}

/// Candidates assembled around cabinet-like text labels when the document has
/// no usable groups. Each identifier is used once; a candidate needs at least
/// a width or a height.
fn label_search_candidates(snapshot: &Snapshot) -> Vec<Candidate> {
    let mut seen = BTreeSet::new();
    let mut candidates = Vec::new();

    for label in &snapshot.texts {
        let Some(caps) = LABEL_CABINET_PATTERN.captures(&label.text) else {
            continue;
        };
        let identifier = caps[1].to_string();
        if !seen.insert(identifier.clone()) {
            continue;
        }

        let (x, y) = (label.x, label.y);
        let dims = dims_where(&snapshot.dims, |dx, dy| {
            (dx - x).abs() <= LABEL_DIMENSION_RADIUS && (dy - y).abs() <= LABEL_DIMENSION_RADIUS
        });
        let width = likely_width(&dims);
        let height = likely_height(&dims);
        if width.is_none() && height.is_none() {
            continue;
        }

        let components = count_components(&snapshot.texts, |l| {
            (l.x - x).abs() <= LABEL_COMPONENT_RADIUS && (l.y - y).abs() <= LABEL_COMPONENT_RADIUS
        });

        candidates.push(Candidate {
            name: identifier.clone(),
            identifier,
            width,
            height,
            depth: likely_depth(&dims),
            face_frame: face_frame(&dims),
            elevation_dims: dims,
            components,
            labels: vec![label.clone()],
            detected_from: DetectionSource::LabelSearch,
            ..Default::default()
        });
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(text: &str, x: f64, y: f64) -> TextLabel {
        TextLabel {
            id: text.to_string(),
            text: text.to_string(),
            x,
            y,
            z: 0.0,
            layer: None,
        }
    }

    fn measured(value: f64, orientation: Orientation) -> MeasuredDimension {
        MeasuredDimension {
            id: String::new(),
            text: value.to_string(),
            value,
            orientation,
            layer: None,
        }
    }

    #[test]
    fn test_cabinet_group_patterns() {
        for name in ["Austin-Van", "Austin-W/D", "Austin-1", "Cabinet-1", "Cab_2", "Pantry"] {
            assert!(is_cabinet_group(name), "{name} should be a cabinet group");
        }
        for name in ["Dim", "Layer 3", "Annotations", "ab"] {
            assert!(!is_cabinet_group(name), "{name} should not be a cabinet group");
        }
    }

    #[test]
    fn test_detect_view_kind() {
        assert_eq!(detect_view_kind("Plan View"), Some(ViewKind::Plan));
        assert_eq!(detect_view_kind("FRONT VIEW"), Some(ViewKind::Elevation));
        assert_eq!(detect_view_kind("Wall Elevation B"), Some(ViewKind::Elevation));
        assert_eq!(detect_view_kind("Section A-A"), Some(ViewKind::Detail));
        assert_eq!(detect_view_kind("Austin-Van"), None);
    }

    #[test]
    fn test_view_window() {
        let views = detect_views(&[label("Elevation", 100.0, 50.0)]);
        assert_eq!(views.len(), 1);
        let v = &views[0];
        assert_eq!((v.x_min, v.x_max), (-150.0, 350.0));
        assert_eq!((v.y_min, v.y_max), (-50.0, 350.0));
    }

    #[test]
    fn test_infer_orientation() {
        assert_eq!(infer_orientation(Some("DIM-Height"), Some(12.0)), Orientation::Vertical);
        assert_eq!(infer_orientation(Some("Horiz"), Some(80.0)), Orientation::Horizontal);
        assert_eq!(infer_orientation(None, Some(1.75)), Orientation::Horizontal);
        assert_eq!(infer_orientation(None, Some(34.5)), Orientation::Vertical);
        assert_eq!(infer_orientation(None, Some(24.0)), Orientation::Horizontal);
        assert_eq!(infer_orientation(None, Some(120.0)), Orientation::Unknown);
        assert_eq!(infer_orientation(None, None), Orientation::Unknown);
    }

    #[test]
    fn test_likely_dimensions() {
        let dims = vec![
            measured(34.5, Orientation::Vertical),
            measured(30.0, Orientation::Vertical),
            measured(36.0, Orientation::Horizontal),
            measured(18.0, Orientation::Horizontal),
            measured(100.0, Orientation::Horizontal),
        ];
        assert_eq!(likely_height(&dims), Some(34.5));
        assert_eq!(likely_width(&dims), Some(36.0));
        assert_eq!(likely_height(&[]), None);
    }

    #[test]
    fn test_likely_depth_prefers_common_depth() {
        let dims = vec![
            measured(30.0, Orientation::Vertical),
            measured(23.5, Orientation::Horizontal),
            measured(21.0, Orientation::Horizontal),
        ];
        assert_eq!(likely_depth(&dims), Some(21.0));
        assert_eq!(likely_depth(&[measured(40.0, Orientation::Unknown)]), None);
    }

    #[test]
    fn test_face_frame_first_of_each_orientation() {
        let dims = vec![
            measured(1.75, Orientation::Horizontal),
            measured(2.0, Orientation::Horizontal),
            measured(1.5, Orientation::Vertical),
        ];
        let frame = face_frame(&dims);
        assert_eq!(frame.stile_width, Some(1.75));
        assert_eq!(frame.rail_width, Some(1.5));
        assert!(!face_frame(&[measured(30.0, Orientation::Vertical)]).detected());
    }

    #[test]
    fn test_component_kind_first_match() {
        assert_eq!(component_kind("Trash Drawer"), Some(ComponentKind::UShapedDrawer));
        assert_eq!(component_kind("Top Drawer"), Some(ComponentKind::Drawer));
        assert_eq!(component_kind("DR 1"), Some(ComponentKind::Door));
        assert_eq!(component_kind("Open Shelf"), Some(ComponentKind::Shelf));
        assert_eq!(component_kind("Pull Out"), Some(ComponentKind::Pullout));
        assert_eq!(component_kind("Lazy Susan"), Some(ComponentKind::LazySusan));
        assert_eq!(component_kind("Labels"), None);
    }

    #[test]
    fn test_fixtures_from_blocks() {
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("PRODUCT".to_string(), "Sink".to_string());
        attributes.insert("MODEL".to_string(), "K-123".to_string());
        attributes.insert("MATERIAL".to_string(), "Steel".to_string());
        let blocks = vec![
            BlockInstance {
                id: "b1".into(),
                block_name: "Sink".into(),
                insertion_point: [10.0, 10.0, 0.0],
                attributes,
                layer: None,
            },
            BlockInstance {
                id: "b2".into(),
                block_name: "Arrow".into(),
                insertion_point: [0.0, 0.0, 0.0],
                attributes: Default::default(),
                layer: None,
            },
        ];
        let fixtures = fixtures_from_blocks(&blocks);
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].model.as_deref(), Some("K-123"));

        let near = BoundingBox::new([0.0, 0.0, 0.0], [30.0, 24.0, 34.5]);
        let far = BoundingBox::new([500.0, 500.0, 0.0], [530.0, 524.0, 34.5]);
        assert_eq!(fixtures_near(&fixtures, &near).len(), 1);
        assert!(fixtures_near(&fixtures, &far).is_empty());
        assert_eq!(material_hints(&fixtures), vec!["Steel".to_string()]);
    }

    #[test]
    fn test_cabinet_labels_match_name_and_identifier() {
        let texts = vec![
            label("Austin Van", 0.0, 0.0),
            label("VAN", 1.0, 1.0),
            label("Austin-Base", 2.0, 2.0),
        ];
        let labels = cabinet_labels("Austin-Van", &texts);
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn test_label_search_requires_width_or_height() {
        let snapshot = Snapshot {
            texts: vec![label("Smith-Vanity", 0.0, 0.0), label("Jones-Base", 1000.0, 1000.0)],
            dims: vec![DimensionAnnotation {
                id: "d1".into(),
                text: "34-1/2\"".into(),
                value: None,
                layer: Some("height".into()),
                center: Some([10.0, 10.0, 0.0]),
            }],
            views: Vec::new(),
            fixtures: Vec::new(),
        };
        let candidates = label_search_candidates(&snapshot);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "Smith-Vanity");
        assert_eq!(candidates[0].height, Some(34.5));
        assert_eq!(candidates[0].detected_from, DetectionSource::LabelSearch);
    }

    #[test]
    fn test_bbox_problem() {
        assert!(bbox_problem(&BoundingBox::new([0.0; 3], [0.0; 3])).is_some());
        assert!(bbox_problem(&BoundingBox::new([0.0; 3], [f64::NAN, 1.0, 1.0])).is_some());
        assert!(bbox_problem(&BoundingBox::new([0.0; 3], [30.0, 24.0, 34.5])).is_none());
    }

    // -------------------------------------------------------------------------
    // Extraction against a mock document
    // -------------------------------------------------------------------------

    use crate::mock::MockCadConnector;

    fn sink_block(x: f64, y: f64) -> BlockInstance {
        let mut attributes = std::collections::BTreeMap::new();
        attributes.insert("PRODUCT".to_string(), "Undermount Sink".to_string());
        attributes.insert("MODELNUMBER".to_string(), "K-2210".to_string());
        attributes.insert("MATERIAL".to_string(), "Porcelain".to_string());
        BlockInstance {
            id: "sink".into(),
            block_name: "Sink".into(),
            insertion_point: [x, y, 0.0],
            attributes,
            layer: None,
        }
    }

    fn austin_document() -> MockCadConnector {
        MockCadConnector::new()
            .with_group("Austin-Van", BoundingBox::new([0.0, 0.0, 0.0], [30.0, 21.0, 34.5]))
            .with_group("Austin-Base", BoundingBox::new([100.0, 0.0, 0.0], [136.0, 24.0, 34.5]))
            .with_failing_group("Broken-Van")
            .with_empty_group("Empty-Wall")
            .with_group("Dims", BoundingBox::new([0.0; 3], [1.0, 1.0, 1.0]))
            .with_text("Elevation", 0.0, 500.0)
            .with_text("Austin Van", 20.0, 550.0)
            .with_text("Plan View", 0.0, 1000.0)
            .with_text("Austin-Van", 20.0, 1050.0)
            .with_text("Drawer", 5.0, 5.0)
            .with_text("Door", 110.0, 10.0)
            .with_dimension("34-1/2\"", None, Some("DIM-Height"), 30.0, 600.0)
            .with_dimension("30", Some(30.0), Some("DIM-Width"), 10.0, 650.0)
            .with_dimension("1-3/4", None, None, 5.0, 620.0)
            .with_dimension("21", Some(21.0), None, 20.0, 1100.0)
            .with_block(sink_block(15.0, 10.0))
    }

    #[tokio::test]
    async fn test_extract_combines_views_and_skips_bad_groups() {
        let extractor = DataExtractor::new(Arc::new(austin_document()));
        let result = extractor.extract(true).await.unwrap();

        assert_eq!(result.groups_found, 5);
        let names: Vec<_> = result.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Austin-Base", "Austin-Van"]);

        let warned: Vec<_> = result.warnings.iter().filter_map(|w| w.group.as_deref()).collect();
        assert_eq!(warned, vec!["Broken-Van", "Empty-Wall"]);

        let van = &result.candidates[1];
        assert_eq!(van.width, Some(30.0));
        assert_eq!(van.height, Some(34.5));
        assert_eq!(van.depth, Some(21.0));
        assert!(van.elevation_view.is_some());
        assert!(van.plan_view.is_some());
        assert_eq!(van.face_frame.stile_width, Some(1.75));
        assert_eq!(van.components.drawer_count, 1);
        assert_eq!(van.fixtures.len(), 1);
        assert_eq!(van.material_hints, vec!["Porcelain".to_string()]);
        assert_eq!(van.detected_from, DetectionSource::Group);

        let base = &result.candidates[0];
        assert_eq!(base.width, Some(36.0));
        assert_eq!(base.depth, Some(24.0));
        assert_eq!(base.height, Some(34.5));
        assert_eq!(base.components.door_count, 1);
        assert!(base.plan_view.is_none());
    }

    #[tokio::test]
    async fn test_extract_is_idempotent() {
        let extractor = DataExtractor::new(Arc::new(austin_document()));
        let first = extractor.extract(true).await.unwrap();
        let second = extractor.extract(true).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_extract_without_fixtures() {
        let extractor = DataExtractor::new(Arc::new(austin_document()));
        let result = extractor.extract(false).await.unwrap();
        assert!(result.fixtures.is_empty());
        assert!(result.candidates.iter().all(|c| c.fixtures.is_empty()));
    }

    #[tokio::test]
    async fn test_extract_falls_back_to_labels() {
        let cad = MockCadConnector::new()
            .with_group("Dims", BoundingBox::new([0.0; 3], [1.0, 1.0, 1.0]))
            .with_text("Smith-Vanity", 0.0, 0.0)
            .with_text("Drawer", 40.0, 40.0)
            .with_dimension("36", Some(36.0), Some("width"), 10.0, 10.0);
        let result = DataExtractor::new(Arc::new(cad)).extract(true).await.unwrap();

        assert_eq!(result.candidates.len(), 1);
        let candidate = &result.candidates[0];
        assert_eq!(candidate.detected_from, DetectionSource::LabelSearch);
        assert_eq!(candidate.width, Some(36.0));
        assert_eq!(candidate.components.drawer_count, 1);
        assert!(candidate.bounding_box.is_none());
    }

    #[tokio::test]
    async fn test_extract_fails_when_document_unreadable() {
        let cad = austin_document();
        cad.set_offline(true);
        let err = DataExtractor::new(Arc::new(cad)).extract(true).await.unwrap_err();
        assert!(matches!(err, millwork_core::Error::ExternalBoundary(_)));
    }

    #[tokio::test]
    async fn test_document_summary_and_views() {
        let extractor = DataExtractor::new(Arc::new(austin_document().with_layer("Cabinets")));

        let summary = extractor.document_summary().await.unwrap();
        assert_eq!(summary.group_count, 5);
        assert_eq!(summary.layer_count, 1);
        assert_eq!(summary.text_label_count, 6);
        assert_eq!(
            summary.potential_cabinet_groups,
            vec!["Austin-Base", "Austin-Van", "Broken-Van", "Empty-Wall"]
        );

        let views = extractor.analyze_views().await.unwrap();
        assert_eq!(views.view_count, 2);
        assert_eq!(views.views_by_type.plan, vec!["Plan View".to_string()]);
        assert_eq!(views.views_by_type.elevation, vec!["Elevation".to_string()]);
    }
}
