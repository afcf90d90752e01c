//! CAD document primitives and extraction output.
//!
//! Primitives mirror what the CAD bridge reports (text objects, linear
//! dimensions, block instances, group bounding boxes). Candidates are the
//! extractor's interpretation of one named group as a cabinet.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

// =============================================================================
// DOCUMENT PRIMITIVES
// =============================================================================

/// Document-level metadata reported by the CAD tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default)]
    pub object_count: Option<u64>,
    /// Anything else the bridge returned.
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

/// A document layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadLayer {
    pub name: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub object_count: u64,
}

fn default_true() -> bool {
    true
}

/// A text annotation placed in the drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLabel {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    #[serde(default)]
    pub layer: Option<String>,
}

/// A linear dimension annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionAnnotation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub layer: Option<String>,
    /// Centre of the annotation's bounding box; annotations without one cannot
    /// be placed in a view and are ignored.
    #[serde(default)]
    pub center: Option<[f64; 3]>,
}

/// A block instance (fixtures, appliances, symbols).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInstance {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub block_name: String,
    #[serde(default)]
    pub insertion_point: [f64; 3],
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub layer: Option<String>,
}

/// Axis-aligned bounding box of a group. X is width, Y is depth, Z is height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingBox {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> f64 {
        round4(self.max[0] - self.min[0])
    }

    pub fn depth(&self) -> f64 {
        round4(self.max[1] - self.min[1])
    }

    pub fn height(&self) -> f64 {
        round4(self.max[2] - self.min[2])
    }

    /// True when (x, y) lies inside the box grown by `margin` on every side.
    pub fn contains_xy(&self, x: f64, y: f64, margin: f64) -> bool {
        x >= self.min[0] - margin
            && x <= self.max[0] + margin
            && y >= self.min[1] - margin
            && y <= self.max[1] + margin
    }
}

/// Round to four decimal places, the precision kept for extracted lengths.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Result of one script execution against the CAD tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptOutput {
    pub success: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

// =============================================================================
// VIEWS AND DIMENSIONS
// =============================================================================

/// Drawing view type, detected from its title label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Plan,
    Elevation,
    Detail,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Plan => "plan",
            ViewKind::Elevation => "elevation",
            ViewKind::Detail => "detail",
        }
    }
}

/// A view discovered from its title label, with the search window around it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewRegion {
    pub label: String,
    pub kind: ViewKind,
    pub center: [f64; 2],
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl ViewRegion {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// Orientation of a linear dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Horizontal,
    Vertical,
    Unknown,
}

/// A dimension annotation with its parsed value and inferred orientation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredDimension {
    pub id: String,
    pub text: String,
    pub value: f64,
    pub orientation: Orientation,
    #[serde(default)]
    pub layer: Option<String>,
}

// =============================================================================
// COMPONENTS AND FIXTURES
// =============================================================================

/// Component type recognised from text labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Drawer,
    UShapedDrawer,
    Door,
    Shelf,
    Pullout,
    LazySusan,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Drawer => "drawer",
            ComponentKind::UShapedDrawer => "u_shaped_drawer",
            ComponentKind::Door => "door",
            ComponentKind::Shelf => "shelf",
            ComponentKind::Pullout => "pullout",
            ComponentKind::LazySusan => "lazy_susan",
        }
    }
}

/// One component label attributed to a cabinet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedComponent {
    pub kind: ComponentKind,
    pub label: String,
    pub x: f64,
    pub y: f64,
}

/// Component tallies for a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentCounts {
    pub drawer_count: u32,
    pub door_count: u32,
    pub shelf_count: u32,
    pub pullout_count: u32,
    pub has_u_shaped_drawer: bool,
    pub has_lazy_susan: bool,
    #[serde(default)]
    pub detected: Vec<DetectedComponent>,
}

impl ComponentCounts {
    /// Record one labelled component.
    pub fn record(&mut self, component: DetectedComponent) {
        match component.kind {
            ComponentKind::Drawer => self.drawer_count += 1,
            ComponentKind::UShapedDrawer => {
                self.has_u_shaped_drawer = true;
                self.drawer_count += 1;
            }
            ComponentKind::Door => self.door_count += 1,
            ComponentKind::Shelf => self.shelf_count += 1,
            ComponentKind::Pullout => self.pullout_count += 1,
            ComponentKind::LazySusan => self.has_lazy_susan = true,
        }
        self.detected.push(component);
    }

    pub fn is_empty(&self) -> bool {
        self.detected.is_empty()
    }
}

/// Face frame members measured in elevation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceFrame {
    pub stile_width: Option<f64>,
    pub rail_width: Option<f64>,
}

impl FaceFrame {
    pub fn detected(&self) -> bool {
        self.stile_width.is_some() || self.rail_width.is_some()
    }
}

/// A fixture (sink, faucet, appliance) carried as a block with product data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub block_name: String,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
    pub position: [f64; 3],
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

// =============================================================================
// CANDIDATES
// =============================================================================

/// How a candidate was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// A named CAD group matched the cabinet naming conventions.
    #[default]
    Group,
    /// No group qualified; the candidate was assembled around a text label.
    LabelSearch,
}

/// An extracted, not-yet-trusted interpretation of one CAD group as a cabinet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Group name, e.g. `Austin-Van`.
    pub name: String,
    /// Trailing identifier, e.g. `Van`.
    pub identifier: String,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub depth: Option<f64>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub layer: Option<String>,
    #[serde(default)]
    pub elevation_view: Option<ViewRegion>,
    #[serde(default)]
    pub plan_view: Option<ViewRegion>,
    #[serde(default)]
    pub elevation_dims: Vec<MeasuredDimension>,
    #[serde(default)]
    pub plan_dims: Vec<MeasuredDimension>,
    #[serde(default)]
    pub face_frame: FaceFrame,
    #[serde(default)]
    pub components: ComponentCounts,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
    #[serde(default)]
    pub labels: Vec<TextLabel>,
    #[serde(default)]
    pub material_hints: Vec<String>,
    #[serde(default)]
    pub detected_from: DetectionSource,
}

impl Candidate {
    /// Candidate with only a name, used as a starting point by builders and tests.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        let identifier = identifier_from_group(&name);
        Self {
            name,
            identifier,
            ..Default::default()
        }
    }

    pub fn with_dimensions(mut self, width: f64, height: f64, depth: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self.depth = Some(depth);
        self
    }
}

/// Identifier portion of a group name: the text after the last `-`, or the
/// whole name when there is none.
pub fn identifier_from_group(group_name: &str) -> String {
    match group_name.rsplit_once('-') {
        Some((_, tail)) if !tail.is_empty() => tail.to_string(),
        _ => group_name.to_string(),
    }
}

/// A group that could not be turned into a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    #[serde(default)]
    pub group: Option<String>,
    pub message: String,
}

/// Full output of one document extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub candidates: Vec<Candidate>,
    pub fixtures: Vec<Fixture>,
    pub views: Vec<ViewRegion>,
    #[serde(default)]
    pub warnings: Vec<ExtractionWarning>,
    /// Number of groups the document reported, before filtering.
    #[serde(default)]
    pub groups_found: usize,
}
