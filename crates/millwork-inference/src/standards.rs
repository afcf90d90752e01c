//! Cabinet type standards and shop construction defaults.

use serde::{Deserialize, Serialize};

use millwork_core::defaults::{
    BACK_PANEL_THICKNESS, DOOR_GAP, MATERIAL_THICKNESS, RAIL_WIDTH, STILE_WIDTH,
};
use millwork_core::dimensions::nearest_standard;
use millwork_core::{Candidate, ConstructionDefaults, DimensionSet};

/// Cabinet family, inferred from the name or the height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinetType {
    Base,
    Wall,
    Tall,
    Vanity,
}

impl CabinetType {
    pub const ALL: [CabinetType; 4] = [
        CabinetType::Base,
        CabinetType::Wall,
        CabinetType::Tall,
        CabinetType::Vanity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CabinetType::Base => "base",
            CabinetType::Wall => "wall",
            CabinetType::Tall => "tall",
            CabinetType::Vanity => "vanity",
        }
    }

    pub fn spec(&self) -> &'static StandardSpec {
        match self {
            CabinetType::Base => &BASE,
            CabinetType::Wall => &WALL,
            CabinetType::Tall => &TALL,
            CabinetType::Vanity => &VANITY,
        }
    }
}

/// Standard sizes for one cabinet family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandardSpec {
    /// Sizes in ascending order; the last height is the default.
    pub heights: &'static [f64],
    pub depths: &'static [f64],
    pub widths: &'static [f64],
}

const BASE: StandardSpec = StandardSpec {
    heights: &[34.5],
    depths: &[21.0, 24.0],
    widths: &[9.0, 12.0, 15.0, 18.0, 21.0, 24.0, 27.0, 30.0, 33.0, 36.0, 42.0, 48.0],
};

const WALL: StandardSpec = StandardSpec {
    heights: &[12.0, 15.0, 18.0, 24.0, 30.0, 36.0, 42.0],
    depths: &[12.0, 15.0],
    widths: &[9.0, 12.0, 15.0, 18.0, 21.0, 24.0, 27.0, 30.0, 33.0, 36.0, 42.0, 48.0],
};

const TALL: StandardSpec = StandardSpec {
    heights: &[84.0, 90.0, 96.0],
    depths: &[21.0, 24.0],
    widths: &[18.0, 24.0, 30.0, 36.0],
};

const VANITY: StandardSpec = StandardSpec {
    heights: &[30.0, 32.0, 34.0, 36.0],
    depths: &[18.0, 21.0],
    widths: &[24.0, 30.0, 36.0, 42.0, 48.0, 60.0, 72.0],
};

impl StandardSpec {
    pub fn default_height(&self) -> Option<f64> {
        self.heights.last().copied()
    }

    /// Deepest standard depth.
    pub fn default_depth(&self) -> Option<f64> {
        self.depths.iter().copied().reduce(f64::max)
    }
}

/// Shop construction standards, from a template or the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstructionStandards {
    pub face_frame_stile_width: f64,
    pub face_frame_rail_width: f64,
    pub door_gap: f64,
    pub material_thickness: f64,
    pub back_panel_thickness: f64,
}

impl Default for ConstructionStandards {
    fn default() -> Self {
        Self {
            face_frame_stile_width: STILE_WIDTH,
            face_frame_rail_width: RAIL_WIDTH,
            door_gap: DOOR_GAP,
            material_thickness: MATERIAL_THICKNESS,
            back_panel_thickness: BACK_PANEL_THICKNESS,
        }
    }
}

impl ConstructionStandards {
    /// Defaults with any values the template sets.
    pub fn from_template(template: Option<&ConstructionDefaults>) -> Self {
        let base = Self::default();
        match template {
            Some(t) => Self {
                face_frame_stile_width: t.stile_width.unwrap_or(base.face_frame_stile_width),
                face_frame_rail_width: t.rail_width.unwrap_or(base.face_frame_rail_width),
                door_gap: t.door_gap.unwrap_or(base.door_gap),
                ..base
            },
            None => base,
        }
    }
}

/// Cabinet family from the name first, then the height.
pub fn infer_cabinet_type(candidate: &Candidate) -> CabinetType {
    let name = candidate.name.to_lowercase();
    let identifier = candidate.identifier.to_lowercase();

    if name.contains("van") || identifier.contains("van") {
        return CabinetType::Vanity;
    }
    if name.contains("tall") || name.contains("pantry") {
        return CabinetType::Tall;
    }
    if name.contains("wall") || name.contains("upper") {
        return CabinetType::Wall;
    }

    match candidate.height {
        Some(h) if h >= 80.0 => CabinetType::Tall,
        Some(h) if h > 0.0 && h <= 42.0 => CabinetType::Wall,
        _ => CabinetType::Base,
    }
}

/// Standard values for the dimensions the candidate lacks. Width is only
/// inferred from a plausible bounding box, snapped to the family's widths.
pub fn infer_missing_dimensions(candidate: &Candidate, kind: CabinetType) -> DimensionSet {
    let spec = kind.spec();
    let mut inferred = DimensionSet::default();

    if candidate.height.is_none() {
        inferred.height = spec.default_height();
    }
    if candidate.depth.is_none() {
        inferred.depth = spec.default_depth();
    }
    if candidate.width.is_none() {
        if let Some(bbox) = &candidate.bounding_box {
            let width = (bbox.width() * 100.0).round() / 100.0;
            if (6.0..=96.0).contains(&width) {
                inferred.width = nearest_standard(width, spec.widths);
            }
        }
    }
    inferred
}
