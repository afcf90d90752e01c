//! Candidate → cabinet mapping.
//!
//! [`Mapper::map_to_entity`] and [`Mapper::map_all`] are pure and
//! deterministic. [`Mapper::create_entities`] is the only operation with side
//! effects and supports a dry run for preview-without-commit.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::defaults;
use crate::dimensions::within;
use crate::error::Result;
use crate::models::{
    round4, Cabinet, CabinetDraft, CabinetSection, CadSource, Candidate, ComponentKind,
    ConstructionType, ExtractionResult, MissingFieldNote,
};
use crate::traits::CabinetRepository;

static PREFIXED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][a-z]*-(.+)$").expect("static regex"));

/// Fields that must always be chosen by a person.
pub const HUMAN_REQUIRED_FIELDS: &[(&str, &str)] = &[
    ("material_category", "Material selection required"),
    ("finish_option", "Finish selection required"),
    ("door_style", "Door style selection required"),
];

/// Construction template values used to fill fields the drawing did not show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstructionDefaults {
    pub stile_width: Option<f64>,
    pub rail_width: Option<f64>,
    pub door_gap: Option<f64>,
}

/// Project-level context for a mapping run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingContext {
    pub project_id: Option<i64>,
    pub project_code: Option<String>,
    pub room_code: Option<String>,
    pub template: Option<ConstructionDefaults>,
    /// Construction type when the drawing shows no face frame.
    pub construction_type: Option<ConstructionType>,
}

/// Preview of one draft, formatted for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub index: usize,
    pub name: String,
    pub group_name: String,
    pub width: String,
    pub height: String,
    pub depth: String,
    pub drawers: i32,
    pub doors: i32,
    pub auto_populated: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRow {
    pub product: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSummary {
    pub total_cabinets: usize,
    pub complete_dimensions: usize,
    pub missing_critical: usize,
    pub with_fixtures: usize,
}

/// Human-readable preview suitable for display before committing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingReport {
    pub summary: MappingSummary,
    pub cabinets: Vec<PreviewRow>,
    pub warnings: Vec<String>,
    pub fixtures: Vec<FixtureRow>,
}

/// Output of [`Mapper::map_all`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappedSet {
    pub entities: Vec<CabinetDraft>,
    pub report: MappingReport,
}

/// Output of [`Mapper::create_entities`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCommit {
    pub dry_run: bool,
    /// Persisted cabinets; empty on a dry run.
    pub created: Vec<Cabinet>,
    /// Drafts that would be written; populated on a dry run.
    pub previewed: Vec<CabinetDraft>,
}

/// Deterministic transform from extractor output into cabinet drafts.
#[derive(Debug, Clone, Default)]
pub struct Mapper;

impl Mapper {
    pub fn new() -> Self {
        Self
    }

    /// Map one candidate. Pure: the same input always yields the same draft.
    pub fn map_to_entity(&self, candidate: &Candidate, ctx: &MappingContext) -> CabinetDraft {
        let cabinet_number = cabinet_number(candidate);
        let mut missing_fields = Vec::new();

        let length_inches = checked_dimension(
            "length_inches",
            candidate.width,
            defaults::WIDTH_RANGE,
            "No width dimension found in elevation view",
            &mut missing_fields,
        );
        let height_inches = checked_dimension(
            "height_inches",
            candidate.height,
            defaults::HEIGHT_RANGE,
            "No height dimension found in elevation view",
            &mut missing_fields,
        );
        let depth_inches = checked_dimension(
            "depth_inches",
            candidate.depth,
            defaults::DEPTH_RANGE,
            "No depth dimension found in plan view",
            &mut missing_fields,
        );
        for (field, reason) in HUMAN_REQUIRED_FIELDS {
            missing_fields.push(MissingFieldNote {
                field: field.to_string(),
                reason: reason.to_string(),
            });
        }

        let construction_type = if candidate.face_frame.detected() {
            ConstructionType::FaceFrame
        } else {
            ctx.construction_type.unwrap_or_default()
        };

        let components = &candidate.components;
        let mut draft = CabinetDraft {
            project_id: ctx.project_id,
            full_code: full_code(&cabinet_number, ctx),
            cabinet_number,
            group_name: candidate.name.clone(),
            length_inches,
            height_inches,
            depth_inches,
            construction_type,
            face_frame_stile_width: candidate.face_frame.stile_width,
            face_frame_rail_width: candidate.face_frame.rail_width,
            door_gap: None,
            drawer_count: components.drawer_count as i32,
            door_count: components.door_count as i32,
            sections: sections(candidate),
            shop_notes: Some(shop_notes(candidate)),
            source: CadSource {
                group_name: candidate.name.clone(),
                bounding_box: candidate.bounding_box,
                detected_from: candidate.detected_from,
                fixtures: candidate.fixtures.clone(),
            },
            auto_populated_fields: auto_populated(candidate),
            missing_fields,
            applied_template_defaults: Vec::new(),
        };

        if let Some(template) = &ctx.template {
            apply_template(&mut draft, template);
        }
        draft
    }

    /// Map every candidate of an extraction and build the preview report.
    pub fn map_all(&self, extraction: &ExtractionResult, ctx: &MappingContext) -> MappedSet {
        let entities: Vec<CabinetDraft> = extraction
            .candidates
            .iter()
            .map(|c| self.map_to_entity(c, ctx))
            .collect();
        let mut report = self.preview_report(&entities);
        report.fixtures = extraction
            .fixtures
            .iter()
            .map(|f| FixtureRow {
                product: f.product.clone().unwrap_or_else(|| "Unknown".to_string()),
                model: f.model.clone().unwrap_or_default(),
            })
            .collect();
        MappedSet { entities, report }
    }

    /// Preview rows and warnings for a set of drafts.
    pub fn preview_report(&self, drafts: &[CabinetDraft]) -> MappingReport {
        let mut report = MappingReport::default();
        for (index, draft) in drafts.iter().enumerate() {
            let critical_missing = draft.length_inches.is_none() || draft.height_inches.is_none();
            if critical_missing {
                report.warnings.push(format!(
                    "Cabinet '{}' is missing critical dimensions",
                    draft.cabinet_number
                ));
                report.summary.missing_critical += 1;
            }
            if draft.length_inches.is_some()
                && draft.height_inches.is_some()
                && draft.depth_inches.is_some()
            {
                report.summary.complete_dimensions += 1;
            }
            if !draft.source.fixtures.is_empty() {
                report.summary.with_fixtures += 1;
            }
            report.cabinets.push(PreviewRow {
                index,
                name: draft.cabinet_number.clone(),
                group_name: draft.group_name.clone(),
                width: display_length(draft.length_inches),
                height: display_length(draft.height_inches),
                depth: display_length(draft.depth_inches),
                drawers: draft.drawer_count,
                doors: draft.door_count,
                auto_populated: draft.auto_populated_fields.clone(),
                missing: draft.missing_fields.iter().map(|m| m.field.clone()).collect(),
            });
        }
        report.summary.total_cabinets = drafts.len();
        report
    }

    /// Persist drafts, or only report what would be written when `dry_run`.
    /// A real run is all-or-nothing.
    pub async fn create_entities(
        &self,
        repo: &dyn CabinetRepository,
        drafts: &[CabinetDraft],
        dry_run: bool,
    ) -> Result<EntityCommit> {
        if dry_run {
            debug!(count = drafts.len(), "Dry run, no cabinets written");
            return Ok(EntityCommit {
                dry_run: true,
                created: Vec::new(),
                previewed: drafts.to_vec(),
            });
        }
        let created = repo.create_many(drafts, None).await?;
        info!(count = created.len(), "Cabinets created from CAD drafts");
        Ok(EntityCommit {
            dry_run: false,
            created,
            previewed: Vec::new(),
        })
    }

    /// Find an existing cabinet for a CAD name: by group name, then by cabinet
    /// number, then by the identifier parsed from the name.
    pub async fn find_matching_cabinet(
        &self,
        repo: &dyn CabinetRepository,
        cad_name: &str,
        project_id: Option<i64>,
    ) -> Result<Option<Cabinet>> {
        if let Some(cabinet) = repo.find_by_group(project_id, cad_name).await? {
            return Ok(Some(cabinet));
        }
        if let Some(cabinet) = repo.find_by_number(project_id, cad_name).await? {
            return Ok(Some(cabinet));
        }
        let parsed = cabinet_number(&Candidate::named(cad_name));
        if parsed != cad_name {
            return repo.find_by_number(project_id, &parsed).await;
        }
        Ok(None)
    }
}

/// Cabinet number from a group name: `Austin-Van` → `Van`.
pub fn cabinet_number(candidate: &Candidate) -> String {
    if let Some(caps) = PREFIXED_NAME.captures(&candidate.name) {
        return caps[1].to_string();
    }
    if !candidate.identifier.is_empty() {
        return candidate.identifier.clone();
    }
    candidate.name.clone()
}

fn full_code(cabinet_number: &str, ctx: &MappingContext) -> Option<String> {
    let parts: Vec<&str> = [ctx.project_code.as_deref(), ctx.room_code.as_deref()]
        .into_iter()
        .flatten()
        .chain(std::iter::once(cabinet_number))
        .filter(|p| !p.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("-"))
}

fn checked_dimension(
    field: &str,
    value: Option<f64>,
    range: (f64, f64),
    missing_reason: &str,
    missing: &mut Vec<MissingFieldNote>,
) -> Option<f64> {
    match value {
        Some(v) if v > 0.0 && within(v, range) => Some(round4(v)),
        Some(v) if v > 0.0 => {
            warn!(field, value = v, min = range.0, max = range.1, "Dimension out of range");
            missing.push(MissingFieldNote {
                field: field.to_string(),
                reason: format!(
                    "Extracted value {v}\" outside accepted range {}-{}\"",
                    range.0, range.1
                ),
            });
            None
        }
        _ => {
            missing.push(MissingFieldNote {
                field: field.to_string(),
                reason: missing_reason.to_string(),
            });
            None
        }
    }
}

fn sections(candidate: &Candidate) -> Vec<CabinetSection> {
    let c = &candidate.components;
    let u_shaped = i32::from(c.has_u_shaped_drawer);
    [
        (ComponentKind::Drawer, c.drawer_count as i32 - u_shaped),
        (ComponentKind::UShapedDrawer, u_shaped),
        (ComponentKind::Door, c.door_count as i32),
        (ComponentKind::Shelf, c.shelf_count as i32),
        (ComponentKind::Pullout, c.pullout_count as i32),
        (ComponentKind::LazySusan, i32::from(c.has_lazy_susan)),
    ]
    .into_iter()
    .filter(|(_, count)| *count > 0)
    .map(|(kind, count)| CabinetSection { kind, count })
    .collect()
}

fn shop_notes(candidate: &Candidate) -> String {
    let mut notes = vec![format!("Imported from CAD: {}", candidate.name)];
    if candidate.components.has_u_shaped_drawer {
        notes.push("Has U-shaped drawer (trash cabinet)".to_string());
    }
    if candidate.components.has_lazy_susan {
        notes.push("Has lazy susan".to_string());
    }
    for fixture in &candidate.fixtures {
        let product = fixture.product.as_deref().unwrap_or("Unknown fixture");
        match fixture.model.as_deref() {
            Some(model) => notes.push(format!("Fixture: {product} {model}")),
            None => notes.push(format!("Fixture: {product}")),
        }
    }
    if !candidate.material_hints.is_empty() {
        notes.push(format!("Material: {}", candidate.material_hints.join(", ")));
    }
    notes.join("\n")
}

fn auto_populated(candidate: &Candidate) -> Vec<String> {
    let mut fields = vec!["cabinet_number".to_string()];
    let mut push = |cond: bool, field: &str| {
        if cond {
            fields.push(field.to_string());
        }
    };
    push(candidate.width.is_some(), "length_inches");
    push(candidate.height.is_some(), "height_inches");
    push(candidate.depth.is_some(), "depth_inches");
    push(
        candidate.face_frame.stile_width.is_some(),
        "face_frame_stile_width",
    );
    push(
        candidate.face_frame.rail_width.is_some(),
        "face_frame_rail_width",
    );
    push(candidate.components.drawer_count > 0, "drawer_count");
    push(candidate.components.door_count > 0, "door_count");
    fields
}

fn apply_template(draft: &mut CabinetDraft, template: &ConstructionDefaults) {
    let slots = [
        (
            "face_frame_stile_width",
            &mut draft.face_frame_stile_width,
            template.stile_width,
        ),
        (
            "face_frame_rail_width",
            &mut draft.face_frame_rail_width,
            template.rail_width,
        ),
        ("door_gap", &mut draft.door_gap, template.door_gap),
    ];
    for (field, slot, default) in slots {
        if slot.is_none() {
            if let Some(value) = default {
                *slot = Some(value);
                draft.applied_template_defaults.push(field.to_string());
            }
        }
    }
}

fn display_length(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v}\""))
        .unwrap_or_else(|| "Missing".to_string())
}
