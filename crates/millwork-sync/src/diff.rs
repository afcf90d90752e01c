//! Field-level three-way comparison of cabinet dimensions.
//!
//! Each side is compared against its own reference from the last agreement:
//! system-of-record (ERP) values against the agreed dimensions, CAD group
//! geometry against the geometry observed at that time. A field that is
//! absent on one side is never treated as a change on that side.

use serde::Serialize;

use millwork_core::{DimensionSet, FieldConflict, LENGTH_FIELDS};

/// Outcome of comparing one cabinet.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThreeWay {
    /// Fields changed in CAD only. Safe to merge.
    pub cad_only: Vec<&'static str>,
    /// Fields changed in the system of record only. Resolved by a push.
    pub erp_only: Vec<&'static str>,
    /// Fields changed on both sides to different values.
    pub conflicts: Vec<FieldConflict>,
}

impl ThreeWay {
    pub fn is_unchanged(&self) -> bool {
        self.cad_only.is_empty() && self.erp_only.is_empty() && self.conflicts.is_empty()
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// CAD values for the fields changed only in CAD.
    pub fn cad_updates(&self, cad: &DimensionSet) -> DimensionSet {
        let mut updates = DimensionSet::default();
        for field in &self.cad_only {
            updates.set_length(field, cad.length(field));
        }
        updates
    }

    /// CAD-only changes described as conflicts, for when they cannot be merged.
    pub fn cad_changes_as_conflicts(
        &self,
        baseline: &DimensionSet,
        erp: &DimensionSet,
        cad: &DimensionSet,
    ) -> Vec<FieldConflict> {
        self.cad_only
            .iter()
            .map(|field| field_conflict(field, baseline, erp, cad))
            .collect()
    }
}

/// `to` differs from `from` by more than `tolerance`. A missing `to` is no change.
pub fn changed(from: Option<f64>, to: Option<f64>, tolerance: f64) -> bool {
    match (from, to) {
        (Some(a), Some(b)) => (a - b).abs() > tolerance,
        (None, Some(_)) => true,
        (_, None) => false,
    }
}

/// Compare both sides against their references. `baseline` is the agreed
/// system-of-record state; `cad_base` is the CAD geometry seen at that time.
pub fn three_way(
    baseline: &DimensionSet,
    cad_base: &DimensionSet,
    erp: &DimensionSet,
    cad: &DimensionSet,
    tolerance: f64,
) -> ThreeWay {
    let mut result = ThreeWay::default();
    for field in LENGTH_FIELDS {
        let erp_changed = changed(baseline.length(field), erp.length(field), tolerance);
        let cad_changed = changed(cad_base.length(field), cad.length(field), tolerance);

        match (erp_changed, cad_changed) {
            (false, false) => {}
            (true, false) => result.erp_only.push(field),
            (false, true) => result.cad_only.push(field),
            // Both sides moved to the same value.
            (true, true) if !changed(erp.length(field), cad.length(field), tolerance) => {}
            (true, true) => result
                .conflicts
                .push(field_conflict(field, baseline, erp, cad)),
        }
    }
    result
}

fn field_conflict(
    field: &str,
    baseline: &DimensionSet,
    erp: &DimensionSet,
    cad: &DimensionSet,
) -> FieldConflict {
    FieldConflict {
        field: field.to_string(),
        baseline: baseline.length(field),
        erp: erp.length(field),
        cad: cad.length(field),
    }
}
