//! # millwork-sync
//!
//! Two-way sync between materialized cabinets and their CAD groups.
//!
//! Each cabinet carries a sync baseline: the last dimensions both sides
//! agreed on. Pull compares baseline, system-of-record and CAD values field
//! by field. Changes made only in CAD can merge automatically; changes on
//! both sides raise a single sync conflict review that stays open until a
//! forced sync picks a side.

pub mod config;
pub mod diff;
pub mod service;

pub use config::SyncConfig;
pub use diff::{three_way, ThreeWay};
pub use service::{PullSummary, SyncService};
