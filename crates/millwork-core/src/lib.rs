//! # millwork-core
//!
//! Core types, traits, and pure logic for CAD cabinet extraction.
//!
//! This crate holds the data model shared by every millwork crate, the
//! repository and boundary traits, the confidence scorer and the mapper. It
//! performs no I/O of its own.

pub mod access;
pub mod context;
pub mod defaults;
pub mod dimensions;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod models;
pub mod policy;
pub mod scoring;
pub mod traits;

// Re-export commonly used types at crate root
pub use access::{authorize, AccessPolicy, AllowAll, Capability, Decision, ResourceKind};
pub use context::RequestContext;
pub use dimensions::parse_dimension_text;
pub use error::{Error, Result};
pub use mapper::{
    ConstructionDefaults, EntityCommit, MappedSet, Mapper, MappingContext, MappingReport,
};
pub use models::*;
pub use policy::{DimensionField, LevelThresholds, ScoringPolicy, SignalWeights};
pub use scoring::{is_ambiguous, ConfidenceScorer};
pub use traits::*;
