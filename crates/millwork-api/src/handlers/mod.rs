//! HTTP handlers for millwork-api.

pub mod cad;
pub mod jobs;
pub mod reviews;
pub mod sync;
