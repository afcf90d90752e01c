//! # millwork-review
//!
//! Review queue for extracted cabinet candidates.
//!
//! Reviews move `pending → approved` or `pending → rejected`, both terminal.
//! A second decision fails with `AlreadyProcessed`. Approval can materialize
//! the cabinet in the same atomic unit as the status flip, and
//! interpretation results are merged without ever lowering the stored score.

pub mod config;
pub mod queue;

pub use config::ReviewConfig;
pub use queue::{ApproveRequest, ReviewQueue, SavedInterpretation};
