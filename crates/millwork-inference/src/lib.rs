//! # millwork-inference
//!
//! Dimension interpretation for ambiguous cabinet candidates.
//!
//! This crate provides:
//! - `DimensionInterpreter`: context preparation, model interpretation and a
//!   rule-based fallback
//! - Cabinet type standards and shop construction defaults
//! - Ollama generation backend (default feature `ollama`)
//! - `MockGenerationBackend` (feature `mock`) for hermetic tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use millwork_core::{Candidate, ConfidenceScorer};
//! use millwork_inference::{DimensionInterpreter, OllamaBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let interpreter = DimensionInterpreter::new(Arc::new(OllamaBackend::from_env()));
//!     let candidate = Candidate::named("Austin-Van");
//!     let score = ConfidenceScorer::default().score(&candidate);
//!     let result = interpreter.interpret(&candidate, &score, None).await;
//!     println!("{result:?}");
//! }
//! ```

pub mod interpreter;
pub mod standards;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use interpreter::{parse_model_answer, DimensionInterpreter, InterpretationContext};
pub use standards::{
    infer_cabinet_type, infer_missing_dimensions, CabinetType, ConstructionStandards,
    StandardSpec,
};

#[cfg(feature = "ollama")]
pub use ollama::{OllamaBackend, OllamaConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockGenerationBackend;
