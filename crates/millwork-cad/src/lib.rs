//! # millwork-cad
//!
//! Boundary to the external CAD modeling tool and cabinet extraction.
//!
//! This crate provides:
//! - `McpCadConnector`, a [`CadConnector`](millwork_core::CadConnector) over
//!   the tool's MCP JSON-RPC bridge
//! - `DataExtractor`, which turns named groups into cabinet candidates
//! - Python script builders for reads and pushes
//! - `MockCadConnector` (feature `mock`) for hermetic tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use millwork_cad::{DataExtractor, McpCadConnector};
//!
//! #[tokio::main]
//! async fn main() -> millwork_core::Result<()> {
//!     let connector = Arc::new(McpCadConnector::from_env()?);
//!     let result = DataExtractor::new(connector).extract(true).await?;
//!     println!("{} candidates", result.candidates.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod extractor;
pub mod mcp;
pub mod script;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::CadConfig;
pub use extractor::{DataExtractor, DocumentSummary, ViewAnalysis, ViewsByKind};
pub use mcp::{McpCadConnector, ToolPayload};
pub use script::{PushPayload, PushReport};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockCadConnector;
