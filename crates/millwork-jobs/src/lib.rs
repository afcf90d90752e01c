//! # millwork-jobs
//!
//! Extraction job orchestration for millwork.
//!
//! This crate provides:
//! - `ExtractionOrchestrator`: enqueue a scan, run extract → score → route,
//!   and make the job's single terminal write
//! - `JobWorker`: concurrent worker loop over the durable job queue, woken by
//!   queue notifications with a polling fallback
//! - A stale-job reaper that fails jobs whose worker disappeared
//! - Worker events on a broadcast channel
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use millwork_jobs::{ExtractionOrchestrator, JobWorker, WorkerConfig};
//!
//! let orchestrator = Arc::new(ExtractionOrchestrator::new(&stores, extractor));
//! let worker = JobWorker::new(
//!     orchestrator.clone(),
//!     stores.jobs.clone(),
//!     stores.job_notify.clone(),
//!     WorkerConfig::from_env(),
//! );
//! let handle = worker.start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod orchestrator;
pub mod worker;

pub use orchestrator::{route, ExtractionOrchestrator, JobHandle, JobRun, Route};
pub use worker::{reap_stale_jobs, JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
