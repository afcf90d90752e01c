//! Extraction worker pool and stale-job reaper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use millwork_core::{defaults, Error, ExtractionJobRepository, JobStatus, Result};

use crate::orchestrator::ExtractionOrchestrator;

/// Capacity of the worker event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the extraction worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when no notification arrives.
    pub poll_interval_ms: u64,
    /// Maximum number of jobs run concurrently.
    pub max_concurrent_jobs: usize,
    /// Whether to process jobs at all.
    pub enabled: bool,
    /// A running job older than this is failed by the reaper.
    pub stale_after_secs: u64,
    /// Upper bound on one extraction run.
    pub job_timeout_secs: u64,
    pub reaper_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            enabled: true,
            stale_after_secs: defaults::JOB_STALE_AFTER_SECS,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            reaper_interval_secs: defaults::JOB_REAPER_INTERVAL_SECS,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `2` | Max concurrent extraction jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `5000` | Polling interval when queue is empty |
    /// | `JOB_STALE_AFTER_SECS` | `900` | Age at which a running job is reaped |
    /// | `JOB_TIMEOUT_SECS` | `600` | Upper bound on one extraction run |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = env_parse("JOB_MAX_CONCURRENT", defaults::JOB_MAX_CONCURRENT)
            .max(1);
        let poll_interval_ms = env_parse("JOB_POLL_INTERVAL_MS", defaults::JOB_POLL_INTERVAL_MS);
        let stale_after_secs = env_parse("JOB_STALE_AFTER_SECS", defaults::JOB_STALE_AFTER_SECS);
        let job_timeout_secs = env_parse("JOB_TIMEOUT_SECS", defaults::JOB_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
            stale_after_secs,
            job_timeout_secs,
            reaper_interval_secs: defaults::JOB_REAPER_INTERVAL_SECS,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_stale_after(mut self, secs: u64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    pub fn with_reaper_interval(mut self, secs: u64) -> Self {
        self.reaper_interval_secs = secs;
        self
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Event emitted by the extraction worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    JobStarted {
        job_id: i64,
        project_id: Option<i64>,
    },
    JobCompleted {
        job_id: i64,
        reviews_created: usize,
        auto_materialized: usize,
    },
    JobFailed {
        job_id: i64,
        error: String,
    },
    /// Running jobs failed by the reaper.
    JobsReaped {
        job_ids: Vec<i64>,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }
}

/// Fail every job that has been running longer than `stale_after`.
/// Reaped jobs are never moved back to `pending`; the caller rescans.
pub async fn reap_stale_jobs(
    jobs: &dyn ExtractionJobRepository,
    stale_after: Duration,
) -> Result<Vec<i64>> {
    let cutoff = chrono::Utc::now() - chrono::Duration::seconds(stale_after.as_secs() as i64);
    let reaped = jobs
        .fail_stale(cutoff, defaults::JOB_WORKER_LOST_MSG)
        .await?;
    if !reaped.is_empty() {
        warn!(
            subsystem = "jobs",
            component = "reaper",
            count = reaped.len(),
            job_ids = ?reaped,
            "Failed stale running jobs"
        );
    }
    Ok(reaped)
}

/// Claims pending extraction jobs and runs them on the orchestrator.
pub struct JobWorker {
    orchestrator: Arc<ExtractionOrchestrator>,
    jobs: Arc<dyn ExtractionJobRepository>,
    notify: Arc<Notify>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    /// `notify` is woken by the job repository whenever a job is queued.
    pub fn new(
        orchestrator: Arc<ExtractionOrchestrator>,
        jobs: Arc<dyn ExtractionJobRepository>,
        notify: Arc<Notify>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            orchestrator,
            jobs,
            notify,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_tx,
        }
    }

    /// Worker loop. Claims up to `max_concurrent_jobs` at a time, runs them
    /// concurrently, and only waits when the queue is empty.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            stale_after_secs = self.config.stale_after_secs,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let reaper_interval = Duration::from_secs(self.config.reaper_interval_secs);
        let mut last_reap: Option<Instant> = None;

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            if last_reap.map_or(true, |t| t.elapsed() >= reaper_interval) {
                self.reap().await;
                last_reap = Some(Instant::now());
            }

            let mut tasks = tokio::task::JoinSet::new();
            for _ in 0..self.config.max_concurrent_jobs {
                match self.jobs.claim_next().await {
                    Ok(Some(job)) => {
                        let orchestrator = self.orchestrator.clone();
                        let event_tx = self.event_tx.clone();
                        tasks.spawn(async move {
                            execute_job(orchestrator, event_tx, job).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "Failed to claim job");
                        break;
                    }
                }
            }

            if tasks.is_empty() {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = self.notify.notified() => {
                        debug!("Woken by job notification");
                    }
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed = tasks.len(), "Processing concurrent job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn reap(&self) {
        let stale_after = Duration::from_secs(self.config.stale_after_secs);
        match reap_stale_jobs(self.jobs.as_ref(), stale_after).await {
            Ok(job_ids) if !job_ids.is_empty() => {
                let _ = self.event_tx.send(WorkerEvent::JobsReaped { job_ids });
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Stale job reaper failed"),
        }
    }
}

async fn execute_job(
    orchestrator: Arc<ExtractionOrchestrator>,
    event_tx: broadcast::Sender<WorkerEvent>,
    job: millwork_core::ExtractionJob,
) {
    let _ = event_tx.send(WorkerEvent::JobStarted {
        job_id: job.id,
        project_id: job.project_id,
    });

    match orchestrator.execute(&job).await {
        Ok(run) if run.status == JobStatus::Complete => {
            let _ = event_tx.send(WorkerEvent::JobCompleted {
                job_id: run.job_id,
                reviews_created: run.summary.reviews_created,
                auto_materialized: run.summary.auto_materialized,
            });
        }
        Ok(run) => {
            let _ = event_tx.send(WorkerEvent::JobFailed {
                job_id: run.job_id,
                error: run.error.unwrap_or_default(),
            });
        }
        Err(e) => {
            error!(job_id = job.id, error = %e, "Failed to record job outcome");
            let _ = event_tx.send(WorkerEvent::JobFailed {
                job_id: job.id,
                error: e.to_string(),
            });
        }
    }
}
