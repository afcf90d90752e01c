//! Extraction job lifecycle: enqueue, run, terminal write.
//!
//! A run goes through three phases in order: extract every candidate, score
//! them as a batch, then route each one either to direct materialization or
//! to the review queue. Each job gets exactly one terminal write.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use millwork_cad::DataExtractor;
use millwork_core::{
    defaults, is_ambiguous, CabinetRepository, Candidate, ConfidenceLevel, ConfidenceScore,
    ConfidenceScorer, DimensionSet, ExtractionJob, ExtractionJobRepository, ExtractionReview,
    JobStatus, JobSummary, Mapper, MappingContext, NewExtractionJob, NewReview, RequestContext,
    ResourceKind, Result, ReviewRepository, ReviewType, ScanOptions, SyncBaseline, SyncDirection,
};
use millwork_db::Stores;

/// Result of [`ExtractionOrchestrator::enqueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub job: ExtractionJob,
    /// False when an active job for the same project was returned instead.
    pub created: bool,
}

/// Where one scored candidate goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Materialize,
    Review(ReviewType),
}

/// Routing rule for one candidate.
///
/// High confidence materializes directly only with auto-approve on and no
/// ambiguity; otherwise it is queued for confirmation. Medium or ambiguous
/// candidates are queued as ambiguous, low ones as low confidence.
pub fn route(candidate: &Candidate, score: &ConfidenceScore, options: &ScanOptions) -> Route {
    let ambiguous = is_ambiguous(candidate, score);
    match score.level {
        ConfidenceLevel::Low => Route::Review(ReviewType::LowConfidence),
        _ if ambiguous => Route::Review(ReviewType::Ambiguous),
        ConfidenceLevel::Medium => Route::Review(ReviewType::Ambiguous),
        ConfidenceLevel::High if options.auto_approve_high_confidence => Route::Materialize,
        ConfidenceLevel::High => Route::Review(ReviewType::Confirmation),
    }
}

/// Outcome of executing one claimed job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
    pub job_id: i64,
    pub status: JobStatus,
    pub summary: JobSummary,
    pub error: Option<String>,
    /// False when the terminal write found the job no longer running.
    pub recorded: bool,
    pub duration_ms: u64,
}

/// Owns the lifecycle of document scans.
pub struct ExtractionOrchestrator {
    jobs: Arc<dyn ExtractionJobRepository>,
    reviews: Arc<dyn ReviewRepository>,
    cabinets: Arc<dyn CabinetRepository>,
    extractor: Arc<DataExtractor>,
    scorer: ConfidenceScorer,
    mapper: Mapper,
    mapping: MappingContext,
    job_timeout: Duration,
}

impl ExtractionOrchestrator {
    pub fn new(stores: &Stores, extractor: Arc<DataExtractor>) -> Self {
        Self {
            jobs: stores.jobs.clone(),
            reviews: stores.reviews.clone(),
            cabinets: stores.cabinets.clone(),
            extractor,
            scorer: ConfidenceScorer::default(),
            mapper: Mapper::new(),
            mapping: MappingContext::default(),
            job_timeout: Duration::from_secs(defaults::JOB_TIMEOUT_SECS),
        }
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Mapping defaults (codes, template). The project comes from each job.
    pub fn with_mapping_defaults(mut self, mapping: MappingContext) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn extractor(&self) -> &Arc<DataExtractor> {
        &self.extractor
    }

    /// Create a job in `pending` and return at once. Without `force`, an
    /// active job for the same project is returned instead of a new one.
    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "orchestrator", op = "enqueue", project_id = ?project_id))]
    pub async fn enqueue(
        &self,
        ctx: &RequestContext,
        project_id: Option<i64>,
        options: ScanOptions,
    ) -> Result<JobHandle> {
        let new = NewExtractionJob {
            project_id,
            requested_by: ctx.actor_id,
            company_id: ctx.company_id,
            options,
        };
        let (job, created) = if options.force {
            (self.jobs.queue(new).await?, true)
        } else {
            self.jobs.queue_deduplicated(new).await?
        };

        if created {
            info!(job_id = job.id, force = options.force, "Extraction job queued");
        } else {
            info!(
                job_id = job.id,
                status = %job.status,
                "Extraction already active for project, returning existing job"
            );
        }
        Ok(JobHandle { job, created })
    }

    /// Job with its review items.
    pub async fn job_details(&self, id: i64) -> Result<(ExtractionJob, Vec<ExtractionReview>)> {
        let job = self
            .jobs
            .get(id)
            .await?
            .ok_or_else(|| ResourceKind::ExtractionJob.not_found(id))?;
        let reviews = self.reviews.list_for_job(id).await?;
        Ok((job, reviews))
    }

    /// Run a claimed job and make its single terminal write. Pipeline errors
    /// end up on the job; only a failing terminal write is returned as an error.
    #[instrument(skip(self, job), fields(subsystem = "jobs", component = "orchestrator", op = "run", job_id = job.id))]
    pub async fn execute(&self, job: &ExtractionJob) -> Result<JobRun> {
        let start = Instant::now();
        let mut summary = JobSummary::default();

        let outcome =
            tokio::time::timeout(self.job_timeout, self.run_pipeline(job, &mut summary)).await;
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "job exceeded timeout of {}s",
                self.job_timeout.as_secs()
            )),
        };

        let (status, recorded) = match &error {
            None => (
                JobStatus::Complete,
                self.jobs.complete(job.id, &summary).await?,
            ),
            Some(message) => (
                JobStatus::Failed,
                self.jobs.fail(job.id, message, Some(&summary)).await?,
            ),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        if !recorded {
            warn!(
                job_id = job.id,
                "Job was no longer running at completion, result discarded"
            );
        } else if let Some(message) = &error {
            error!(
                job_id = job.id,
                error = %message,
                phase = ?summary.phase,
                duration_ms,
                "Extraction job failed"
            );
        } else {
            info!(
                job_id = job.id,
                candidates = summary.candidates,
                reviews_created = summary.reviews_created,
                auto_materialized = summary.auto_materialized,
                duration_ms,
                "Extraction job complete"
            );
        }

        Ok(JobRun {
            job_id: job.id,
            status,
            summary,
            error,
            recorded,
            duration_ms,
        })
    }

    async fn run_pipeline(&self, job: &ExtractionJob, summary: &mut JobSummary) -> Result<()> {
        // Extract
        summary.phase = Some("extract".to_string());
        let extraction = self.extractor.extract(job.options.include_fixtures).await?;
        summary.groups_found = extraction.groups_found;
        summary.candidates = extraction.candidates.len();
        summary.warnings = extraction
            .warnings
            .iter()
            .map(|w| match &w.group {
                Some(group) => format!("{group}: {}", w.message),
                None => w.message.clone(),
            })
            .collect();

        // Score
        summary.phase = Some("score".to_string());
        let scores = self.scorer.batch_score(&extraction.candidates);
        let batch = ConfidenceScorer::batch_summary(&scores);
        summary.high_confidence = batch.high_confidence;
        summary.medium_confidence = batch.medium_confidence;
        summary.low_confidence = batch.low_confidence;
        summary.average_score = batch.average_score;

        // Route
        summary.phase = Some("route".to_string());
        let ctx = MappingContext {
            project_id: job.project_id,
            ..self.mapping.clone()
        };
        let mut drafts = Vec::new();
        let mut geometry = Vec::new();
        let mut queued = Vec::new();
        for (candidate, score) in extraction.candidates.iter().zip(&scores) {
            match route(candidate, score, &job.options) {
                Route::Materialize => {
                    drafts.push(self.mapper.map_to_entity(candidate, &ctx));
                    geometry.push(DimensionSet::group_geometry(candidate));
                }
                Route::Review(review_type) => queued.push((review_type, candidate, score)),
            }
            debug!(group_name = %candidate.name, total = score.total, level = %score.level, "Candidate routed");
        }

        if !drafts.is_empty() {
            let created = self.cabinets.create_many(&drafts, None).await?;
            for (cabinet, cad_geometry) in created.iter().zip(geometry) {
                let baseline = SyncBaseline::new(cabinet.dimensions(), SyncDirection::Cad)
                    .with_cad_geometry(cad_geometry);
                self.cabinets.set_baseline(cabinet.id, &baseline).await?;
                summary.cabinet_ids.push(cabinet.id);
            }
            summary.auto_materialized = created.len();
        }

        for (review_type, candidate, score) in queued {
            let review = self
                .reviews
                .create(NewReview {
                    job_id: Some(job.id),
                    project_id: job.project_id,
                    review_type,
                    candidate: candidate.clone(),
                    score: score.clone(),
                    cabinet_id: None,
                    sync_conflict: None,
                })
                .await?;
            summary.review_ids.push(review.id);
            summary.reviews_created += 1;
        }

        summary.phase = Some("done".to_string());
        Ok(())
    }
}
