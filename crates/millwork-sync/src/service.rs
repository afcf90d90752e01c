//! Push, pull, forced resolution and status.
//!
//! Every push, pull and force is appended to the sync event log, successful
//! or not. CAD boundary failures come back as a failed [`SyncOutcome`]; state
//! errors (missing cabinet, decided review, open conflict) are returned as
//! errors.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use millwork_cad::script::{parse_push_report, push_script};
use millwork_cad::{DataExtractor, PushPayload, PushReport};
use millwork_core::{
    authorize, AccessPolicy, AllowAll, Approval, ApprovalEffect, Cabinet, CabinetRepository,
    Candidate, Capability, ConfidenceScorer, DimensionSet, Error, ExtractionJobRepository,
    Mapper, NewReview, NewSyncEvent, PullOptions, RequestContext, ResourceKind, Result,
    ReviewRepository, ReviewType, SyncBaseline, SyncConflict, SyncDirection, SyncEvent,
    SyncEventKind, SyncEventRepository, SyncOutcome, SyncResolution, SyncStatus,
};
use millwork_db::Stores;

use crate::config::SyncConfig;
use crate::diff::three_way;

/// Per-pull tally returned in the outcome details.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PullSummary {
    pub candidates: usize,
    pub unchanged: usize,
    pub merged: Vec<i64>,
    pub conflicts: Vec<i64>,
    /// Cabinets already waiting on a forced resolution.
    pub skipped: Vec<i64>,
    /// Cabinets whose only changes are on the system-of-record side.
    pub erp_ahead: Vec<i64>,
    pub new_reviews: Vec<i64>,
    pub unmatched: Vec<String>,
}

/// Two-way sync between cabinets and CAD groups.
pub struct SyncService {
    jobs: Arc<dyn ExtractionJobRepository>,
    reviews: Arc<dyn ReviewRepository>,
    cabinets: Arc<dyn CabinetRepository>,
    events: Arc<dyn SyncEventRepository>,
    extractor: Arc<DataExtractor>,
    policy: Arc<dyn AccessPolicy>,
    scorer: ConfidenceScorer,
    mapper: Mapper,
    config: SyncConfig,
}

impl SyncService {
    pub fn new(stores: &Stores, extractor: Arc<DataExtractor>) -> Self {
        Self {
            jobs: stores.jobs.clone(),
            reviews: stores.reviews.clone(),
            cabinets: stores.cabinets.clone(),
            events: stores.sync_events.clone(),
            extractor,
            policy: Arc::new(AllowAll),
            scorer: ConfidenceScorer::default(),
            mapper: Mapper::new(),
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // =========================================================================
    // PUSH
    // =========================================================================

    /// Write a cabinet's dimensions to its CAD group. Pushing identical
    /// state twice leaves the document unchanged. Refused with `Conflict`
    /// while the cabinet has an open sync conflict.
    #[instrument(skip(self, ctx), fields(subsystem = "sync", component = "service", op = "push"))]
    pub async fn push(&self, ctx: &RequestContext, cabinet_id: i64) -> Result<SyncOutcome> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Cabinet, Capability::Sync).await?;
        let cabinet = self.load_cabinet(cabinet_id).await?;
        if let Some(open) = self.reviews.pending_conflict_for_cabinet(cabinet_id).await? {
            return Err(Error::Conflict(format!(
                "cabinet {cabinet_id} has an open sync conflict (review {}); resolve it with a forced sync",
                open.id
            )));
        }

        let start = Instant::now();
        let report = match self.push_cabinet(&cabinet).await {
            Ok(report) => report,
            Err(Error::ExternalBoundary(message)) => {
                self.record_failure(
                    ctx,
                    SyncEventKind::Push,
                    SyncDirection::Erp,
                    cabinet.project_id,
                    Some(cabinet_id),
                    None,
                    &message,
                )
                .await?;
                return Ok(SyncOutcome::failed(message));
            }
            Err(e) => return Err(e),
        };

        let baseline = SyncBaseline::new(cabinet.dimensions(), SyncDirection::Erp);
        self.cabinets.set_baseline(cabinet_id, &baseline).await?;

        let details = json!({
            "cabinet_id": cabinet_id,
            "group": cabinet.group_name,
            "operation": report.operation,
            "fingerprint": baseline.fingerprint,
        });
        self.record(NewSyncEvent {
            project_id: cabinet.project_id,
            cabinet_id: Some(cabinet_id),
            review_id: None,
            kind: SyncEventKind::Push,
            direction: SyncDirection::Erp,
            actor_id: ctx.actor_id,
            success: true,
            details: details.clone(),
        })
        .await?;

        info!(
            cabinet_id,
            group_name = %cabinet.group_name,
            operation = ?report.operation,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cabinet pushed to CAD"
        );
        Ok(SyncOutcome::ok(details))
    }

    // =========================================================================
    // PULL
    // =========================================================================

    /// Read the CAD document and reconcile every matched cabinet against its
    /// baseline. CAD-only changes merge when `auto_merge` is on; anything else
    /// that moved raises one sync conflict review per cabinet.
    #[instrument(skip(self, ctx, options), fields(subsystem = "sync", component = "service", op = "pull", project_id = ?project_id))]
    pub async fn pull(
        &self,
        ctx: &RequestContext,
        project_id: Option<i64>,
        options: PullOptions,
    ) -> Result<SyncOutcome> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Project, Capability::Sync).await?;
        let start = Instant::now();

        let extraction = match self.extractor.extract(false).await {
            Ok(extraction) => extraction,
            Err(Error::ExternalBoundary(message)) => {
                self.record_failure(
                    ctx,
                    SyncEventKind::Pull,
                    SyncDirection::Cad,
                    project_id,
                    None,
                    None,
                    &message,
                )
                .await?;
                return Ok(SyncOutcome::failed(message));
            }
            Err(e) => return Err(e),
        };

        let mut summary = PullSummary {
            candidates: extraction.candidates.len(),
            ..Default::default()
        };
        for candidate in &extraction.candidates {
            let matched = self
                .mapper
                .find_matching_cabinet(self.cabinets.as_ref(), &candidate.name, project_id)
                .await?;
            match matched {
                Some(cabinet) => {
                    self.reconcile(&cabinet, candidate, options, &mut summary)
                        .await?
                }
                None if options.create_new => {
                    self.propose_new(project_id, candidate, &mut summary)
                        .await?
                }
                None => summary.unmatched.push(candidate.name.clone()),
            }
        }

        let details = serde_json::to_value(&summary)?;
        self.record(NewSyncEvent {
            project_id,
            cabinet_id: None,
            review_id: None,
            kind: SyncEventKind::Pull,
            direction: SyncDirection::Cad,
            actor_id: ctx.actor_id,
            success: true,
            details: details.clone(),
        })
        .await?;

        info!(
            candidates = summary.candidates,
            merged = summary.merged.len(),
            conflicts = summary.conflicts.len(),
            new_reviews = summary.new_reviews.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Pull from CAD complete"
        );
        Ok(SyncOutcome::ok(details))
    }

    async fn reconcile(
        &self,
        cabinet: &Cabinet,
        candidate: &Candidate,
        options: PullOptions,
        summary: &mut PullSummary,
    ) -> Result<()> {
        if self
            .reviews
            .pending_conflict_for_cabinet(cabinet.id)
            .await?
            .is_some()
        {
            summary.skipped.push(cabinet.id);
            return Ok(());
        }

        let erp = cabinet.dimensions();
        let cad = DimensionSet::group_geometry(candidate);
        let (baseline, cad_base) = match &cabinet.sync_baseline {
            Some(b) => (b.dimensions, b.cad_reference()),
            None => (erp, erp),
        };
        let diff = three_way(
            &baseline,
            &cad_base,
            &erp,
            &cad,
            self.config.conflict_tolerance,
        );
        debug!(
            cabinet_id = cabinet.id,
            cad_only = diff.cad_only.len(),
            erp_only = diff.erp_only.len(),
            conflicts = diff.conflicts.len(),
            "Cabinet compared"
        );

        if diff.is_unchanged() {
            summary.unchanged += 1;
            return Ok(());
        }

        if !diff.has_conflicts() && !diff.cad_only.is_empty() && options.auto_merge {
            let updates = diff.cad_updates(&cad);
            let merged = erp.overlay(&updates);
            let new_baseline = SyncBaseline::new(baseline.overlay(&updates), SyncDirection::Cad)
                .with_cad_geometry(cad);
            self.cabinets
                .update_dimensions(cabinet.id, &updates, Some(&new_baseline))
                .await?;
            debug!(cabinet_id = cabinet.id, fingerprint = %merged.fingerprint(), "CAD changes merged");
            summary.merged.push(cabinet.id);
            if !diff.erp_only.is_empty() {
                summary.erp_ahead.push(cabinet.id);
            }
            return Ok(());
        }

        let mut fields = diff.conflicts.clone();
        if !options.auto_merge {
            fields.extend(diff.cad_changes_as_conflicts(&baseline, &erp, &cad));
        }
        if fields.is_empty() {
            summary.erp_ahead.push(cabinet.id);
            return Ok(());
        }

        let conflict = SyncConflict {
            cabinet_id: cabinet.id,
            erp,
            cad,
            baseline: Some(baseline),
            fields,
        };
        let created = self
            .reviews
            .create(NewReview {
                job_id: None,
                project_id: cabinet.project_id,
                review_type: ReviewType::SyncConflict,
                candidate: candidate.clone(),
                score: self.scorer.score(candidate),
                cabinet_id: Some(cabinet.id),
                sync_conflict: Some(conflict),
            })
            .await;
        match created {
            Ok(review) => {
                info!(
                    cabinet_id = cabinet.id,
                    review_id = review.id,
                    "Sync conflict raised"
                );
                summary.conflicts.push(cabinet.id);
            }
            // Another pull raised it first.
            Err(Error::Conflict(_)) => summary.skipped.push(cabinet.id),
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn propose_new(
        &self,
        project_id: Option<i64>,
        candidate: &Candidate,
        summary: &mut PullSummary,
    ) -> Result<()> {
        let proposed = self
            .reviews
            .has_pending_for_group(project_id, &candidate.name, ReviewType::NewFromCad)
            .await?;
        if proposed {
            summary.unmatched.push(candidate.name.clone());
            return Ok(());
        }

        let review = self
            .reviews
            .create(NewReview {
                job_id: None,
                project_id,
                review_type: ReviewType::NewFromCad,
                candidate: candidate.clone(),
                score: self.scorer.score(candidate),
                cabinet_id: None,
                sync_conflict: None,
            })
            .await?;
        summary.new_reviews.push(review.id);
        Ok(())
    }

    // =========================================================================
    // FORCE
    // =========================================================================

    /// Resolve a sync conflict review in favour of one side. `Erp` pushes
    /// the system-of-record values to CAD; `Cad` overwrites the cabinet with
    /// the CAD values. The review records the winning side and the actor.
    #[instrument(skip(self, ctx), fields(subsystem = "sync", component = "service", op = "force", direction = %direction))]
    pub async fn force(
        &self,
        ctx: &RequestContext,
        review_id: i64,
        direction: SyncDirection,
    ) -> Result<SyncOutcome> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Review, Capability::Sync).await?;
        let review = self
            .reviews
            .get(review_id)
            .await?
            .ok_or_else(|| ResourceKind::Review.not_found(review_id))?;
        if !review.is_pending() {
            return Err(Error::AlreadyProcessed(format!(
                "review {review_id} is already {}",
                review.status
            )));
        }
        let conflict = match (&review.review_type, &review.sync_conflict) {
            (ReviewType::SyncConflict, Some(conflict)) => conflict.clone(),
            _ => {
                return Err(Error::Validation(format!(
                    "review {review_id} is not a sync conflict"
                )))
            }
        };
        let cabinet = self.load_cabinet(conflict.cabinet_id).await?;

        let effect = match direction {
            SyncDirection::Erp => {
                if let Err(e) = self.push_cabinet(&cabinet).await {
                    let message = match e {
                        Error::ExternalBoundary(message) => message,
                        other => return Err(other),
                    };
                    self.record_failure(
                        ctx,
                        SyncEventKind::Force,
                        direction,
                        review.project_id,
                        Some(cabinet.id),
                        Some(review_id),
                        &message,
                    )
                    .await?;
                    return Ok(SyncOutcome::failed(message));
                }
                ApprovalEffect::UpdateCabinet {
                    cabinet_id: cabinet.id,
                    dimensions: DimensionSet::default(),
                    baseline: Some(SyncBaseline::new(cabinet.dimensions(), SyncDirection::Erp)),
                }
            }
            SyncDirection::Cad => {
                let cad = lengths_only(&conflict.cad);
                ApprovalEffect::UpdateCabinet {
                    cabinet_id: cabinet.id,
                    dimensions: cad,
                    baseline: Some(
                        SyncBaseline::new(cabinet.dimensions().overlay(&cad), SyncDirection::Cad)
                            .with_cad_geometry(cad),
                    ),
                }
            }
        };

        let resolution = SyncResolution {
            direction,
            actor_id: ctx.actor_id,
            resolved_at: Utc::now(),
        };
        let resolved = self
            .reviews
            .approve(
                review_id,
                Approval {
                    reviewer_id: ctx.actor_id,
                    corrections: None,
                    notes: Some(format!("Forced sync: {direction} wins")),
                    resolution: Some(resolution),
                },
                effect,
            )
            .await?;

        let details = json!({
            "review_id": review_id,
            "cabinet_id": cabinet.id,
            "direction": direction,
            "resolved_by": ctx.actor_id,
            "fields": conflict.fields,
        });
        self.record(NewSyncEvent {
            project_id: resolved.project_id,
            cabinet_id: Some(cabinet.id),
            review_id: Some(review_id),
            kind: SyncEventKind::Force,
            direction,
            actor_id: ctx.actor_id,
            success: true,
            details: details.clone(),
        })
        .await?;

        info!(
            review_id,
            cabinet_id = cabinet.id,
            actor_id = ?ctx.actor_id,
            direction = %direction,
            "Sync conflict resolved"
        );
        Ok(SyncOutcome::ok(details))
    }

    // =========================================================================
    // STATUS
    // =========================================================================

    /// Read-only overview of a project's sync state.
    pub async fn status(&self, ctx: &RequestContext, project_id: Option<i64>) -> Result<SyncStatus> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Project, Capability::View).await?;

        let last_push = self.events.latest(project_id, SyncEventKind::Push).await?;
        let last_pull = self.events.latest(project_id, SyncEventKind::Pull).await?;
        let last_force = self.events.latest(project_id, SyncEventKind::Force).await?;
        let last_direction = [&last_push, &last_pull, &last_force]
            .into_iter()
            .flatten()
            .max_by_key(|e| (e.created_at, e.id))
            .map(|e| e.direction);

        let conflict_count = self
            .reviews
            .count_pending(project_id, Some(ReviewType::SyncConflict))
            .await?;
        let pending_reviews = self.reviews.count_pending(project_id, None).await?;
        let cabinets = self.cabinets.list_for_project(project_id).await?;
        let in_agreement = conflict_count == 0 && cabinets.iter().all(|c| c.sync_baseline.is_some());
        let last_extraction = self.jobs.latest_for_project(project_id).await?;
        let sync_available = self.extractor.connector().document_info().await.is_ok();

        Ok(SyncStatus {
            project_id,
            last_push: last_push.map(|e| e.created_at),
            last_pull: last_pull.map(|e| e.created_at),
            last_direction,
            conflict_count,
            pending_reviews,
            cabinet_count: cabinets.len() as i64,
            in_agreement,
            last_extraction,
            sync_available,
        })
    }

    /// Most recent audit entries for a project, newest first.
    pub async fn history(&self, project_id: Option<i64>, limit: i64) -> Result<Vec<SyncEvent>> {
        self.events.list(project_id, limit).await
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn load_cabinet(&self, id: i64) -> Result<Cabinet> {
        self.cabinets
            .get(id)
            .await?
            .ok_or_else(|| ResourceKind::Cabinet.not_found(id))
    }

    async fn push_cabinet(&self, cabinet: &Cabinet) -> Result<PushReport> {
        let payload = PushPayload {
            group: cabinet.group_name.clone(),
            width: cabinet.length_inches,
            height: cabinet.height_inches,
            depth: cabinet.depth_inches,
        };
        let script = push_script(&payload)?;
        let output = self
            .extractor
            .connector()
            .execute_script(&script, Some(self.config.script_timeout_secs))
            .await?;
        if !output.success {
            return Err(Error::ExternalBoundary(
                output
                    .error
                    .unwrap_or_else(|| "push script failed".to_string()),
            ));
        }
        let report = parse_push_report(output.output.as_deref())?;
        if !report.success {
            return Err(Error::ExternalBoundary(
                report
                    .error
                    .clone()
                    .unwrap_or_else(|| "push script reported failure".to_string()),
            ));
        }
        Ok(report)
    }

    async fn record(&self, event: NewSyncEvent) -> Result<SyncEvent> {
        self.events.record(event).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_failure(
        &self,
        ctx: &RequestContext,
        kind: SyncEventKind,
        direction: SyncDirection,
        project_id: Option<i64>,
        cabinet_id: Option<i64>,
        review_id: Option<i64>,
        message: &str,
    ) -> Result<()> {
        warn!(
            kind = kind.as_str(),
            cabinet_id = ?cabinet_id,
            error = %message,
            "Sync operation failed at CAD boundary"
        );
        self.record(NewSyncEvent {
            project_id,
            cabinet_id,
            review_id,
            kind,
            direction,
            actor_id: ctx.actor_id,
            success: false,
            details: json!({ "error": message }),
        })
        .await?;
        Ok(())
    }
}

/// Length fields only; CAD geometry carries no reliable component counts.
fn lengths_only(dims: &DimensionSet) -> DimensionSet {
    DimensionSet {
        width: dims.width,
        height: dims.height,
        depth: dims.depth,
        drawer_count: None,
        door_count: None,
    }
}
