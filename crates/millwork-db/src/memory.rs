//! In-memory implementation of every repository trait.
//!
//! All tables sit behind one mutex, so each trait call is atomic, including
//! an approval together with its cabinet write. Used by hermetic tests and by
//! the API binary when `DATABASE_URL` is unset.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use millwork_core::policy::LevelThresholds;
use millwork_core::{
    Approval, ApprovalEffect, Cabinet, CabinetDraft, CabinetRepository, DimensionSet, Error,
    ExtractionJob, ExtractionJobRepository, ExtractionReview, InterpretationResult, JobStatus,
    JobSummary, NewExtractionJob, NewReview, NewSyncEvent, ResourceKind, Result, ReviewFilter,
    ReviewPage, ReviewRepository, ReviewStatus, ReviewType, SyncBaseline, SyncEvent,
    SyncEventKind, SyncEventRepository,
};

#[derive(Default)]
struct Tables {
    jobs: BTreeMap<i64, ExtractionJob>,
    reviews: BTreeMap<i64, ExtractionReview>,
    cabinets: BTreeMap<i64, Cabinet>,
    events: Vec<SyncEvent>,
    next_job_id: i64,
    next_review_id: i64,
    next_cabinet_id: i64,
    next_event_id: i64,
}

impl Tables {
    fn insert_cabinet(&mut self, draft: &CabinetDraft, source_review_id: Option<i64>) -> Cabinet {
        self.next_cabinet_id += 1;
        let now = Utc::now();
        let cabinet = Cabinet {
            id: self.next_cabinet_id,
            project_id: draft.project_id,
            cabinet_number: draft.cabinet_number.clone(),
            full_code: draft.full_code.clone(),
            group_name: draft.group_name.clone(),
            length_inches: draft.length_inches,
            height_inches: draft.height_inches,
            depth_inches: draft.depth_inches,
            construction_type: draft.construction_type,
            face_frame_stile_width: draft.face_frame_stile_width,
            face_frame_rail_width: draft.face_frame_rail_width,
            door_gap: draft.door_gap,
            drawer_count: draft.drawer_count,
            door_count: draft.door_count,
            sections: draft.sections.clone(),
            shop_notes: draft.shop_notes.clone(),
            source: draft.source.clone(),
            source_review_id,
            sync_baseline: None,
            created_at: now,
            updated_at: now,
        };
        self.cabinets.insert(cabinet.id, cabinet.clone());
        cabinet
    }

    fn update_cabinet(
        &mut self,
        id: i64,
        dimensions: &DimensionSet,
        baseline: Option<&SyncBaseline>,
    ) -> Result<Cabinet> {
        let cabinet = self
            .cabinets
            .get_mut(&id)
            .ok_or_else(|| ResourceKind::Cabinet.not_found(id))?;
        if let Some(w) = dimensions.width {
            cabinet.length_inches = Some(w);
        }
        if let Some(h) = dimensions.height {
            cabinet.height_inches = Some(h);
        }
        if let Some(d) = dimensions.depth {
            cabinet.depth_inches = Some(d);
        }
        if let Some(n) = dimensions.drawer_count {
            cabinet.drawer_count = n;
        }
        if let Some(n) = dimensions.door_count {
            cabinet.door_count = n;
        }
        if let Some(b) = baseline {
            cabinet.sync_baseline = Some(b.clone());
        }
        cabinet.updated_at = Utc::now();
        Ok(cabinet.clone())
    }

    fn pending_review(&self, id: i64) -> Result<&ExtractionReview> {
        let review = self
            .reviews
            .get(&id)
            .ok_or_else(|| ResourceKind::Review.not_found(id))?;
        if !review.is_pending() {
            return Err(Error::AlreadyProcessed(format!(
                "review {id} is already {}",
                review.status
            )));
        }
        Ok(review)
    }
}

/// Repository store backed by process memory.
pub struct MemoryStore {
    tables: Mutex<Tables>,
    notify: Arc<Notify>,
    fail_cabinet_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            notify: Arc::new(Notify::new()),
            fail_cabinet_writes: AtomicBool::new(false),
        }
    }

    /// Woken whenever a job is queued.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Make every subsequent cabinet write fail, to exercise rollback paths.
    pub fn set_fail_cabinet_writes(&self, fail: bool) {
        self.fail_cabinet_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a job's `started_at`, to simulate a worker that died long ago.
    pub fn set_job_started_at(&self, id: i64, started_at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.lock()?;
        let job = tables
            .jobs
            .get_mut(&id)
            .ok_or_else(|| ResourceKind::ExtractionJob.not_found(id))?;
        job.started_at = Some(started_at);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))
    }

    fn check_cabinet_writes(&self) -> Result<()> {
        if self.fail_cabinet_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("cabinet write failed".into()));
        }
        Ok(())
    }

    fn insert_job(tables: &mut Tables, job: NewExtractionJob) -> ExtractionJob {
        tables.next_job_id += 1;
        let record = ExtractionJob {
            id: tables.next_job_id,
            uuid: Uuid::now_v7(),
            project_id: job.project_id,
            requested_by: job.requested_by,
            company_id: job.company_id,
            status: JobStatus::Pending,
            options: job.options,
            summary: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        tables.jobs.insert(record.id, record.clone());
        record
    }

    /// Move a running job to a terminal state. False if it was not running.
    fn finish_job(
        &self,
        id: i64,
        status: JobStatus,
        summary: Option<&JobSummary>,
        error: Option<&str>,
    ) -> Result<bool> {
        let mut tables = self.lock()?;
        let job = match tables.jobs.get_mut(&id) {
            Some(job) if job.status.can_transition_to(status) => job,
            _ => return Ok(false),
        };
        job.status = status;
        job.completed_at = Some(Utc::now());
        if let Some(summary) = summary {
            job.summary = Some(summary.clone());
        }
        if let Some(error) = error {
            job.error_message = Some(error.to_string());
        }
        Ok(true)
    }
}

fn matches_filter(review: &ExtractionReview, filter: &ReviewFilter) -> bool {
    filter.status.map_or(true, |s| review.status == s)
        && filter.project_id.map_or(true, |p| review.project_id == Some(p))
        && filter.review_type.map_or(true, |t| review.review_type == t)
        && filter
            .min_confidence
            .map_or(true, |min| review.confidence_score >= min)
        && filter
            .max_confidence
            .map_or(true, |max| review.confidence_score <= max)
}

#[async_trait]
impl ExtractionJobRepository for MemoryStore {
    async fn queue(&self, job: NewExtractionJob) -> Result<ExtractionJob> {
        let record = {
            let mut tables = self.lock()?;
            Self::insert_job(&mut tables, job)
        };
        self.notify.notify_waiters();
        Ok(record)
    }

    async fn queue_deduplicated(&self, job: NewExtractionJob) -> Result<(ExtractionJob, bool)> {
        let (record, created) = {
            let mut tables = self.lock()?;
            let active = tables
                .jobs
                .values()
                .rev()
                .find(|j| j.project_id == job.project_id && !j.status.is_terminal())
                .cloned();
            match active {
                Some(existing) => (existing, false),
                None => (Self::insert_job(&mut tables, job), true),
            }
        };
        if created {
            self.notify.notify_waiters();
        }
        Ok((record, created))
    }

    async fn get(&self, id: i64) -> Result<Option<ExtractionJob>> {
        Ok(self.lock()?.jobs.get(&id).cloned())
    }

    async fn claim_next(&self) -> Result<Option<ExtractionJob>> {
        let mut tables = self.lock()?;
        let next = tables
            .jobs
            .values_mut()
            .find(|j| j.status == JobStatus::Pending);
        Ok(next.map(|job| {
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            job.clone()
        }))
    }

    async fn complete(&self, id: i64, summary: &JobSummary) -> Result<bool> {
        self.finish_job(id, JobStatus::Complete, Some(summary), None)
    }

    async fn fail(&self, id: i64, error: &str, summary: Option<&JobSummary>) -> Result<bool> {
        self.finish_job(id, JobStatus::Failed, summary, Some(error))
    }

    async fn fail_stale(&self, started_before: DateTime<Utc>, error: &str) -> Result<Vec<i64>> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        let mut failed = Vec::new();
        for job in tables.jobs.values_mut() {
            let stale = job.status == JobStatus::Running
                && job.started_at.map_or(false, |s| s < started_before);
            if stale {
                job.status = JobStatus::Failed;
                job.error_message = Some(error.to_string());
                job.completed_at = Some(now);
                failed.push(job.id);
            }
        }
        Ok(failed)
    }

    async fn latest_for_project(&self, project_id: Option<i64>) -> Result<Option<ExtractionJob>> {
        Ok(self
            .lock()?
            .jobs
            .values()
            .rev()
            .find(|j| j.project_id == project_id)
            .cloned())
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn create(&self, review: NewReview) -> Result<ExtractionReview> {
        let mut tables = self.lock()?;
        if review.review_type == ReviewType::SyncConflict {
            let open = tables.reviews.values().any(|r| {
                r.is_pending()
                    && r.review_type == ReviewType::SyncConflict
                    && r.cabinet_id.is_some()
                    && r.cabinet_id == review.cabinet_id
            });
            if open {
                return Err(Error::Conflict(format!(
                    "cabinet {:?} already has an open sync conflict",
                    review.cabinet_id
                )));
            }
        }
        tables.next_review_id += 1;
        let now = Utc::now();
        let record = ExtractionReview {
            id: tables.next_review_id,
            job_id: review.job_id,
            project_id: review.project_id,
            review_type: review.review_type,
            group_name: review.candidate.name.clone(),
            extraction_data: review.candidate,
            confidence_score: review.score.total,
            confidence_level: review.score.level,
            score_details: Some(review.score),
            ai_interpretation: None,
            status: ReviewStatus::Pending,
            reviewer_id: None,
            reviewed_at: None,
            corrections: None,
            notes: None,
            rejection_reason: None,
            cabinet_id: review.cabinet_id,
            sync_conflict: review.sync_conflict,
            resolution: None,
            created_at: now,
            updated_at: now,
        };
        tables.reviews.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<ExtractionReview>> {
        Ok(self.lock()?.reviews.get(&id).cloned())
    }

    async fn list(&self, filter: &ReviewFilter) -> Result<ReviewPage> {
        let tables = self.lock()?;
        let filtered: Vec<&ExtractionReview> = tables
            .reviews
            .values()
            .filter(|r| matches_filter(r, filter))
            .collect();

        let mut visible: Vec<&ExtractionReview> = if filter.dedupe {
            filtered
                .iter()
                .filter(|r| {
                    !filtered.iter().any(|g| {
                        g.project_id == r.project_id
                            && g.group_name == r.group_name
                            && (g.created_at, g.id) > (r.created_at, r.id)
                    })
                })
                .copied()
                .collect()
        } else {
            filtered
        };
        visible.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let total = visible.len() as i64;
        let items = visible
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(ReviewPage {
            items,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    async fn list_for_job(&self, job_id: i64) -> Result<Vec<ExtractionReview>> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .filter(|r| r.job_id == Some(job_id))
            .cloned()
            .collect())
    }

    async fn approve(
        &self,
        id: i64,
        approval: Approval,
        effect: ApprovalEffect,
    ) -> Result<ExtractionReview> {
        let mut tables = self.lock()?;
        tables.pending_review(id)?;

        // Validate the effect before mutating anything.
        match &effect {
            ApprovalEffect::None => {}
            ApprovalEffect::CreateCabinet { .. } => {
                self.check_cabinet_writes()?;
                if tables
                    .cabinets
                    .values()
                    .any(|c| c.source_review_id == Some(id))
                {
                    return Err(Error::Conflict(format!(
                        "review {id} already materialized a cabinet"
                    )));
                }
            }
            ApprovalEffect::UpdateCabinet { cabinet_id, .. } => {
                self.check_cabinet_writes()?;
                if !tables.cabinets.contains_key(cabinet_id) {
                    return Err(ResourceKind::Cabinet.not_found(cabinet_id));
                }
            }
        }

        let cabinet_id = match &effect {
            ApprovalEffect::None => None,
            ApprovalEffect::CreateCabinet { draft, baseline } => {
                let created = tables.insert_cabinet(draft, Some(id)).id;
                if let Some(baseline) = baseline {
                    tables.update_cabinet(created, &DimensionSet::default(), Some(baseline))?;
                }
                Some(created)
            }
            ApprovalEffect::UpdateCabinet {
                cabinet_id,
                dimensions,
                baseline,
            } => Some(
                tables
                    .update_cabinet(*cabinet_id, dimensions, baseline.as_ref())?
                    .id,
            ),
        };

        let now = Utc::now();
        let review = tables
            .reviews
            .get_mut(&id)
            .ok_or_else(|| ResourceKind::Review.not_found(id))?;
        review.status = ReviewStatus::Approved;
        review.reviewer_id = approval.reviewer_id;
        review.reviewed_at = Some(now);
        review.corrections = approval.corrections;
        review.notes = approval.notes;
        review.resolution = approval.resolution;
        if cabinet_id.is_some() {
            review.cabinet_id = cabinet_id;
        }
        review.updated_at = now;
        Ok(review.clone())
    }

    async fn reject(
        &self,
        id: i64,
        reviewer_id: Option<i64>,
        reason: &str,
    ) -> Result<ExtractionReview> {
        let mut tables = self.lock()?;
        tables.pending_review(id)?;
        let now = Utc::now();
        let review = tables
            .reviews
            .get_mut(&id)
            .ok_or_else(|| ResourceKind::Review.not_found(id))?;
        review.status = ReviewStatus::Rejected;
        review.reviewer_id = reviewer_id;
        review.reviewed_at = Some(now);
        review.rejection_reason = Some(reason.to_string());
        review.updated_at = now;
        Ok(review.clone())
    }

    async fn record_interpretation(
        &self,
        id: i64,
        interpretation: &InterpretationResult,
        thresholds: &LevelThresholds,
    ) -> Result<ExtractionReview> {
        let mut tables = self.lock()?;
        tables.pending_review(id)?;
        let review = tables
            .reviews
            .get_mut(&id)
            .ok_or_else(|| ResourceKind::Review.not_found(id))?;
        let score = interpretation
            .improved_confidence
            .map_or(review.confidence_score, |s| s.max(review.confidence_score));
        review.confidence_score = score;
        review.confidence_level = thresholds.level_for(score);
        review.ai_interpretation = Some(interpretation.clone());
        review.updated_at = Utc::now();
        Ok(review.clone())
    }

    async fn pending_conflict_for_cabinet(
        &self,
        cabinet_id: i64,
    ) -> Result<Option<ExtractionReview>> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .find(|r| {
                r.is_pending()
                    && r.review_type == ReviewType::SyncConflict
                    && r.cabinet_id == Some(cabinet_id)
            })
            .cloned())
    }

    async fn count_pending(
        &self,
        project_id: Option<i64>,
        review_type: Option<ReviewType>,
    ) -> Result<i64> {
        Ok(self
            .lock()?
            .reviews
            .values()
            .filter(|r| {
                r.is_pending()
                    && project_id.map_or(true, |p| r.project_id == Some(p))
                    && review_type.map_or(true, |t| r.review_type == t)
            })
            .count() as i64)
    }

    async fn has_pending_for_group(
        &self,
        project_id: Option<i64>,
        group_name: &str,
        review_type: ReviewType,
    ) -> Result<bool> {
        Ok(self.lock()?.reviews.values().any(|r| {
            r.is_pending()
                && r.project_id == project_id
                && r.review_type == review_type
                && r.group_name == group_name
        }))
    }
}

#[async_trait]
impl CabinetRepository for MemoryStore {
    async fn create(&self, draft: &CabinetDraft, source_review_id: Option<i64>) -> Result<Cabinet> {
        self.check_cabinet_writes()?;
        Ok(self.lock()?.insert_cabinet(draft, source_review_id))
    }

    async fn create_many(
        &self,
        drafts: &[CabinetDraft],
        source_review_id: Option<i64>,
    ) -> Result<Vec<Cabinet>> {
        self.check_cabinet_writes()?;
        let mut tables = self.lock()?;
        Ok(drafts
            .iter()
            .map(|d| tables.insert_cabinet(d, source_review_id))
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Cabinet>> {
        Ok(self.lock()?.cabinets.get(&id).cloned())
    }

    async fn find_by_group(
        &self,
        project_id: Option<i64>,
        group_name: &str,
    ) -> Result<Option<Cabinet>> {
        Ok(self
            .lock()?
            .cabinets
            .values()
            .find(|c| c.project_id == project_id && c.group_name == group_name)
            .cloned())
    }

    async fn find_by_number(
        &self,
        project_id: Option<i64>,
        cabinet_number: &str,
    ) -> Result<Option<Cabinet>> {
        Ok(self
            .lock()?
            .cabinets
            .values()
            .find(|c| c.project_id == project_id && c.cabinet_number == cabinet_number)
            .cloned())
    }

    async fn list_for_project(&self, project_id: Option<i64>) -> Result<Vec<Cabinet>> {
        let mut cabinets: Vec<Cabinet> = self
            .lock()?
            .cabinets
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect();
        cabinets.sort_by(|a, b| (&a.group_name, a.id).cmp(&(&b.group_name, b.id)));
        Ok(cabinets)
    }

    async fn update_dimensions(
        &self,
        id: i64,
        dimensions: &DimensionSet,
        baseline: Option<&SyncBaseline>,
    ) -> Result<Cabinet> {
        self.check_cabinet_writes()?;
        self.lock()?.update_cabinet(id, dimensions, baseline)
    }

    async fn set_baseline(&self, id: i64, baseline: &SyncBaseline) -> Result<()> {
        let mut tables = self.lock()?;
        let cabinet = tables
            .cabinets
            .get_mut(&id)
            .ok_or_else(|| ResourceKind::Cabinet.not_found(id))?;
        cabinet.sync_baseline = Some(baseline.clone());
        cabinet.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl SyncEventRepository for MemoryStore {
    async fn record(&self, event: NewSyncEvent) -> Result<SyncEvent> {
        let mut tables = self.lock()?;
        tables.next_event_id += 1;
        let record = SyncEvent {
            id: tables.next_event_id,
            project_id: event.project_id,
            cabinet_id: event.cabinet_id,
            review_id: event.review_id,
            kind: event.kind,
            direction: event.direction,
            actor_id: event.actor_id,
            success: event.success,
            details: event.details,
            created_at: Utc::now(),
        };
        tables.events.push(record.clone());
        Ok(record)
    }

    async fn latest(
        &self,
        project_id: Option<i64>,
        kind: SyncEventKind,
    ) -> Result<Option<SyncEvent>> {
        Ok(self
            .lock()?
            .events
            .iter()
            .rev()
            .find(|e| e.project_id == project_id && e.kind == kind && e.success)
            .cloned())
    }

    async fn list(&self, project_id: Option<i64>, limit: i64) -> Result<Vec<SyncEvent>> {
        Ok(self
            .lock()?
            .events
            .iter()
            .rev()
            .filter(|e| e.project_id == project_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use millwork_core::{Candidate, ConfidenceScorer, ScanOptions};

    fn new_review(name: &str, project_id: Option<i64>) -> NewReview {
        let candidate = Candidate::named(name);
        let score = ConfidenceScorer::default().score(&candidate);
        NewReview {
            job_id: None,
            project_id,
            review_type: ReviewType::LowConfidence,
            candidate,
            score,
            cabinet_id: None,
            sync_conflict: None,
        }
    }

    #[tokio::test]
    async fn test_claim_is_fifo_and_single() {
        let store = MemoryStore::new();
        let first = store.queue(NewExtractionJob::default()).await.unwrap();
        store.queue(NewExtractionJob::default()).await.unwrap();

        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert!(claimed.started_at.is_some());

        let second = store.claim_next().await.unwrap().unwrap();
        assert_ne!(second.id, first.id);
        assert!(store.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queue_deduplicated_returns_active_job() {
        let store = MemoryStore::new();
        let job = NewExtractionJob {
            project_id: Some(3),
            options: ScanOptions::default(),
            ..Default::default()
        };
        let (first, created) = store.queue_deduplicated(job.clone()).await.unwrap();
        assert!(created);
        let (again, created) = store.queue_deduplicated(job.clone()).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);

        let other = NewExtractionJob {
            project_id: Some(4),
            ..Default::default()
        };
        assert!(store.queue_deduplicated(other).await.unwrap().1);
    }

    #[tokio::test]
    async fn test_terminal_write_happens_once() {
        let store = MemoryStore::new();
        let job = store.queue(NewExtractionJob::default()).await.unwrap();
        assert!(!store.complete(job.id, &JobSummary::default()).await.unwrap());

        store.claim_next().await.unwrap();
        assert!(store.complete(job.id, &JobSummary::default()).await.unwrap());
        assert!(!store.fail(job.id, "late", None).await.unwrap());

        let stored = ExtractionJobRepository::get(&store, job.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, JobStatus::Complete);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_fail_stale_only_touches_old_running_jobs() {
        let store = MemoryStore::new();
        let old = store.queue(NewExtractionJob::default()).await.unwrap();
        let fresh = store.queue(NewExtractionJob::default()).await.unwrap();
        store.claim_next().await.unwrap();
        store.claim_next().await.unwrap();
        store
            .set_job_started_at(old.id, Utc::now() - chrono::Duration::hours(2))
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(15);
        let failed = store.fail_stale(cutoff, "worker lost").await.unwrap();
        assert_eq!(failed, vec![old.id]);

        let fresh = ExtractionJobRepository::get(&store, fresh.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_approve_twice_is_already_processed() {
        let store = MemoryStore::new();
        let review = ReviewRepository::create(&store, new_review("Austin-Van", None))
            .await
            .unwrap();
        store
            .approve(review.id, Approval::default(), ApprovalEffect::None)
            .await
            .unwrap();
        let err = store
            .approve(review.id, Approval::default(), ApprovalEffect::None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyProcessed(_)));
        let err = store.reject(review.id, None, "nope").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyProcessed(_)));
    }

    #[tokio::test]
    async fn test_list_dedupe_keeps_newest_per_group() {
        let store = MemoryStore::new();
        ReviewRepository::create(&store, new_review("Austin-Van", Some(1)))
            .await
            .unwrap();
        let newer = ReviewRepository::create(&store, new_review("Austin-Van", Some(1)))
            .await
            .unwrap();
        ReviewRepository::create(&store, new_review("Austin-Base", Some(1)))
            .await
            .unwrap();

        let all = ReviewRepository::list(&store, &ReviewFilter::default())
            .await
            .unwrap();
        assert_eq!(all.total, 3);

        let deduped = ReviewRepository::list(
            &store,
            &ReviewFilter {
                dedupe: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(deduped.total, 2);
        assert!(deduped.items.iter().any(|r| r.id == newer.id));
    }

    #[tokio::test]
    async fn test_list_paging() {
        let store = MemoryStore::new();
        for i in 0..5 {
            ReviewRepository::create(&store, new_review(&format!("Cab-{i}"), None))
                .await
                .unwrap();
        }
        let page = ReviewRepository::list(
            &store,
            &ReviewFilter {
                limit: 2,
                offset: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more());
    }

    #[tokio::test]
    async fn test_record_interpretation_never_lowers_score() {
        let store = MemoryStore::new();
        let review = ReviewRepository::create(&store, new_review("Austin-Van", None))
            .await
            .unwrap();
        let before = review.confidence_score;
        let lower = InterpretationResult {
            recommendation: millwork_core::Recommendation::Review,
            corrected_dimensions: None,
            improved_confidence: Some(0.0),
            warnings: vec![],
            reasoning: None,
            source: Default::default(),
        };
        let updated = store
            .record_interpretation(review.id, &lower, &LevelThresholds::default())
            .await
            .unwrap();
        assert_eq!(updated.confidence_score, before);
        assert!(updated.ai_interpretation.is_some());
    }

    #[tokio::test]
    async fn test_record_interpretation_on_decided_review_is_refused() {
        let store = MemoryStore::new();
        let review = ReviewRepository::create(&store, new_review("Austin-Base", None))
            .await
            .unwrap();
        store
            .reject(review.id, Some(2), "duplicate")
            .await
            .unwrap();

        let answer = InterpretationResult {
            recommendation: millwork_core::Recommendation::Approve,
            corrected_dimensions: None,
            improved_confidence: Some(99.0),
            warnings: vec![],
            reasoning: None,
            source: Default::default(),
        };
        let err = store
            .record_interpretation(review.id, &answer, &LevelThresholds::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyProcessed(_)));

        let stored = ReviewRepository::get(&store, review.id).await.unwrap().unwrap();
        assert!(stored.ai_interpretation.is_none());
        assert_eq!(stored.confidence_score, review.confidence_score);
    }

    #[tokio::test]
    async fn test_has_pending_for_group_matches_project_type_and_status() {
        let store = MemoryStore::new();
        let mut proposal = new_review("Austin-Van", Some(3));
        proposal.review_type = ReviewType::NewFromCad;
        let review = ReviewRepository::create(&store, proposal).await.unwrap();

        async fn pending(store: &MemoryStore, project: Option<i64>, group: &str, kind: ReviewType) -> bool {
            store.has_pending_for_group(project, group, kind).await.unwrap()
        }
        assert!(pending(&store, Some(3), "Austin-Van", ReviewType::NewFromCad).await);
        assert!(!pending(&store, Some(4), "Austin-Van", ReviewType::NewFromCad).await);
        assert!(!pending(&store, None, "Austin-Van", ReviewType::NewFromCad).await);
        assert!(!pending(&store, Some(3), "Austin-Base", ReviewType::NewFromCad).await);
        assert!(!pending(&store, Some(3), "Austin-Van", ReviewType::LowConfidence).await);

        store.reject(review.id, None, "not a cabinet").await.unwrap();
        assert!(!pending(&store, Some(3), "Austin-Van", ReviewType::NewFromCad).await);
    }
}
