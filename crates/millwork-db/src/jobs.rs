//! Extraction job repository implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use millwork_core::{
    Error, ExtractionJob, ExtractionJobRepository, JobSummary, NewExtractionJob, Result,
    ScanOptions,
};

const JOB_COLUMNS: &str = "id, uuid, project_id, requested_by, company_id, status, options, \
                           summary, error_message, created_at, started_at, completed_at";

const DEDUPE_ATTEMPTS: usize = 3;

/// Key shared by every deduplicated scan of one project.
fn dedupe_key(project_id: Option<i64>) -> String {
    match project_id {
        Some(id) => format!("project:{id}"),
        None => "project:none".to_string(),
    }
}

/// PostgreSQL implementation of ExtractionJobRepository.
pub struct PgExtractionJobRepository {
    pool: Pool<Postgres>,
    /// Woken whenever a job is queued so idle workers poll immediately.
    notify: Arc<Notify>,
}

impl PgExtractionJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a repository sharing an existing notify handle.
    pub fn with_notify(pool: Pool<Postgres>, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    pub(crate) fn parse_job_row(row: &PgRow) -> Result<ExtractionJob> {
        let status: String = row.try_get("status")?;
        let options: Json<ScanOptions> = row.try_get("options")?;
        let summary: Option<Json<JobSummary>> = row.try_get("summary")?;
        Ok(ExtractionJob {
            id: row.try_get("id")?,
            uuid: row.try_get("uuid")?,
            project_id: row.try_get("project_id")?,
            requested_by: row.try_get("requested_by")?,
            company_id: row.try_get("company_id")?,
            status: status.parse()?,
            options: options.0,
            summary: summary.map(|s| s.0),
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[async_trait]
impl ExtractionJobRepository for PgExtractionJobRepository {
    async fn queue(&self, job: NewExtractionJob) -> Result<ExtractionJob> {
        let row = sqlx::query(&format!(
            "INSERT INTO extraction_job (uuid, project_id, requested_by, company_id, status, options, created_at)
             VALUES ($1, $2, $3, $4, 'pending', $5, $6)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(job.project_id)
        .bind(job.requested_by)
        .bind(job.company_id)
        .bind(Json(job.options))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.notify.notify_waiters();
        Self::parse_job_row(&row)
    }

    async fn queue_deduplicated(&self, job: NewExtractionJob) -> Result<(ExtractionJob, bool)> {
        // The partial unique index on dedupe_key settles concurrent requests:
        // the losing insert matches no row and reads the winner back.
        let key = dedupe_key(job.project_id);
        for _ in 0..DEDUPE_ATTEMPTS {
            let inserted = sqlx::query(&format!(
                "INSERT INTO extraction_job
                     (uuid, project_id, requested_by, company_id, status, options, created_at, dedupe_key)
                 SELECT $1, $2, $3, $4, 'pending', $5, $6, $7
                 WHERE NOT EXISTS (
                     SELECT 1 FROM extraction_job
                     WHERE project_id IS NOT DISTINCT FROM $2
                       AND status IN ('pending', 'running')
                 )
                 ON CONFLICT (dedupe_key)
                     WHERE dedupe_key IS NOT NULL AND status IN ('pending', 'running')
                     DO NOTHING
                 RETURNING {JOB_COLUMNS}"
            ))
            .bind(Uuid::now_v7())
            .bind(job.project_id)
            .bind(job.requested_by)
            .bind(job.company_id)
            .bind(Json(&job.options))
            .bind(Utc::now())
            .bind(&key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

            if let Some(row) = inserted {
                self.notify.notify_waiters();
                return Ok((Self::parse_job_row(&row)?, true));
            }

            let existing = sqlx::query(&format!(
                "SELECT {JOB_COLUMNS} FROM extraction_job
                 WHERE project_id IS NOT DISTINCT FROM $1 AND status IN ('pending', 'running')
                 ORDER BY created_at DESC LIMIT 1"
            ))
            .bind(job.project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

            if let Some(row) = existing {
                return Ok((Self::parse_job_row(&row)?, false));
            }
            // The active job finished between the two statements; try again.
            debug!(project_id = ?job.project_id, "Active job finished during dedupe, retrying");
        }
        Err(Error::Conflict(format!(
            "could not queue a scan for project {:?}: active jobs keep changing",
            job.project_id
        )))
    }

    async fn get(&self, id: i64) -> Result<Option<ExtractionJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM extraction_job WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn claim_next(&self) -> Result<Option<ExtractionJob>> {
        // FOR UPDATE SKIP LOCKED lets any number of workers claim concurrently.
        let row = sqlx::query(&format!(
            "UPDATE extraction_job
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM extraction_job
                 WHERE status = 'pending'
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn complete(&self, id: i64, summary: &JobSummary) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE extraction_job
             SET status = 'complete', summary = $1, completed_at = $2
             WHERE id = $3 AND status = 'running'",
        )
        .bind(Json(summary))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail(&self, id: i64, error: &str, summary: Option<&JobSummary>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE extraction_job
             SET status = 'failed', error_message = $1, summary = COALESCE($2, summary),
                 completed_at = $3
             WHERE id = $4 AND status = 'running'",
        )
        .bind(error)
        .bind(summary.map(Json))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail_stale(&self, started_before: DateTime<Utc>, error: &str) -> Result<Vec<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "UPDATE extraction_job
             SET status = 'failed', error_message = $1, completed_at = $2
             WHERE status = 'running' AND started_at < $3
             RETURNING id",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(started_before)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(ids)
    }

    async fn latest_for_project(&self, project_id: Option<i64>) -> Result<Option<ExtractionJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM extraction_job
             WHERE project_id IS NOT DISTINCT FROM $1
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::parse_job_row).transpose()
    }
}
