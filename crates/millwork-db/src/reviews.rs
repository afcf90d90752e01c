//! Review queue repository implementation.
//!
//! Decisions lock the review row (`SELECT ... FOR UPDATE`), check it is still
//! pending, apply the approval effect and flip the status in one transaction.
//! If the effect fails the transaction rolls back and the review stays pending.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};

use millwork_core::policy::LevelThresholds;
use millwork_core::{
    Approval, ApprovalEffect, Candidate, ConfidenceScore, DimensionSet, Error,
    ExtractionReview, InterpretationResult, NewReview, ResourceKind, Result, ReviewFilter,
    ReviewPage, ReviewRepository, ReviewStatus, ReviewType, SyncConflict, SyncResolution,
};

use crate::cabinets::{insert_cabinet, update_cabinet_dimensions};

const REVIEW_COLUMNS: &str = "id, job_id, project_id, review_type, group_name, extraction_data, \
    confidence_score, confidence_level, score_details, ai_interpretation, status, reviewer_id, \
    reviewed_at, corrections, notes, rejection_reason, cabinet_id, sync_conflict, resolution, \
    created_at, updated_at";

/// Filtered (and optionally de-duplicated) review set. `$1..$6` are the filter
/// parameters shared by the page and count queries.
const FILTERED_CTE: &str = "WITH filtered AS (
        SELECT * FROM extraction_review
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::bigint IS NULL OR project_id = $2)
          AND ($3::text IS NULL OR review_type = $3)
          AND ($4::float8 IS NULL OR confidence_score >= $4)
          AND ($5::float8 IS NULL OR confidence_score <= $5)
    ),
    visible AS (
        SELECT * FROM filtered f
        WHERE NOT $6 OR NOT EXISTS (
            SELECT 1 FROM filtered g
            WHERE g.project_id IS NOT DISTINCT FROM f.project_id
              AND g.group_name = f.group_name
              AND (g.created_at, g.id) > (f.created_at, f.id)
        )
    )";

/// PostgreSQL implementation of ReviewRepository.
pub struct PgReviewRepository {
    pool: Pool<Postgres>,
}

impl PgReviewRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_review_row(row: &PgRow) -> Result<ExtractionReview> {
        let review_type: String = row.try_get("review_type")?;
        let level: String = row.try_get("confidence_level")?;
        let status: String = row.try_get("status")?;
        let data: Json<Candidate> = row.try_get("extraction_data")?;
        let details: Option<Json<ConfidenceScore>> = row.try_get("score_details")?;
        let interpretation: Option<Json<InterpretationResult>> =
            row.try_get("ai_interpretation")?;
        let corrections: Option<Json<DimensionSet>> = row.try_get("corrections")?;
        let conflict: Option<Json<SyncConflict>> = row.try_get("sync_conflict")?;
        let resolution: Option<Json<SyncResolution>> = row.try_get("resolution")?;
        Ok(ExtractionReview {
            id: row.try_get("id")?,
            job_id: row.try_get("job_id")?,
            project_id: row.try_get("project_id")?,
            review_type: review_type.parse()?,
            group_name: row.try_get("group_name")?,
            extraction_data: data.0,
            confidence_score: row.try_get("confidence_score")?,
            confidence_level: level.parse()?,
            score_details: details.map(|d| d.0),
            ai_interpretation: interpretation.map(|i| i.0),
            status: status.parse()?,
            reviewer_id: row.try_get("reviewer_id")?,
            reviewed_at: row.try_get("reviewed_at")?,
            corrections: corrections.map(|c| c.0),
            notes: row.try_get("notes")?,
            rejection_reason: row.try_get("rejection_reason")?,
            cabinet_id: row.try_get("cabinet_id")?,
            sync_conflict: conflict.map(|c| c.0),
            resolution: resolution.map(|r| r.0),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Why a `status = 'pending'` guarded write matched no row.
    async fn not_pending(&self, id: i64) -> Error {
        let status: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM extraction_review WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;
        match status {
            Ok(None) => ResourceKind::Review.not_found(id),
            Ok(Some(status)) => {
                Error::AlreadyProcessed(format!("review {id} is already {status}"))
            }
            Err(e) => Error::Database(e),
        }
    }

    /// Lock a review and verify it is still pending.
    async fn lock_pending(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        id: i64,
    ) -> Result<()> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM extraction_review WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(Error::Database)?;
        match status.as_deref() {
            None => Err(ResourceKind::Review.not_found(id)),
            Some("pending") => Ok(()),
            Some(other) => Err(Error::AlreadyProcessed(format!(
                "review {id} is already {other}"
            ))),
        }
    }
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    async fn create(&self, review: NewReview) -> Result<ExtractionReview> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO extraction_review (job_id, project_id, review_type, group_name,
                 extraction_data, confidence_score, confidence_level, score_details, status,
                 cabinet_id, sync_conflict, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $10, $11, $11)
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(review.job_id)
        .bind(review.project_id)
        .bind(review.review_type.as_str())
        .bind(&review.candidate.name)
        .bind(Json(&review.candidate))
        .bind(review.score.total)
        .bind(review.score.level.as_str())
        .bind(Json(&review.score))
        .bind(review.cabinet_id)
        .bind(review.sync_conflict.as_ref().map(Json))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Self::parse_review_row(&row)
    }

    async fn get(&self, id: i64) -> Result<Option<ExtractionReview>> {
        let row = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM extraction_review WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::parse_review_row).transpose()
    }

    async fn list(&self, filter: &ReviewFilter) -> Result<ReviewPage> {
        let status = filter.status.map(|s| s.as_str());
        let review_type = filter.review_type.map(|t| t.as_str());

        let total: i64 = sqlx::query_scalar(&format!("{FILTERED_CTE} SELECT COUNT(*) FROM visible"))
            .bind(status)
            .bind(filter.project_id)
            .bind(review_type)
            .bind(filter.min_confidence)
            .bind(filter.max_confidence)
            .bind(filter.dedupe)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "{FILTERED_CTE}
             SELECT {REVIEW_COLUMNS} FROM visible
             ORDER BY created_at DESC, id DESC
             LIMIT $7 OFFSET $8"
        ))
        .bind(status)
        .bind(filter.project_id)
        .bind(review_type)
        .bind(filter.min_confidence)
        .bind(filter.max_confidence)
        .bind(filter.dedupe)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ReviewPage {
            items: rows
                .iter()
                .map(Self::parse_review_row)
                .collect::<Result<Vec<_>>>()?,
            total,
            limit: filter.limit,
            offset: filter.offset,
        })
    }

    async fn list_for_job(&self, job_id: i64) -> Result<Vec<ExtractionReview>> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM extraction_review WHERE job_id = $1 ORDER BY id ASC"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(Self::parse_review_row).collect()
    }

    async fn approve(
        &self,
        id: i64,
        approval: Approval,
        effect: ApprovalEffect,
    ) -> Result<ExtractionReview> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::lock_pending(&mut tx, id).await?;

        let cabinet_id = match &effect {
            ApprovalEffect::None => None,
            ApprovalEffect::CreateCabinet { draft, baseline } => {
                let created = insert_cabinet(&mut tx, draft, Some(id)).await?.id;
                if let Some(baseline) = baseline {
                    update_cabinet_dimensions(
                        &mut tx,
                        created,
                        &DimensionSet::default(),
                        Some(baseline),
                    )
                    .await?;
                }
                Some(created)
            }
            ApprovalEffect::UpdateCabinet {
                cabinet_id,
                dimensions,
                baseline,
            } => Some(
                update_cabinet_dimensions(&mut tx, *cabinet_id, dimensions, baseline.as_ref())
                    .await?
                    .id,
            ),
        };

        let row = sqlx::query(&format!(
            "UPDATE extraction_review SET
                 status = 'approved', reviewer_id = $1, reviewed_at = $2, corrections = $3,
                 notes = $4, resolution = $5, cabinet_id = COALESCE($6, cabinet_id),
                 updated_at = $2
             WHERE id = $7 AND status = 'pending'
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(approval.reviewer_id)
        .bind(Utc::now())
        .bind(approval.corrections.map(Json))
        .bind(&approval.notes)
        .bind(approval.resolution.as_ref().map(Json))
        .bind(cabinet_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        info!(
            review_id = id,
            cabinet_id = ?cabinet_id,
            "Review approved"
        );
        Self::parse_review_row(&row)
    }

    async fn reject(
        &self,
        id: i64,
        reviewer_id: Option<i64>,
        reason: &str,
    ) -> Result<ExtractionReview> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        Self::lock_pending(&mut tx, id).await?;

        let row = sqlx::query(&format!(
            "UPDATE extraction_review SET
                 status = 'rejected', reviewer_id = $1, reviewed_at = $2,
                 rejection_reason = $3, updated_at = $2
             WHERE id = $4 AND status = 'pending'
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(reviewer_id)
        .bind(Utc::now())
        .bind(reason)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        info!(review_id = id, "Review rejected");
        Self::parse_review_row(&row)
    }

    async fn record_interpretation(
        &self,
        id: i64,
        interpretation: &InterpretationResult,
        thresholds: &LevelThresholds,
    ) -> Result<ExtractionReview> {
        // GREATEST keeps the stored score monotonic under concurrent writers.
        // Decided reviews are frozen.
        let row = sqlx::query(&format!(
            "UPDATE extraction_review SET
                 ai_interpretation = $1,
                 confidence_score = GREATEST(confidence_score, COALESCE($2, confidence_score)),
                 confidence_level = CASE
                     WHEN GREATEST(confidence_score, COALESCE($2, confidence_score)) >= $3 THEN 'high'
                     WHEN GREATEST(confidence_score, COALESCE($2, confidence_score)) >= $4 THEN 'medium'
                     ELSE 'low'
                 END,
                 updated_at = $5
             WHERE id = $6 AND status = 'pending'
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(Json(interpretation))
        .bind(interpretation.improved_confidence)
        .bind(thresholds.high)
        .bind(thresholds.medium)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => {
                debug!(review_id = id, "Interpretation stored");
                Self::parse_review_row(&row)
            }
            None => Err(self.not_pending(id).await),
        }
    }

    async fn pending_conflict_for_cabinet(
        &self,
        cabinet_id: i64,
    ) -> Result<Option<ExtractionReview>> {
        let row = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM extraction_review
             WHERE cabinet_id = $1 AND review_type = $2 AND status = $3
             LIMIT 1"
        ))
        .bind(cabinet_id)
        .bind(ReviewType::SyncConflict.as_str())
        .bind(ReviewStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::parse_review_row).transpose()
    }

    async fn count_pending(
        &self,
        project_id: Option<i64>,
        review_type: Option<ReviewType>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM extraction_review
             WHERE status = 'pending'
               AND ($1::bigint IS NULL OR project_id = $1)
               AND ($2::text IS NULL OR review_type = $2)",
        )
        .bind(project_id)
        .bind(review_type.map(|t| t.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    async fn has_pending_for_group(
        &self,
        project_id: Option<i64>,
        group_name: &str,
        review_type: ReviewType,
    ) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM extraction_review
                 WHERE status = 'pending'
                   AND project_id IS NOT DISTINCT FROM $1
                   AND group_name = $2
                   AND review_type = $3
             )",
        )
        .bind(project_id)
        .bind(group_name)
        .bind(review_type.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)
    }
}
