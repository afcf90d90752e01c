//! Sync audit log repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use millwork_core::{
    Error, NewSyncEvent, Result, SyncEvent, SyncEventKind, SyncEventRepository,
};

const EVENT_COLUMNS: &str =
    "id, project_id, cabinet_id, review_id, kind, direction, actor_id, success, details, created_at";

/// PostgreSQL implementation of SyncEventRepository.
pub struct PgSyncEventRepository {
    pool: Pool<Postgres>,
}

impl PgSyncEventRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_event_row(row: &PgRow) -> Result<SyncEvent> {
        let kind: String = row.try_get("kind")?;
        let direction: String = row.try_get("direction")?;
        Ok(SyncEvent {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            cabinet_id: row.try_get("cabinet_id")?,
            review_id: row.try_get("review_id")?,
            kind: kind.parse()?,
            direction: direction.parse()?,
            actor_id: row.try_get("actor_id")?,
            success: row.try_get("success")?,
            details: row.try_get("details")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl SyncEventRepository for PgSyncEventRepository {
    async fn record(&self, event: NewSyncEvent) -> Result<SyncEvent> {
        let row = sqlx::query(&format!(
            "INSERT INTO sync_event (project_id, cabinet_id, review_id, kind, direction, actor_id,
                 success, details, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(event.project_id)
        .bind(event.cabinet_id)
        .bind(event.review_id)
        .bind(event.kind.as_str())
        .bind(event.direction.as_str())
        .bind(event.actor_id)
        .bind(event.success)
        .bind(&event.details)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Self::parse_event_row(&row)
    }

    async fn latest(
        &self,
        project_id: Option<i64>,
        kind: SyncEventKind,
    ) -> Result<Option<SyncEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM sync_event
             WHERE project_id IS NOT DISTINCT FROM $1 AND kind = $2 AND success
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))
        .bind(project_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::parse_event_row).transpose()
    }

    async fn list(&self, project_id: Option<i64>, limit: i64) -> Result<Vec<SyncEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM sync_event
             WHERE project_id IS NOT DISTINCT FROM $1
             ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(project_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(Self::parse_event_row).collect()
    }
}
