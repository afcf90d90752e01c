//! Cabinet repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, Pool, Postgres, Row};
use tracing::debug;

use millwork_core::{
    Cabinet, CabinetDraft, CabinetRepository, CabinetSection, CadSource, DimensionSet, Error,
    ResourceKind, Result, SyncBaseline,
};

const CABINET_COLUMNS: &str = "id, project_id, cabinet_number, full_code, group_name, \
    length_inches, height_inches, depth_inches, construction_type, face_frame_stile_width, \
    face_frame_rail_width, door_gap, drawer_count, door_count, sections, shop_notes, source, \
    source_review_id, sync_baseline, created_at, updated_at";

/// PostgreSQL implementation of CabinetRepository.
pub struct PgCabinetRepository {
    pool: Pool<Postgres>,
}

impl PgCabinetRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_cabinet_row(row: &PgRow) -> Result<Cabinet> {
    let construction_type: String = row.try_get("construction_type")?;
    let sections: Json<Vec<CabinetSection>> = row.try_get("sections")?;
    let source: Json<CadSource> = row.try_get("source")?;
    let baseline: Option<Json<SyncBaseline>> = row.try_get("sync_baseline")?;
    Ok(Cabinet {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        cabinet_number: row.try_get("cabinet_number")?,
        full_code: row.try_get("full_code")?,
        group_name: row.try_get("group_name")?,
        length_inches: row.try_get("length_inches")?,
        height_inches: row.try_get("height_inches")?,
        depth_inches: row.try_get("depth_inches")?,
        construction_type: construction_type.parse()?,
        face_frame_stile_width: row.try_get("face_frame_stile_width")?,
        face_frame_rail_width: row.try_get("face_frame_rail_width")?,
        door_gap: row.try_get("door_gap")?,
        drawer_count: row.try_get("drawer_count")?,
        door_count: row.try_get("door_count")?,
        sections: sections.0,
        shop_notes: row.try_get("shop_notes")?,
        source: source.0,
        source_review_id: row.try_get("source_review_id")?,
        sync_baseline: baseline.map(|b| b.0),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert one draft on an existing connection or transaction.
pub(crate) async fn insert_cabinet(
    conn: &mut PgConnection,
    draft: &CabinetDraft,
    source_review_id: Option<i64>,
) -> Result<Cabinet> {
    let now = Utc::now();
    let row = sqlx::query(&format!(
        "INSERT INTO cabinet (project_id, cabinet_number, full_code, group_name, length_inches,
             height_inches, depth_inches, construction_type, face_frame_stile_width,
             face_frame_rail_width, door_gap, drawer_count, door_count, sections, shop_notes,
             source, source_review_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18)
         RETURNING {CABINET_COLUMNS}"
    ))
    .bind(draft.project_id)
    .bind(&draft.cabinet_number)
    .bind(&draft.full_code)
    .bind(&draft.group_name)
    .bind(draft.length_inches)
    .bind(draft.height_inches)
    .bind(draft.depth_inches)
    .bind(draft.construction_type.as_str())
    .bind(draft.face_frame_stile_width)
    .bind(draft.face_frame_rail_width)
    .bind(draft.door_gap)
    .bind(draft.drawer_count)
    .bind(draft.door_count)
    .bind(Json(&draft.sections))
    .bind(&draft.shop_notes)
    .bind(Json(&draft.source))
    .bind(source_review_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await
    .map_err(Error::Database)?;
    parse_cabinet_row(&row)
}

/// Overwrite present dimension fields on an existing connection or transaction.
pub(crate) async fn update_cabinet_dimensions(
    conn: &mut PgConnection,
    id: i64,
    dimensions: &DimensionSet,
    baseline: Option<&SyncBaseline>,
) -> Result<Cabinet> {
    let row = sqlx::query(&format!(
        "UPDATE cabinet SET
             length_inches = COALESCE($1, length_inches),
             height_inches = COALESCE($2, height_inches),
             depth_inches  = COALESCE($3, depth_inches),
             drawer_count  = COALESCE($4, drawer_count),
             door_count    = COALESCE($5, door_count),
             sync_baseline = COALESCE($6, sync_baseline),
             updated_at    = $7
         WHERE id = $8
         RETURNING {CABINET_COLUMNS}"
    ))
    .bind(dimensions.width)
    .bind(dimensions.height)
    .bind(dimensions.depth)
    .bind(dimensions.drawer_count)
    .bind(dimensions.door_count)
    .bind(baseline.map(Json))
    .bind(Utc::now())
    .bind(id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(Error::Database)?;
    match row {
        Some(row) => parse_cabinet_row(&row),
        None => Err(ResourceKind::Cabinet.not_found(id)),
    }
}

#[async_trait]
impl CabinetRepository for PgCabinetRepository {
    async fn create(&self, draft: &CabinetDraft, source_review_id: Option<i64>) -> Result<Cabinet> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        insert_cabinet(&mut conn, draft, source_review_id).await
    }

    async fn create_many(
        &self,
        drafts: &[CabinetDraft],
        source_review_id: Option<i64>,
    ) -> Result<Vec<Cabinet>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            created.push(insert_cabinet(&mut tx, draft, source_review_id).await?);
        }
        tx.commit().await.map_err(Error::Database)?;
        debug!(count = created.len(), "Inserted cabinets");
        Ok(created)
    }

    async fn get(&self, id: i64) -> Result<Option<Cabinet>> {
        let row = sqlx::query(&format!("SELECT {CABINET_COLUMNS} FROM cabinet WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(parse_cabinet_row).transpose()
    }

    async fn find_by_group(
        &self,
        project_id: Option<i64>,
        group_name: &str,
    ) -> Result<Option<Cabinet>> {
        let row = sqlx::query(&format!(
            "SELECT {CABINET_COLUMNS} FROM cabinet
             WHERE project_id IS NOT DISTINCT FROM $1 AND group_name = $2
             ORDER BY id ASC LIMIT 1"
        ))
        .bind(project_id)
        .bind(group_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(parse_cabinet_row).transpose()
    }

    async fn find_by_number(
        &self,
        project_id: Option<i64>,
        cabinet_number: &str,
    ) -> Result<Option<Cabinet>> {
        let row = sqlx::query(&format!(
            "SELECT {CABINET_COLUMNS} FROM cabinet
             WHERE project_id IS NOT DISTINCT FROM $1 AND cabinet_number = $2
             ORDER BY id ASC LIMIT 1"
        ))
        .bind(project_id)
        .bind(cabinet_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(parse_cabinet_row).transpose()
    }

    async fn list_for_project(&self, project_id: Option<i64>) -> Result<Vec<Cabinet>> {
        let rows = sqlx::query(&format!(
            "SELECT {CABINET_COLUMNS} FROM cabinet
             WHERE project_id IS NOT DISTINCT FROM $1
             ORDER BY group_name ASC, id ASC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(parse_cabinet_row).collect()
    }

    async fn update_dimensions(
        &self,
        id: i64,
        dimensions: &DimensionSet,
        baseline: Option<&SyncBaseline>,
    ) -> Result<Cabinet> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        update_cabinet_dimensions(&mut conn, id, dimensions, baseline).await
    }

    async fn set_baseline(&self, id: i64, baseline: &SyncBaseline) -> Result<()> {
        let result = sqlx::query("UPDATE cabinet SET sync_baseline = $1, updated_at = $2 WHERE id = $3")
            .bind(Json(baseline))
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        if result.rows_affected() == 0 {
            return Err(ResourceKind::Cabinet.not_found(id));
        }
        Ok(())
    }
}
