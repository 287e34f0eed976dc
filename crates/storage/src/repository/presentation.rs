use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::models::{Presentation, PresentationRollup};

const PRESENTATION_COLUMNS: &str = r#"
    presentation_id, title, speaker, room, judge_scores, judge_total, judge_count,
    spectator_likes, rollup_fixed_by_script, rollup_recomputed_at
"#;

#[derive(FromRow)]
struct PresentationRow {
    presentation_id: Uuid,
    title: String,
    speaker: Option<String>,
    room: Option<String>,
    judge_scores: Json<Vec<Decimal>>,
    judge_total: Decimal,
    judge_count: i32,
    spectator_likes: i64,
    rollup_fixed_by_script: bool,
    rollup_recomputed_at: Option<DateTime<Utc>>,
}

impl From<PresentationRow> for Presentation {
    fn from(row: PresentationRow) -> Self {
        Presentation {
            presentation_id: row.presentation_id,
            title: row.title,
            speaker: row.speaker,
            room: row.room,
            rollup: PresentationRollup {
                judge_scores: row.judge_scores.0,
                judge_total: row.judge_total,
                judge_count: u32::try_from(row.judge_count).unwrap_or(0),
                spectator_likes: u64::try_from(row.spectator_likes).unwrap_or(0),
                fixed_by_script: row.rollup_fixed_by_script,
                recomputed_at: row.rollup_recomputed_at,
            },
        }
    }
}

/// Repository for presentations and their cached rollups
pub struct PresentationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PresentationRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, presentation_id: Uuid) -> Result<Option<Presentation>> {
        let row = sqlx::query_as::<_, PresentationRow>(&format!(
            "SELECT {PRESENTATION_COLUMNS} FROM presentations WHERE presentation_id = $1"
        ))
        .bind(presentation_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Presentation::from))
    }

    pub async fn list(&self) -> Result<Vec<Presentation>> {
        let rows = sqlx::query_as::<_, PresentationRow>(&format!(
            "SELECT {PRESENTATION_COLUMNS} FROM presentations ORDER BY title"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Presentation::from).collect())
    }

    /// Inserts or updates the descriptive fields. The rollup columns are left
    /// to the aggregator.
    pub async fn upsert(&self, presentation: &Presentation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO presentations (presentation_id, title, speaker, room)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (presentation_id)
            DO UPDATE SET
                title = EXCLUDED.title,
                speaker = EXCLUDED.speaker,
                room = EXCLUDED.room
            "#,
        )
        .bind(presentation.presentation_id)
        .bind(&presentation.title)
        .bind(&presentation.speaker)
        .bind(&presentation.room)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn write_rollup(&self, presentation_id: Uuid, rollup: &PresentationRollup) -> Result<()> {
        write_rollup(self.pool, presentation_id, rollup).await
    }
}

pub(crate) async fn write_rollup<'e>(
    executor: impl PgExecutor<'e>,
    presentation_id: Uuid,
    rollup: &PresentationRollup,
) -> Result<()> {
    let judge_count = i32::try_from(rollup.judge_count)
        .map_err(|_| StorageError::Validation("judge count out of range".to_string()))?;
    let spectator_likes = i64::try_from(rollup.spectator_likes)
        .map_err(|_| StorageError::Validation("like count out of range".to_string()))?;

    let result = sqlx::query(
        r#"
        UPDATE presentations
        SET judge_scores = $2,
            judge_total = $3,
            judge_count = $4,
            spectator_likes = $5,
            rollup_fixed_by_script = $6,
            rollup_recomputed_at = $7
        WHERE presentation_id = $1
        "#,
    )
    .bind(presentation_id)
    .bind(Json(&rollup.judge_scores))
    .bind(rollup.judge_total)
    .bind(judge_count)
    .bind(spectator_likes)
    .bind(rollup.fixed_by_script)
    .bind(rollup.recomputed_at)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }

    Ok(())
}
