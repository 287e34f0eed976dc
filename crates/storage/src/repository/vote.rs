use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgExecutor;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::models::{HistoryEntry, QuestionAnswer, Rating, VoteRecord};

const VOTE_COLUMNS: &str = r#"
    vote_id, user_id, presentation_id, role, ratings, answers, total_score,
    created_at, updated_at, history, is_absent, absent_reason,
    fixed_by_script, original_total_score
"#;

#[derive(FromRow)]
struct VoteRow {
    vote_id: Uuid,
    user_id: String,
    presentation_id: Uuid,
    role: String,
    ratings: Json<Vec<Rating>>,
    answers: Json<Vec<QuestionAnswer>>,
    total_score: Decimal,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    history: Json<Vec<HistoryEntry>>,
    is_absent: bool,
    absent_reason: Option<String>,
    fixed_by_script: bool,
    original_total_score: Option<Decimal>,
}

impl TryFrom<VoteRow> for VoteRecord {
    type Error = StorageError;

    fn try_from(row: VoteRow) -> Result<Self> {
        let role = row
            .role
            .parse()
            .map_err(|_| StorageError::InvalidRecord {
                id: row.vote_id.to_string(),
                reason: format!("unknown role '{}'", row.role),
            })?;

        Ok(VoteRecord {
            vote_id: row.vote_id,
            user_id: row.user_id,
            presentation_id: row.presentation_id,
            role,
            ratings: row.ratings.0,
            answers: row.answers.0,
            total_score: row.total_score,
            created_at: row.created_at,
            updated_at: row.updated_at,
            history: row.history.0,
            is_absent: row.is_absent,
            absent_reason: row.absent_reason,
            fixed_by_script: row.fixed_by_script,
            original_total_score: row.original_total_score,
        })
    }
}

fn into_records(rows: Vec<VoteRow>) -> Result<Vec<VoteRecord>> {
    rows.into_iter().map(VoteRecord::try_from).collect()
}

/// Repository for vote documents
pub struct VoteRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> VoteRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, user_id: &str, presentation_id: Uuid) -> Result<Option<VoteRecord>> {
        let row = sqlx::query_as::<_, VoteRow>(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE user_id = $1 AND presentation_id = $2"
        ))
        .bind(user_id)
        .bind(presentation_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(VoteRecord::try_from).transpose()
    }

    pub async fn find_by_id(&self, vote_id: Uuid) -> Result<Option<VoteRecord>> {
        let row = sqlx::query_as::<_, VoteRow>(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE vote_id = $1"
        ))
        .bind(vote_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(VoteRecord::try_from).transpose()
    }

    pub async fn list_for_presentation(&self, presentation_id: Uuid) -> Result<Vec<VoteRecord>> {
        let rows = sqlx::query_as::<_, VoteRow>(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE presentation_id = $1 ORDER BY created_at, vote_id"
        ))
        .bind(presentation_id)
        .fetch_all(self.pool)
        .await?;

        into_records(rows)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<VoteRecord>> {
        let rows = sqlx::query_as::<_, VoteRow>(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes WHERE user_id = $1 ORDER BY created_at, vote_id"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        into_records(rows)
    }

    pub async fn list_all(&self) -> Result<Vec<VoteRecord>> {
        let rows = sqlx::query_as::<_, VoteRow>(&format!(
            "SELECT {VOTE_COLUMNS} FROM votes ORDER BY created_at, vote_id"
        ))
        .fetch_all(self.pool)
        .await?;

        into_records(rows)
    }

    pub async fn insert(&self, vote: &VoteRecord) -> Result<()> {
        insert_vote(self.pool, vote).await
    }

    pub async fn set_absent(
        &self,
        vote_id: Uuid,
        is_absent: bool,
        reason: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE votes
            SET is_absent = $2, absent_reason = $3
            WHERE vote_id = $1
            "#,
        )
        .bind(vote_id)
        .bind(is_absent)
        .bind(reason)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        Ok(())
    }
}

pub(crate) async fn insert_vote<'e>(executor: impl PgExecutor<'e>, vote: &VoteRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO votes (
            vote_id, user_id, presentation_id, role, ratings, answers, total_score,
            created_at, updated_at, history, is_absent, absent_reason,
            fixed_by_script, original_total_score
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(vote.vote_id)
    .bind(&vote.user_id)
    .bind(vote.presentation_id)
    .bind(vote.role.as_str())
    .bind(Json(&vote.ratings))
    .bind(Json(&vote.answers))
    .bind(vote.total_score)
    .bind(vote.created_at)
    .bind(vote.updated_at)
    .bind(Json(&vote.history))
    .bind(vote.is_absent)
    .bind(&vote.absent_reason)
    .bind(vote.fixed_by_script)
    .bind(vote.original_total_score)
    .execute(executor)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.code().as_deref() == Some("23505") {
                return StorageError::ConstraintViolation(
                    "User already voted on this presentation".to_string(),
                );
            }
            if db_err.code().as_deref() == Some("23503") {
                return StorageError::NotFound;
            }
        }
        StorageError::from(e)
    })?;

    Ok(())
}

/// Rewrites every mutable column of a vote in a single statement, as long as
/// its history still has `expected_revision` entries.
pub(crate) async fn replace_vote<'e>(
    executor: impl PgExecutor<'e>,
    vote: &VoteRecord,
    expected_revision: usize,
) -> Result<()> {
    let revision = revision_param(expected_revision)?;

    let result = sqlx::query(
        r#"
        UPDATE votes
        SET role = $2,
            ratings = $3,
            answers = $4,
            total_score = $5,
            updated_at = $6,
            history = $7,
            is_absent = $8,
            absent_reason = $9,
            fixed_by_script = $10,
            original_total_score = $11
        WHERE vote_id = $1 AND jsonb_array_length(history) = $12
        "#,
    )
    .bind(vote.vote_id)
    .bind(vote.role.as_str())
    .bind(Json(&vote.ratings))
    .bind(Json(&vote.answers))
    .bind(vote.total_score)
    .bind(vote.updated_at)
    .bind(Json(&vote.history))
    .bind(vote.is_absent)
    .bind(&vote.absent_reason)
    .bind(vote.fixed_by_script)
    .bind(vote.original_total_score)
    .bind(revision)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::ConstraintViolation(format!(
            "vote {} changed while it was being updated",
            vote.vote_id
        )));
    }

    Ok(())
}

/// Touches only the repair columns. Returns false when the vote is gone or
/// no longer holds `expected_total` at `expected_revision`.
pub(crate) async fn correct_total<'e>(
    executor: impl PgExecutor<'e>,
    vote_id: Uuid,
    expected_total: Decimal,
    expected_revision: usize,
    total_score: Decimal,
    original_total_score: Decimal,
) -> Result<bool> {
    let revision = revision_param(expected_revision)?;

    let result = sqlx::query(
        r#"
        UPDATE votes
        SET total_score = $4,
            fixed_by_script = TRUE,
            original_total_score = COALESCE(original_total_score, $5)
        WHERE vote_id = $1
          AND total_score = $2
          AND jsonb_array_length(history) = $3
        "#,
    )
    .bind(vote_id)
    .bind(expected_total)
    .bind(revision)
    .bind(total_score)
    .bind(original_total_score)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_vote<'e>(executor: impl PgExecutor<'e>, vote_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM votes WHERE vote_id = $1")
        .bind(vote_id)
        .execute(executor)
        .await?;

    if result.rows_affected() == 0 {
        return Err(StorageError::NotFound);
    }

    Ok(())
}

fn revision_param(revision: usize) -> Result<i32> {
    i32::try_from(revision)
        .map_err(|_| StorageError::Validation("history too long".to_string()))
}
