use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::error::StorageError;
use crate::models::{Ballot, HistoryAction, QuestionAnswer, Rating, VoteRole};
use crate::services::audit::{AuditFilter, ExportFormat};
use crate::services::repair::RepairOptions;
use crate::services::voting::SubmitOutcome;
use crate::store::DEFAULT_MAX_BATCH_WRITES;

/// Request payload for casting or replacing a vote
///
/// Judges send `ratings`, spectators send `like: true` with optional answers.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitVoteRequest {
    #[validate(length(max = 50, message = "Too many ratings"))]
    pub ratings: Option<Vec<Rating>>,

    #[serde(default)]
    pub like: bool,

    #[serde(default)]
    #[validate(length(max = 20, message = "Too many answers"))]
    pub answers: Vec<QuestionAnswer>,
}

impl SubmitVoteRequest {
    pub fn into_ballot(self) -> Result<Ballot, StorageError> {
        match (self.ratings, self.like) {
            (Some(_), true) => Err(StorageError::Validation(
                "a ballot carries either ratings or a like, not both".to_string(),
            )),
            (Some(ratings), false) => Ok(Ballot::Ratings { ratings }),
            (None, true) => Ok(Ballot::Like {
                answers: self.answers,
            }),
            (None, false) => Err(StorageError::Validation(
                "a ballot must carry ratings or a like".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitVoteResponse {
    pub vote_id: Uuid,
    pub total_score: Decimal,
    pub action: HistoryAction,
    pub judge_total: Decimal,
    pub spectator_likes: u64,
}

impl From<SubmitOutcome> for SubmitVoteResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            vote_id: outcome.vote_id,
            total_score: outcome.total_score,
            action: outcome.action,
            judge_total: outcome.rollup.judge_total,
            spectator_likes: outcome.rollup.spectator_likes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct MarkAbsentRequest {
    pub is_absent: bool,

    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: ExportFormat,
    pub presentation_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub role: Option<VoteRole>,
}

impl ExportQuery {
    pub fn filter(&self) -> AuditFilter {
        AuditFilter {
            presentation_id: self.presentation_id,
            user_id: self.user_id.clone(),
            role: self.role,
        }
    }
}

/// Overrides for a repair run triggered over the API
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct RepairRequest {
    #[validate(range(min = 1, max = 400))]
    pub batch_size: Option<usize>,

    pub tolerance: Option<Decimal>,

    #[serde(default)]
    pub dry_run: bool,
}

impl RepairRequest {
    pub fn options(&self, defaults: &RepairOptions) -> RepairOptions {
        RepairOptions {
            batch_size: self
                .batch_size
                .unwrap_or(defaults.batch_size)
                .min(DEFAULT_MAX_BATCH_WRITES),
            tolerance: self.tolerance.unwrap_or(defaults.tolerance).abs(),
            dry_run: self.dry_run || defaults.dry_run,
        }
    }
}
