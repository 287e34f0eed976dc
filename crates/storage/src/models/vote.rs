use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::StorageError;

/// Judge rating for one scoring category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Rating {
    pub category_id: String,
    pub score: i32,
}

/// Attendee answer to one of the registry questions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuestionAnswer {
    pub question_id: String,
    pub score: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VoteRole {
    Judge,
    #[serde(alias = "attendee")]
    Spectator,
}

impl VoteRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Judge => "judge",
            Self::Spectator => "spectator",
        }
    }
}

impl fmt::Display for VoteRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteRole {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "judge" => Ok(Self::Judge),
            "spectator" | "attendee" => Ok(Self::Spectator),
            other => Err(StorageError::Validation(format!("unknown role '{}'", other))),
        }
    }
}

/// What a voter hands in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Ballot {
    Ratings { ratings: Vec<Rating> },
    Like {
        #[serde(default)]
        answers: Vec<QuestionAnswer>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Created,
    Updated,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Updated => f.write_str("updated"),
        }
    }
}

/// One immutable step in a vote's life
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    pub total_score: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_score: Option<Decimal>,
    #[serde(default)]
    pub ratings: Vec<Rating>,
}

/// A single user's evaluation of a single presentation
///
/// `(user_id, presentation_id)` is unique. Resubmissions rewrite the record in
/// place and push onto `history`; entries already in `history` are never
/// touched again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VoteRecord {
    pub vote_id: Uuid,
    pub user_id: String,
    pub presentation_id: Uuid,
    pub role: VoteRole,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
    pub total_score: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub is_absent: bool,
    #[serde(default)]
    pub absent_reason: Option<String>,
    #[serde(default)]
    pub fixed_by_script: bool,
    #[serde(default)]
    pub original_total_score: Option<Decimal>,
}

impl VoteRecord {
    pub fn is_judge(&self) -> bool {
        self.role == VoteRole::Judge
    }

    /// Number of history entries. Grows by one on every resubmission and
    /// never shrinks, so it identifies the version of the record.
    pub fn revision(&self) -> usize {
        self.history.len()
    }

    pub fn was_updated(&self) -> bool {
        self.updated_at
            .is_some_and(|updated_at| updated_at != self.created_at)
    }

    /// Timestamp of the newest history entry, falling back to the record's own
    /// timestamps for votes written before history was kept.
    pub fn last_touched(&self) -> DateTime<Utc> {
        self.history
            .iter()
            .map(|h| h.timestamp)
            .chain(self.updated_at)
            .fold(self.created_at, |acc, t| acc.max(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_role_parsing() {
        assert_eq!("judge".parse::<VoteRole>().unwrap(), VoteRole::Judge);
        assert_eq!(" Attendee ".parse::<VoteRole>().unwrap(), VoteRole::Spectator);
        assert!("speaker".parse::<VoteRole>().is_err());
    }

    #[test]
    fn test_role_deserializes_like_header_values() {
        let role: VoteRole = serde_json::from_str("\"attendee\"").unwrap();
        assert_eq!(role, VoteRole::Spectator);
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"spectator\"");
    }

    #[test]
    fn test_ballot_json_shape() {
        let ballot: Ballot = serde_json::from_str(
            r#"{"kind":"ratings","ratings":[{"category_id":"content","score":4}]}"#,
        )
        .unwrap();
        assert_eq!(
            ballot,
            Ballot::Ratings {
                ratings: vec![Rating {
                    category_id: "content".to_string(),
                    score: 4
                }]
            }
        );

        let like: Ballot = serde_json::from_str(r#"{"kind":"like"}"#).unwrap();
        assert_eq!(like, Ballot::Like { answers: vec![] });
    }

    #[test]
    fn test_legacy_document_deserializes_with_defaults() {
        let vote: VoteRecord = serde_json::from_str(
            r#"{
                "vote_id": "6f1c1d44-3e0e-4a55-9b3f-0d2b8a4f2c11",
                "user_id": "judge-1",
                "presentation_id": "0b9e3c1a-7d2f-4e4b-8a55-1f0c2d3e4f50",
                "role": "judge",
                "total_score": "12",
                "created_at": "2024-05-01T10:00:00Z"
            }"#,
        )
        .unwrap();

        assert!(vote.history.is_empty());
        assert!(vote.ratings.is_empty());
        assert!(!vote.was_updated());
        assert_eq!(
            vote.last_touched(),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
    }
}
