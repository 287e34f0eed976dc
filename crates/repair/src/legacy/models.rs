use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storage::models::{QuestionAnswer, Rating, VoteRecord, VoteRole};
use storage::services::normalizer::raw_sum;
use uuid::Uuid;

use crate::{RepairCliError, Result};

pub const SUPPORTED_FORMAT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyExport {
    pub format_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub votes: Vec<LegacyVoteDocument>,
}

/// One vote as the old backend stored it. Most fields were added over time,
/// so anything but the identity may be missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyVoteDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_id: Option<Uuid>,
    pub user_id: String,
    pub presentation_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_title: Option<String>,
    pub role: String,
    #[serde(default)]
    pub ratings: Vec<Rating>,
    /// Older documents keyed scores by category id instead
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<String, i32>,
    #[serde(default)]
    pub answers: Vec<QuestionAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_absent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absent_reason: Option<String>,
}

impl LegacyVoteDocument {
    pub fn label(&self) -> String {
        format!("{} on {}", self.user_id, self.presentation_id)
    }

    /// Ratings from either representation, list entries first.
    pub fn merged_ratings(&self) -> Vec<Rating> {
        let mut ratings = self.ratings.clone();
        for (category_id, score) in &self.scores {
            if !ratings.iter().any(|r| &r.category_id == category_id) {
                ratings.push(Rating {
                    category_id: category_id.clone(),
                    score: *score,
                });
            }
        }
        ratings
    }

    /// Builds a stored record, backfilling what the document lacks.
    ///
    /// A stored total is kept verbatim so the repair pass can still see
    /// drift. A missing total is derived the way a fresh submission would be.
    /// History stays empty and is synthesized by the audit view.
    pub fn into_record(self, imported_at: DateTime<Utc>) -> Result<VoteRecord> {
        let role: VoteRole = self.role.parse().map_err(|_| {
            RepairCliError::ConversionError(format!(
                "Vote {} has unknown role '{}'",
                self.label(),
                self.role
            ))
        })?;

        let ratings = match role {
            VoteRole::Judge => self.merged_ratings(),
            VoteRole::Spectator => Vec::new(),
        };
        let total_score = self.total_score.unwrap_or_else(|| match role {
            VoteRole::Judge => raw_sum(&ratings),
            VoteRole::Spectator => Decimal::ONE,
        });
        let created_at = self.created_at.or(self.updated_at).unwrap_or(imported_at);
        let updated_at = self.updated_at.map(|t| t.max(created_at));

        Ok(VoteRecord {
            vote_id: self.vote_id.unwrap_or_else(Uuid::new_v4),
            user_id: self.user_id.trim().to_string(),
            presentation_id: self.presentation_id,
            role,
            ratings,
            answers: self.answers,
            total_score,
            created_at,
            updated_at,
            history: Vec::new(),
            is_absent: self.is_absent,
            absent_reason: self.absent_reason.filter(|_| self.is_absent),
            fixed_by_script: false,
            original_total_score: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn document(json: &str) -> LegacyVoteDocument {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_minimal_judge_document_is_backfilled() {
        let doc = document(
            r#"{
                "user_id": "judge-1",
                "presentation_id": "6f0c2a5e-2b1d-4c44-9a53-8c7d0e3f1a10",
                "role": "judge",
                "scores": {"content": 4, "delivery": 5, "originality": 3}
            }"#,
        );
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        let record = doc.into_record(now).unwrap();
        assert_eq!(record.total_score, Decimal::from(12));
        assert_eq!(record.ratings.len(), 3);
        assert_eq!(record.created_at, now);
        assert!(record.updated_at.is_none());
        assert!(record.history.is_empty());
    }

    #[test]
    fn test_stored_total_is_kept() {
        let doc = document(
            r#"{
                "vote_id": "0d5c8f5e-7a55-4b47-9a0b-1f3b6f2d9e11",
                "user_id": "judge-2",
                "presentation_id": "6f0c2a5e-2b1d-4c44-9a53-8c7d0e3f1a10",
                "role": "judge",
                "ratings": [{"category_id": "content", "score": 4}],
                "total_score": "16",
                "created_at": "2024-05-01T09:00:00Z",
                "updated_at": "2024-05-01T10:00:00Z"
            }"#,
        );

        let record = doc.into_record(Utc::now()).unwrap();
        assert_eq!(record.total_score, Decimal::from(16));
        assert!(record.was_updated());
        assert_eq!(
            record.vote_id.to_string(),
            "0d5c8f5e-7a55-4b47-9a0b-1f3b6f2d9e11"
        );
    }

    #[test]
    fn test_attendee_counts_as_one_like() {
        let doc = document(
            r#"{
                "user_id": "fan-1",
                "presentation_id": "6f0c2a5e-2b1d-4c44-9a53-8c7d0e3f1a10",
                "role": "attendee",
                "answers": [{"question_id": "clarity", "score": 4}]
            }"#,
        );

        let record = doc.into_record(Utc::now()).unwrap();
        assert_eq!(record.role, VoteRole::Spectator);
        assert_eq!(record.total_score, Decimal::ONE);
        assert_eq!(record.answers.len(), 1);
    }

    #[test]
    fn test_unknown_role_fails_conversion() {
        let doc = document(
            r#"{
                "user_id": "x",
                "presentation_id": "6f0c2a5e-2b1d-4c44-9a53-8c7d0e3f1a10",
                "role": "organizer"
            }"#,
        );
        assert!(matches!(
            doc.into_record(Utc::now()),
            Err(RepairCliError::ConversionError(_))
        ));
    }

    #[test]
    fn test_list_ratings_win_over_keyed_scores() {
        let doc = document(
            r#"{
                "user_id": "judge-3",
                "presentation_id": "6f0c2a5e-2b1d-4c44-9a53-8c7d0e3f1a10",
                "role": "judge",
                "ratings": [{"category_id": "content", "score": 2}],
                "scores": {"content": 5, "visuals": 1}
            }"#,
        );

        let ratings = doc.merged_ratings();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings[0].score, 2);
        assert_eq!(ratings[1].category_id, "visuals");
    }
}
