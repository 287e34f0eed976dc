use std::collections::HashSet;
use storage::models::{CategoryRegistry, VoteRole};
use storage::services::normalizer::in_scale;
use tracing::warn;

use super::models::{LegacyExport, SUPPORTED_FORMAT_VERSION};
use crate::{RepairCliError, Result};

pub struct LegacyValidator;

impl LegacyValidator {
    /// Errors block the import. Warnings describe records that will load but
    /// need the repair pass or contribute nothing.
    pub fn validate(export: &LegacyExport, registry: &CategoryRegistry) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        if export.format_version != SUPPORTED_FORMAT_VERSION {
            report.errors.push(format!(
                "Unsupported format version: {}. Expected {}",
                export.format_version, SUPPORTED_FORMAT_VERSION
            ));
        }

        if export.votes.is_empty() {
            report
                .warnings
                .push("Export contains no votes".to_string());
        }

        let mut pairs = HashSet::new();
        let mut vote_ids = HashSet::new();

        for (idx, doc) in export.votes.iter().enumerate() {
            let label = format!("{}. {}", idx + 1, doc.label());

            if doc.user_id.trim().is_empty() {
                report
                    .errors
                    .push(format!("Vote {} has empty user_id", idx + 1));
            }

            let role = match doc.role.parse::<VoteRole>() {
                Ok(role) => Some(role),
                Err(_) => {
                    report
                        .errors
                        .push(format!("Vote '{}' has unknown role '{}'", label, doc.role));
                    None
                }
            };

            if !pairs.insert((doc.user_id.trim(), doc.presentation_id)) {
                report.errors.push(format!(
                    "Vote '{}' duplicates an earlier vote for the same user and presentation",
                    label
                ));
            }

            if let Some(vote_id) = doc.vote_id {
                if !vote_ids.insert(vote_id) {
                    report
                        .errors
                        .push(format!("Vote '{}' reuses vote_id {}", label, vote_id));
                }
            }

            if let (Some(created), Some(updated)) = (doc.created_at, doc.updated_at) {
                if updated < created {
                    report.warnings.push(format!(
                        "Vote '{}' has updated_at before created_at, it will be clamped",
                        label
                    ));
                }
            }

            if doc.created_at.is_none() {
                report.warnings.push(format!(
                    "Vote '{}' is missing created_at, the import time will be used",
                    label
                ));
            }

            match role {
                Some(VoteRole::Judge) => {
                    let ratings = doc.merged_ratings();
                    if ratings.is_empty() {
                        report
                            .warnings
                            .push(format!("Judge vote '{}' has no ratings", label));
                    }

                    for rating in &ratings {
                        if !in_scale(rating.score) {
                            report.warnings.push(format!(
                                "Judge vote '{}' has out-of-scale score {} for '{}', repair will skip it",
                                label, rating.score, rating.category_id
                            ));
                        }
                        if !registry.has_category(&rating.category_id) {
                            report.warnings.push(format!(
                                "Judge vote '{}' rates retired category '{}'",
                                label, rating.category_id
                            ));
                        }
                    }

                    if doc.total_score.is_none() {
                        report.warnings.push(format!(
                            "Judge vote '{}' has no total_score, it will be derived from ratings",
                            label
                        ));
                    }
                }
                Some(VoteRole::Spectator) => {
                    if !doc.ratings.is_empty() || !doc.scores.is_empty() {
                        report.warnings.push(format!(
                            "Spectator vote '{}' carries ratings, they will be dropped",
                            label
                        ));
                    }
                    for answer in &doc.answers {
                        if !registry.has_question(&answer.question_id) {
                            report.warnings.push(format!(
                                "Spectator vote '{}' answers unknown question '{}'",
                                label, answer.question_id
                            ));
                        }
                    }
                }
                None => {}
            }
        }

        if !report.errors.is_empty() {
            Err(RepairCliError::ValidationError(format!(
                "Validation failed with {} error(s): {}",
                report.errors.len(),
                report.errors.join("; ")
            )))
        } else {
            Ok(report)
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legacy::models::LegacyVoteDocument;
    use rust_decimal::Decimal;
    use storage::models::Rating;
    use uuid::Uuid;

    fn judge(user_id: &str, presentation_id: Uuid, scores: &[(&str, i32)]) -> LegacyVoteDocument {
        LegacyVoteDocument {
            vote_id: None,
            user_id: user_id.to_string(),
            presentation_id,
            presentation_title: None,
            role: "judge".to_string(),
            ratings: scores
                .iter()
                .map(|(id, score)| Rating {
                    category_id: id.to_string(),
                    score: *score,
                })
                .collect(),
            scores: Default::default(),
            answers: vec![],
            total_score: Some(Decimal::from(10)),
            created_at: Some(chrono::Utc::now()),
            updated_at: None,
            is_absent: false,
            absent_reason: None,
        }
    }

    fn export(votes: Vec<LegacyVoteDocument>) -> LegacyExport {
        LegacyExport {
            format_version: SUPPORTED_FORMAT_VERSION.to_string(),
            exported_at: None,
            source: None,
            votes,
        }
    }

    #[test]
    fn test_clean_export_passes() {
        let registry = CategoryRegistry::default();
        let report = LegacyValidator::validate(
            &export(vec![judge("judge-1", Uuid::new_v4(), &[("content", 5), ("delivery", 5)])]),
            &registry,
        )
        .unwrap();

        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_duplicate_pair_is_an_error() {
        let registry = CategoryRegistry::default();
        let presentation_id = Uuid::new_v4();
        let result = LegacyValidator::validate(
            &export(vec![
                judge("judge-1", presentation_id, &[("content", 5)]),
                judge("judge-1", presentation_id, &[("content", 4)]),
            ]),
            &registry,
        );

        assert!(matches!(result, Err(RepairCliError::ValidationError(msg)) if msg.contains("duplicates")));
    }

    #[test]
    fn test_wrong_version_and_role_are_errors() {
        let registry = CategoryRegistry::default();
        let mut doc = judge("judge-1", Uuid::new_v4(), &[]);
        doc.role = "keynote".to_string();
        let mut bad = export(vec![doc]);
        bad.format_version = "0.9".to_string();

        let err = LegacyValidator::validate(&bad, &registry).unwrap_err();
        assert!(err.to_string().contains("2 error(s)"));
    }

    #[test]
    fn test_out_of_scale_and_retired_ratings_are_warnings() {
        let registry = CategoryRegistry::default();
        let report = LegacyValidator::validate(
            &export(vec![judge(
                "judge-1",
                Uuid::new_v4(),
                &[("content", 9), ("stage_presence", 3)],
            )]),
            &registry,
        )
        .unwrap();

        assert_eq!(report.warnings.len(), 2);
        assert!(report.warnings[0].contains("out-of-scale"));
        assert!(report.warnings[1].contains("retired category"));
    }
}
