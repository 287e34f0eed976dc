//! History replay and audit exports.
//!
//! Exports only ever work on data that was read up front, so the JSON and CSV
//! renderings of one filter always describe the same votes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::models::{
    CategoryRegistry, HistoryAction, Presentation, QuestionAnswer, Rating, VoteRecord, VoteRole,
};
use crate::store::VoteStore;

const NOT_AVAILABLE: &str = "N/A";

/// One step of a vote's history as shown to auditors
///
/// Entries rebuilt from legacy fields have `synthesized` set and may lack
/// values that were never recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub timestamp: Option<DateTime<Utc>>,
    pub action: HistoryAction,
    pub total_score: Option<Decimal>,
    pub previous_score: Option<Decimal>,
    pub ratings: Option<Vec<Rating>>,
    pub synthesized: bool,
}

impl AuditEntry {
    pub fn display_timestamp(&self) -> String {
        display_time(self.timestamp)
    }

    pub fn display_total(&self) -> String {
        display_or_na(self.total_score)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoteAudit {
    pub vote: VoteRecord,
    pub history: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AuditFilter {
    pub presentation_id: Option<Uuid>,
    pub user_id: Option<String>,
    pub role: Option<VoteRole>,
}

impl AuditFilter {
    pub fn matches(&self, vote: &VoteRecord) -> bool {
        self.presentation_id
            .is_none_or(|id| vote.presentation_id == id)
            && self
                .user_id
                .as_deref()
                .is_none_or(|user_id| vote.user_id == user_id)
            && self.role.is_none_or(|role| vote.role == role)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(StorageError::Validation(format!(
                "unsupported export format '{}'",
                other
            ))),
        }
    }
}

/// Ordered history of a vote.
///
/// Stored entries are returned oldest first. Votes written before history was
/// kept get a synthetic trail: one `created` entry, plus an `updated` entry
/// when `updated_at` differs from `created_at`.
pub fn history_for(vote: &VoteRecord) -> Vec<AuditEntry> {
    if !vote.history.is_empty() {
        let mut history = vote.history.clone();
        history.sort_by_key(|h| h.timestamp);

        return history
            .into_iter()
            .map(|h| AuditEntry {
                timestamp: Some(h.timestamp),
                action: h.action,
                total_score: Some(h.total_score),
                previous_score: h.previous_score,
                ratings: Some(h.ratings),
                synthesized: false,
            })
            .collect();
    }

    let current_ratings = (!vote.ratings.is_empty()).then(|| vote.ratings.clone());

    match vote.updated_at.filter(|_| vote.was_updated()) {
        Some(updated_at) => vec![
            AuditEntry {
                timestamp: Some(vote.created_at),
                action: HistoryAction::Created,
                total_score: None,
                previous_score: None,
                ratings: None,
                synthesized: true,
            },
            AuditEntry {
                timestamp: Some(updated_at),
                action: HistoryAction::Updated,
                total_score: Some(vote.total_score),
                previous_score: None,
                ratings: current_ratings,
                synthesized: true,
            },
        ],
        None => vec![AuditEntry {
            timestamp: Some(vote.created_at),
            action: HistoryAction::Created,
            total_score: Some(vote.total_score),
            previous_score: None,
            ratings: current_ratings,
            synthesized: true,
        }],
    }
}

async fn fetch_votes(store: &dyn VoteStore, filter: &AuditFilter) -> Result<Vec<VoteRecord>> {
    let votes = match (&filter.presentation_id, &filter.user_id) {
        (Some(presentation_id), _) => store.list_votes_for_presentation(*presentation_id).await?,
        (None, Some(user_id)) => store.list_votes_for_user(user_id).await?,
        (None, None) => store.list_votes().await?,
    };

    Ok(votes.into_iter().filter(|v| filter.matches(v)).collect())
}

/// Votes matching the filter, each with its replayed history
pub async fn get_vote_audit(store: &dyn VoteStore, filter: &AuditFilter) -> Result<Vec<VoteAudit>> {
    let votes = fetch_votes(store, filter).await?;

    Ok(votes
        .into_iter()
        .map(|vote| VoteAudit {
            history: history_for(&vote),
            vote,
        })
        .collect())
}

/// Reads everything the export needs, then renders it.
pub async fn export_audit(
    store: &dyn VoteStore,
    format: ExportFormat,
    filter: &AuditFilter,
) -> Result<Vec<u8>> {
    let votes = fetch_votes(store, filter).await?;
    let registry = store.load_registry().await?;
    let presentations: HashMap<Uuid, Presentation> = store
        .list_presentations()
        .await?
        .into_iter()
        .map(|p| (p.presentation_id, p))
        .collect();

    tracing::info!(
        format = ?format,
        votes = votes.len(),
        "Exporting vote audit"
    );

    match format {
        ExportFormat::Json => export_json(&votes, &presentations, &registry),
        ExportFormat::Csv => export_csv(&votes, &presentations, &registry),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryBreakdown {
    pub category_id: String,
    pub name: Option<String>,
    pub weight: Option<Decimal>,
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditRecord {
    pub vote_id: Uuid,
    pub user_id: String,
    pub presentation_id: Uuid,
    pub presentation_title: Option<String>,
    pub role: VoteRole,
    pub total_score: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub was_updated: bool,
    pub is_absent: bool,
    pub absent_reason: Option<String>,
    pub fixed_by_script: bool,
    pub original_total_score: Option<Decimal>,
    pub categories: Vec<CategoryBreakdown>,
    pub answers: Vec<QuestionAnswer>,
    pub history: Vec<AuditEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditExport {
    pub generated_at: DateTime<Utc>,
    pub vote_count: usize,
    pub records: Vec<AuditRecord>,
}

fn breakdown(vote: &VoteRecord, registry: &CategoryRegistry) -> Vec<CategoryBreakdown> {
    if !vote.is_judge() {
        return Vec::new();
    }

    let score_of = |category_id: &str| {
        vote.ratings
            .iter()
            .find(|r| r.category_id == category_id)
            .map(|r| r.score)
    };

    let mut categories: Vec<CategoryBreakdown> = registry
        .categories()
        .iter()
        .map(|c| CategoryBreakdown {
            category_id: c.category_id.clone(),
            name: Some(c.name.clone()),
            weight: Some(c.weight),
            score: score_of(&c.category_id),
        })
        .collect();

    categories.extend(
        vote.ratings
            .iter()
            .filter(|r| !registry.has_category(&r.category_id))
            .map(|r| CategoryBreakdown {
                category_id: r.category_id.clone(),
                name: None,
                weight: None,
                score: Some(r.score),
            }),
    );

    categories
}

/// Full-fidelity dump: one record per vote with nested history.
pub fn export_json(
    votes: &[VoteRecord],
    presentations: &HashMap<Uuid, Presentation>,
    registry: &CategoryRegistry,
) -> Result<Vec<u8>> {
    let records = votes
        .iter()
        .map(|vote| AuditRecord {
            vote_id: vote.vote_id,
            user_id: vote.user_id.clone(),
            presentation_id: vote.presentation_id,
            presentation_title: presentations
                .get(&vote.presentation_id)
                .map(|p| p.title.clone()),
            role: vote.role,
            total_score: vote.total_score,
            created_at: vote.created_at,
            updated_at: vote.updated_at,
            was_updated: vote.was_updated(),
            is_absent: vote.is_absent,
            absent_reason: vote.absent_reason.clone(),
            fixed_by_script: vote.fixed_by_script,
            original_total_score: vote.original_total_score,
            categories: breakdown(vote, registry),
            answers: vote.answers.clone(),
            history: history_for(vote),
        })
        .collect::<Vec<_>>();

    let export = AuditExport {
        generated_at: Utc::now(),
        vote_count: records.len(),
        records,
    };

    Ok(serde_json::to_vec_pretty(&export)?)
}

/// Flat table: one row per vote and one column per scoring category.
///
/// Active categories come first in registry order, followed by retired
/// category ids that still appear in the exported votes.
pub fn export_csv(
    votes: &[VoteRecord],
    presentations: &HashMap<Uuid, Presentation>,
    registry: &CategoryRegistry,
) -> Result<Vec<u8>> {
    let retired: BTreeSet<&str> = votes
        .iter()
        .flat_map(|v| v.ratings.iter())
        .map(|r| r.category_id.as_str())
        .filter(|id| !registry.has_category(id))
        .collect();

    let mut columns: Vec<(&str, &str)> = registry
        .categories()
        .iter()
        .map(|c| (c.category_id.as_str(), c.name.as_str()))
        .collect();
    columns.extend(retired.iter().map(|id| (*id, *id)));

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![
        "vote_id",
        "user_id",
        "presentation_id",
        "presentation_title",
        "role",
    ];
    header.extend(columns.iter().map(|(_, name)| *name));
    header.extend([
        "total_score",
        "created_at",
        "updated_at",
        "was_updated",
        "is_absent",
    ]);
    writer.write_record(&header)?;

    for vote in votes {
        let mut row = vec![
            vote.vote_id.to_string(),
            vote.user_id.clone(),
            vote.presentation_id.to_string(),
            presentations
                .get(&vote.presentation_id)
                .map(|p| p.title.clone())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            vote.role.to_string(),
        ];

        row.extend(columns.iter().map(|(category_id, _)| {
            display_or_na(
                vote.ratings
                    .iter()
                    .find(|r| r.category_id == *category_id)
                    .map(|r| r.score),
            )
        }));

        row.extend([
            vote.total_score.normalize().to_string(),
            vote.created_at.to_rfc3339(),
            display_time(vote.updated_at),
            vote.was_updated().to_string(),
            vote.is_absent.to_string(),
        ]);

        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| StorageError::Export(e.into_error().into()))
}

fn display_time(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn display_or_na<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::models::HistoryEntry;
    use crate::store::MemoryStore;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn rating(category_id: &str, score: i32) -> Rating {
        Rating {
            category_id: category_id.to_string(),
            score,
        }
    }

    fn judge_vote(presentation_id: Uuid, ratings: Vec<Rating>) -> VoteRecord {
        let total = crate::services::normalizer::raw_sum(&ratings);
        VoteRecord {
            vote_id: Uuid::new_v4(),
            user_id: "judge-1".to_string(),
            presentation_id,
            role: VoteRole::Judge,
            ratings,
            answers: vec![],
            total_score: total,
            created_at: at(0),
            updated_at: None,
            history: vec![],
            is_absent: false,
            absent_reason: None,
            fixed_by_script: false,
            original_total_score: None,
        }
    }

    #[test]
    fn test_stored_history_is_sorted() {
        let mut vote = judge_vote(Uuid::new_v4(), vec![rating("content", 4)]);
        vote.history = vec![
            HistoryEntry {
                timestamp: at(10),
                action: HistoryAction::Updated,
                total_score: Decimal::from(4),
                previous_score: Some(Decimal::from(3)),
                ratings: vec![rating("content", 4)],
            },
            HistoryEntry {
                timestamp: at(0),
                action: HistoryAction::Created,
                total_score: Decimal::from(3),
                previous_score: None,
                ratings: vec![rating("content", 3)],
            },
        ];

        let history = history_for(&vote);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action, HistoryAction::Created);
        assert_eq!(history[1].timestamp, Some(at(10)));
        assert!(history.iter().all(|h| !h.synthesized));
    }

    #[test]
    fn test_legacy_vote_without_update_gets_one_entry() {
        let vote = judge_vote(Uuid::new_v4(), vec![rating("content", 4)]);

        let history = history_for(&vote);
        assert_eq!(history.len(), 1);
        assert!(history[0].synthesized);
        assert_eq!(history[0].total_score, Some(Decimal::from(4)));
    }

    #[test]
    fn test_legacy_updated_vote_gets_two_entries_with_gaps() {
        let mut vote = judge_vote(Uuid::new_v4(), vec![]);
        vote.total_score = Decimal::from(18);
        vote.updated_at = Some(at(30));

        let history = history_for(&vote);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].display_total(), "N/A");
        assert_eq!(history[1].action, HistoryAction::Updated);
        assert_eq!(history[1].display_total(), "18");
        assert!(history[1].ratings.is_none());
    }

    #[test]
    fn test_updated_at_equal_to_created_at_is_not_an_update() {
        let mut vote = judge_vote(Uuid::new_v4(), vec![rating("content", 2)]);
        vote.updated_at = Some(vote.created_at);

        assert_eq!(history_for(&vote).len(), 1);
    }

    #[test]
    fn test_csv_has_one_column_per_category() {
        let registry = CategoryRegistry::default();
        let presentation = Presentation::new("Async without tears");
        let mut vote = judge_vote(
            presentation.presentation_id,
            vec![rating("content", 4), rating("delivery", 5), rating("stage_presence", 2)],
        );
        vote.updated_at = Some(at(5));
        let orphan = judge_vote(Uuid::new_v4(), vec![rating("visuals", 3)]);
        let presentations =
            HashMap::from([(presentation.presentation_id, presentation.clone())]);

        let bytes = export_csv(&[vote, orphan], &presentations, &registry).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(
            lines[0],
            "vote_id,user_id,presentation_id,presentation_title,role,Content,Delivery,Originality,Relevance,Visuals,stage_presence,total_score,created_at,updated_at,was_updated,is_absent"
        );
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("Async without tears,judge,4,5,N/A,N/A,N/A,2,11,"));
        assert!(lines[1].ends_with(",true,false"));
        assert!(lines[2].contains(",N/A,judge,N/A,N/A,N/A,N/A,3,N/A,3,"));
        assert!(lines[2].ends_with(",N/A,false,false"));
    }

    #[test]
    fn test_json_export_nests_history_and_breakdown() {
        let registry = CategoryRegistry::default();
        let vote = judge_vote(Uuid::new_v4(), vec![rating("content", 4)]);

        let bytes = export_json(&[vote], &HashMap::new(), &registry).unwrap();
        let export: AuditExport = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(export.vote_count, 1);
        let record = &export.records[0];
        assert_eq!(record.categories.len(), 5);
        assert_eq!(record.categories[0].score, Some(4));
        assert_eq!(record.categories[1].score, None);
        assert_eq!(record.history.len(), 1);
        assert!(record.presentation_title.is_none());
    }

    #[tokio::test]
    async fn test_audit_filter_by_user_and_role() {
        let store = MemoryStore::new();
        let presentation = Presentation::new("Lifetimes demystified");
        store.upsert_presentation(&presentation).await.unwrap();

        let judge = judge_vote(presentation.presentation_id, vec![rating("content", 4)]);
        let mut spectator = judge_vote(presentation.presentation_id, vec![]);
        spectator.user_id = "fan-1".to_string();
        spectator.role = VoteRole::Spectator;
        spectator.total_score = Decimal::ONE;
        store.seed_vote(judge.clone()).await;
        store.seed_vote(spectator).await;

        let by_user = get_vote_audit(
            &store,
            &AuditFilter {
                user_id: Some("judge-1".to_string()),
                ..AuditFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_user.len(), 1);
        assert_eq!(by_user[0].vote.vote_id, judge.vote_id);

        let spectators = get_vote_audit(
            &store,
            &AuditFilter {
                presentation_id: Some(presentation.presentation_id),
                role: Some(VoteRole::Spectator),
                ..AuditFilter::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(spectators.len(), 1);
        assert_eq!(spectators[0].vote.user_id, "fan-1");

        let csv = export_audit(&store, ExportFormat::Csv, &AuditFilter::default())
            .await
            .unwrap();
        assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
