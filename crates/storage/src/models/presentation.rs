use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Presentation {
    pub presentation_id: Uuid,
    pub title: String,
    pub speaker: Option<String>,
    pub room: Option<String>,
    #[serde(default)]
    pub rollup: PresentationRollup,
}

impl Presentation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            presentation_id: Uuid::new_v4(),
            title: title.into(),
            speaker: None,
            room: None,
            rollup: PresentationRollup::default(),
        }
    }
}

/// Cached aggregate of a presentation's votes
///
/// Always a pure function of the current vote set. Only the aggregator and
/// the rollup repair pass write it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct PresentationRollup {
    pub judge_scores: Vec<Decimal>,
    pub judge_total: Decimal,
    pub judge_count: u32,
    pub spectator_likes: u64,
    #[serde(default)]
    pub fixed_by_script: bool,
    #[serde(default)]
    pub recomputed_at: Option<DateTime<Utc>>,
}

impl PresentationRollup {
    /// Compares the derived figures, ignoring bookkeeping fields.
    pub fn same_figures(&self, other: &PresentationRollup) -> bool {
        self.judge_scores == other.judge_scores
            && self.judge_total == other.judge_total
            && self.judge_count == other.judge_count
            && self.spectator_likes == other.spectator_likes
    }
}
