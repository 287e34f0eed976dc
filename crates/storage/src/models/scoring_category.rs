use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::Rating;

/// Points a single judge can award across all categories.
pub const MAX_POINTS: i32 = 25;

/// Highest score a rating can carry in one category.
pub const MAX_SCALE: i32 = 5;

/// Weighted judging criterion
///
/// Weights are expected to add up to 1.0 over the active set. Nothing enforces
/// it; the registry only warns when they drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ScoringCategory {
    pub category_id: String,
    pub name: String,
    pub description: Option<String>,
    pub weight: Decimal,
    pub position: i32,
}

/// Attendee question, reported on but never scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SpectatorQuestion {
    pub question_id: String,
    pub text: String,
    pub position: i32,
}

/// Snapshot of the active categories and questions.
///
/// Loaded from the store for every submission, so a vote is always checked
/// against the criteria that were live when it was cast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CategoryRegistry {
    categories: Vec<ScoringCategory>,
    questions: Vec<SpectatorQuestion>,
}

impl CategoryRegistry {
    pub fn new(
        mut categories: Vec<ScoringCategory>,
        mut questions: Vec<SpectatorQuestion>,
    ) -> Self {
        categories.sort_by_key(|c| c.position);
        questions.sort_by_key(|q| q.position);

        let weight_sum: Decimal = categories.iter().map(|c| c.weight).sum();
        if !categories.is_empty() && (weight_sum - Decimal::ONE).abs() > Decimal::new(1, 2) {
            tracing::warn!(
                "Scoring category weights add up to {} instead of 1.0",
                weight_sum
            );
        }

        Self {
            categories,
            questions,
        }
    }

    pub fn categories(&self) -> &[ScoringCategory] {
        &self.categories
    }

    pub fn questions(&self) -> &[SpectatorQuestion] {
        &self.questions
    }

    pub fn category(&self, category_id: &str) -> Option<&ScoringCategory> {
        self.categories
            .iter()
            .find(|c| c.category_id == category_id)
    }

    pub fn has_category(&self, category_id: &str) -> bool {
        self.category(category_id).is_some()
    }

    pub fn has_question(&self, question_id: &str) -> bool {
        self.questions.iter().any(|q| q.question_id == question_id)
    }

    pub fn max_points(&self) -> i32 {
        MAX_POINTS
    }

    pub fn max_scale(&self) -> i32 {
        MAX_SCALE
    }

    /// Weighted 0–25 figure: `score × weight × MAX_POINTS / MAX_SCALE`.
    ///
    /// Only used to recognise totals that were stored with the old weighted
    /// formula. Unknown categories contribute nothing.
    pub fn weighted_total(&self, ratings: &[Rating]) -> Decimal {
        let factor = Decimal::from(MAX_POINTS) / Decimal::from(MAX_SCALE);

        ratings
            .iter()
            .filter_map(|r| {
                self.category(&r.category_id)
                    .map(|c| Decimal::from(r.score) * c.weight * factor)
            })
            .sum()
    }
}

impl Default for CategoryRegistry {
    /// Five equally weighted criteria and three attendee questions, matching
    /// the rows seeded by the initial migration.
    fn default() -> Self {
        let category = |id: &str, name: &str, description: &str, position: i32| ScoringCategory {
            category_id: id.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
            weight: Decimal::new(2, 1),
            position,
        };
        let question = |id: &str, text: &str, position: i32| SpectatorQuestion {
            question_id: id.to_string(),
            text: text.to_string(),
            position,
        };

        Self::new(
            vec![
                category("content", "Content", "Depth and accuracy of the material", 1),
                category("delivery", "Delivery", "Clarity and pacing of the talk", 2),
                category("originality", "Originality", "Novelty of the ideas presented", 3),
                category("relevance", "Relevance", "Fit with the conference themes", 4),
                category("visuals", "Visuals", "Quality of slides and demos", 5),
            ],
            vec![
                question("clarity", "Was the talk easy to follow?", 1),
                question("usefulness", "Will you use what you learned?", 2),
                question("engagement", "Did the speaker keep your attention?", 3),
            ],
        )
    }
}
