use sqlx::PgPool;

use crate::error::Result;
use crate::models::{CategoryRegistry, ScoringCategory, SpectatorQuestion};

/// Repository for the scoring registry tables
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_active_categories(&self) -> Result<Vec<ScoringCategory>> {
        let categories = sqlx::query_as::<_, ScoringCategory>(
            r#"
            SELECT category_id, name, description, weight, position
            FROM scoring_categories
            WHERE is_active = true
            ORDER BY position, category_id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(categories)
    }

    pub async fn list_active_questions(&self) -> Result<Vec<SpectatorQuestion>> {
        let questions = sqlx::query_as::<_, SpectatorQuestion>(
            r#"
            SELECT question_id, text, position
            FROM spectator_questions
            WHERE is_active = true
            ORDER BY position, question_id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(questions)
    }

    /// Current registry snapshot
    pub async fn load_registry(&self) -> Result<CategoryRegistry> {
        let categories = self.list_active_categories().await?;
        let questions = self.list_active_questions().await?;

        Ok(CategoryRegistry::new(categories, questions))
    }
}
