use chrono::Utc;
use std::collections::BTreeSet;
use storage::{
    StorageError, VoteStore,
    models::Presentation,
    services::aggregator,
};
use tracing::info;
use uuid::Uuid;

use super::models::LegacyExport;
use crate::Result;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub already_present: usize,
    pub presentations_created: usize,
    pub rollups_recomputed: usize,
}

/// Loads validated legacy documents into a store.
///
/// Reruns are safe: a (user, presentation) pair that already has a vote is
/// left alone.
pub struct LegacyImporter<'a> {
    store: &'a dyn VoteStore,
}

impl<'a> LegacyImporter<'a> {
    pub fn new(store: &'a dyn VoteStore) -> Self {
        Self { store }
    }

    pub async fn import(&self, export: LegacyExport) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();
        let mut touched = BTreeSet::new();
        let imported_at = Utc::now();

        for doc in export.votes {
            let title = doc.presentation_title.clone();
            let record = doc.into_record(imported_at)?;

            if self
                .ensure_presentation(record.presentation_id, title)
                .await?
            {
                summary.presentations_created += 1;
            }

            match self.store.insert_vote(&record).await {
                Ok(()) => {
                    summary.inserted += 1;
                    touched.insert(record.presentation_id);
                }
                Err(e) if e.is_unique_violation() => {
                    summary.already_present += 1;
                    info!(
                        "Vote for {} on {} already present, skipping",
                        record.user_id, record.presentation_id
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "Recomputing rollups for {} presentation(s)...",
            touched.len()
        );
        for presentation_id in touched {
            aggregator::recompute_presentation_rollup(self.store, presentation_id).await?;
            summary.rollups_recomputed += 1;
        }

        Ok(summary)
    }

    async fn ensure_presentation(&self, presentation_id: Uuid, title: Option<String>) -> Result<bool> {
        if self.store.get_presentation(presentation_id).await?.is_some() {
            return Ok(false);
        }

        let mut presentation = Presentation::new(
            title.unwrap_or_else(|| format!("Imported presentation {}", presentation_id)),
        );
        presentation.presentation_id = presentation_id;

        match self.store.upsert_presentation(&presentation).await {
            Ok(()) => {
                info!("Created presentation {} ({})", presentation.title, presentation_id);
                Ok(true)
            }
            Err(StorageError::ConstraintViolation(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
