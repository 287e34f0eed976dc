use async_trait::async_trait;
use uuid::Uuid;

use super::{BatchReceipt, BatchWrite, VoteStore};
use crate::Database;
use crate::error::{Result, StorageError};
use crate::models::{CategoryRegistry, Presentation, PresentationRollup, VoteRecord};
use crate::repository::category::CategoryRepository;
use crate::repository::presentation::{self, PresentationRepository};
use crate::repository::vote::{self, VoteRepository};

#[async_trait]
impl VoteStore for Database {
    fn max_batch_writes(&self) -> usize {
        self.max_batch_writes
    }

    async fn load_registry(&self) -> Result<CategoryRegistry> {
        CategoryRepository::new(self.pool()).load_registry().await
    }

    async fn get_presentation(&self, presentation_id: Uuid) -> Result<Option<Presentation>> {
        PresentationRepository::new(self.pool())
            .find_by_id(presentation_id)
            .await
    }

    async fn list_presentations(&self) -> Result<Vec<Presentation>> {
        PresentationRepository::new(self.pool()).list().await
    }

    async fn upsert_presentation(&self, presentation: &Presentation) -> Result<()> {
        PresentationRepository::new(self.pool())
            .upsert(presentation)
            .await
    }

    async fn get_vote(&self, user_id: &str, presentation_id: Uuid) -> Result<Option<VoteRecord>> {
        VoteRepository::new(self.pool())
            .find(user_id, presentation_id)
            .await
    }

    async fn get_vote_by_id(&self, vote_id: Uuid) -> Result<Option<VoteRecord>> {
        VoteRepository::new(self.pool()).find_by_id(vote_id).await
    }

    async fn list_votes_for_presentation(&self, presentation_id: Uuid) -> Result<Vec<VoteRecord>> {
        VoteRepository::new(self.pool())
            .list_for_presentation(presentation_id)
            .await
    }

    async fn list_votes_for_user(&self, user_id: &str) -> Result<Vec<VoteRecord>> {
        VoteRepository::new(self.pool()).list_for_user(user_id).await
    }

    async fn list_votes(&self) -> Result<Vec<VoteRecord>> {
        VoteRepository::new(self.pool()).list_all().await
    }

    async fn insert_vote(&self, vote: &VoteRecord) -> Result<()> {
        VoteRepository::new(self.pool()).insert(vote).await
    }

    async fn set_vote_absent(
        &self,
        vote_id: Uuid,
        is_absent: bool,
        reason: Option<&str>,
    ) -> Result<()> {
        VoteRepository::new(self.pool())
            .set_absent(vote_id, is_absent, reason)
            .await
    }

    async fn write_rollup(&self, presentation_id: Uuid, rollup: &PresentationRollup) -> Result<()> {
        PresentationRepository::new(self.pool())
            .write_rollup(presentation_id, rollup)
            .await
    }

    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> Result<BatchReceipt> {
        if writes.len() > self.max_batch_writes {
            return Err(StorageError::BatchTooLarge {
                size: writes.len(),
                limit: self.max_batch_writes,
            });
        }

        let mut tx = self.pool().begin().await?;
        let mut receipt = BatchReceipt::default();

        // An early return drops `tx`, which rolls the batch back.
        for write in &writes {
            match write {
                BatchWrite::InsertVote(record) => vote::insert_vote(&mut *tx, record).await?,
                BatchWrite::ReplaceVote {
                    vote: record,
                    expected_revision,
                } => vote::replace_vote(&mut *tx, record, *expected_revision).await?,
                BatchWrite::DeleteVote(vote_id) => vote::delete_vote(&mut *tx, *vote_id).await?,
                BatchWrite::CorrectTotal {
                    vote_id,
                    expected_total,
                    expected_revision,
                    total_score,
                    original_total_score,
                } => {
                    let applied = vote::correct_total(
                        &mut *tx,
                        *vote_id,
                        *expected_total,
                        *expected_revision,
                        *total_score,
                        *original_total_score,
                    )
                    .await?;
                    if !applied {
                        receipt.stale.push(*vote_id);
                        continue;
                    }
                }
                BatchWrite::Rollup {
                    presentation_id,
                    rollup,
                } => presentation::write_rollup(&mut *tx, *presentation_id, rollup).await?,
            }
            receipt.applied += 1;
        }

        tx.commit().await?;
        Ok(receipt)
    }
}
