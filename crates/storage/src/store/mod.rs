//! Persistence port used by every engine service.
//!
//! Services receive a `&dyn VoteStore` instead of reaching for a shared
//! connection, so the PostgreSQL adapter (`Database`) and the in-memory
//! adapter (`MemoryStore`) are interchangeable.

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CategoryRegistry, Presentation, PresentationRollup, VoteRecord};

pub mod memory;
mod postgres;

pub use memory::MemoryStore;

/// Hard ceiling on documents written by one batch commit.
pub const DEFAULT_MAX_BATCH_WRITES: usize = 400;

/// A single write inside a batch commit
#[derive(Debug, Clone, PartialEq)]
pub enum BatchWrite {
    /// Create a vote. The (user, presentation) pair must be free.
    InsertVote(VoteRecord),
    /// Replace a whole vote document, provided its history still holds
    /// `expected_revision` entries. A mismatch fails the batch.
    ReplaceVote {
        vote: VoteRecord,
        expected_revision: usize,
    },
    /// Moderation delete. `NotFound` fails the batch.
    DeleteVote(Uuid),
    /// Rewrite only the stored total of a vote and mark it as repaired.
    ///
    /// Applies only while the vote still holds `expected_total` at
    /// `expected_revision`; otherwise it is reported as stale and the rest of
    /// the batch goes through. `original_total_score` is set only when empty.
    CorrectTotal {
        vote_id: Uuid,
        expected_total: Decimal,
        expected_revision: usize,
        total_score: Decimal,
        original_total_score: Decimal,
    },
    /// Overwrite the cached rollup of a presentation
    Rollup {
        presentation_id: Uuid,
        rollup: PresentationRollup,
    },
}

/// What a committed batch actually changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReceipt {
    pub applied: usize,
    /// Votes whose `CorrectTotal` guard no longer matched
    pub stale: Vec<Uuid>,
}

#[async_trait]
pub trait VoteStore: Send + Sync {
    /// Largest batch accepted by `commit_batch`.
    fn max_batch_writes(&self) -> usize {
        DEFAULT_MAX_BATCH_WRITES
    }

    async fn load_registry(&self) -> Result<CategoryRegistry>;

    async fn get_presentation(&self, presentation_id: Uuid) -> Result<Option<Presentation>>;

    async fn list_presentations(&self) -> Result<Vec<Presentation>>;

    async fn upsert_presentation(&self, presentation: &Presentation) -> Result<()>;

    async fn get_vote(&self, user_id: &str, presentation_id: Uuid) -> Result<Option<VoteRecord>>;

    async fn get_vote_by_id(&self, vote_id: Uuid) -> Result<Option<VoteRecord>>;

    async fn list_votes_for_presentation(&self, presentation_id: Uuid) -> Result<Vec<VoteRecord>>;

    async fn list_votes_for_user(&self, user_id: &str) -> Result<Vec<VoteRecord>>;

    async fn list_votes(&self) -> Result<Vec<VoteRecord>>;

    /// Fails with `ConstraintViolation` when the (user, presentation) pair
    /// already has a vote.
    async fn insert_vote(&self, vote: &VoteRecord) -> Result<()>;

    async fn set_vote_absent(
        &self,
        vote_id: Uuid,
        is_absent: bool,
        reason: Option<&str>,
    ) -> Result<()>;

    async fn write_rollup(&self, presentation_id: Uuid, rollup: &PresentationRollup) -> Result<()>;

    /// Applies every write or none of them, except stale `CorrectTotal`
    /// writes which are skipped and listed in the receipt. Batches above
    /// `max_batch_writes` are refused with `BatchTooLarge`.
    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> Result<BatchReceipt>;
}
