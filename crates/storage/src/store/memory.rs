use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BatchReceipt, BatchWrite, DEFAULT_MAX_BATCH_WRITES, VoteStore};
use crate::error::{Result, StorageError};
use crate::models::{CategoryRegistry, Presentation, PresentationRollup, VoteRecord};

/// In-process store used by tests and local tooling
///
/// Guards are released before a method returns, so no lock outlives a single
/// store call.
pub struct MemoryStore {
    registry: RwLock<CategoryRegistry>,
    presentations: RwLock<HashMap<Uuid, Presentation>>,
    votes: RwLock<HashMap<Uuid, VoteRecord>>,
    max_batch_writes: usize,
    commits: RwLock<Vec<usize>>,
    fail_writes_after: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_registry(CategoryRegistry::default())
    }

    pub fn with_registry(registry: CategoryRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
            presentations: RwLock::new(HashMap::new()),
            votes: RwLock::new(HashMap::new()),
            max_batch_writes: DEFAULT_MAX_BATCH_WRITES,
            commits: RwLock::new(Vec::new()),
            fail_writes_after: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn with_max_batch_writes(mut self, max_batch_writes: usize) -> Self {
        self.max_batch_writes = max_batch_writes;
        self
    }

    /// Swaps the registry, as an administrator retiring or reweighting a
    /// category would.
    pub async fn set_registry(&self, registry: CategoryRegistry) {
        *self.registry.write().await = registry;
    }

    /// Lets `successful` more writes through, then fails every write with
    /// `StoreWrite`.
    pub fn fail_writes_after(&self, successful: usize) {
        self.fail_writes_after.store(successful, Ordering::SeqCst);
    }

    /// Sizes of the batches committed so far, in order.
    pub async fn committed_batches(&self) -> Vec<usize> {
        self.commits.read().await.clone()
    }

    /// Seeds a vote exactly as given, bypassing the engine.
    pub async fn seed_vote(&self, vote: VoteRecord) {
        self.votes.write().await.insert(vote.vote_id, vote);
    }

    fn check_write(&self) -> Result<()> {
        let remaining = self.fail_writes_after.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(StorageError::StoreWrite(
                "memory store rejected the write".to_string(),
            ));
        }
        if remaining != usize::MAX {
            self.fail_writes_after.store(remaining - 1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn sorted(mut votes: Vec<VoteRecord>) -> Vec<VoteRecord> {
        votes.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.vote_id.cmp(&b.vote_id))
        });
        votes
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoteStore for MemoryStore {
    fn max_batch_writes(&self) -> usize {
        self.max_batch_writes
    }

    async fn load_registry(&self) -> Result<CategoryRegistry> {
        Ok(self.registry.read().await.clone())
    }

    async fn get_presentation(&self, presentation_id: Uuid) -> Result<Option<Presentation>> {
        Ok(self.presentations.read().await.get(&presentation_id).cloned())
    }

    async fn list_presentations(&self) -> Result<Vec<Presentation>> {
        let mut presentations: Vec<Presentation> =
            self.presentations.read().await.values().cloned().collect();
        presentations.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(presentations)
    }

    async fn upsert_presentation(&self, presentation: &Presentation) -> Result<()> {
        self.check_write()?;
        let mut presentations = self.presentations.write().await;

        // The rollup belongs to the aggregator: new rows start empty and
        // existing rows keep theirs.
        let rollup = presentations
            .get(&presentation.presentation_id)
            .map(|existing| existing.rollup.clone())
            .unwrap_or_default();
        presentations.insert(
            presentation.presentation_id,
            Presentation {
                rollup,
                ..presentation.clone()
            },
        );
        Ok(())
    }

    async fn get_vote(&self, user_id: &str, presentation_id: Uuid) -> Result<Option<VoteRecord>> {
        Ok(self
            .votes
            .read()
            .await
            .values()
            .find(|v| v.user_id == user_id && v.presentation_id == presentation_id)
            .cloned())
    }

    async fn get_vote_by_id(&self, vote_id: Uuid) -> Result<Option<VoteRecord>> {
        Ok(self.votes.read().await.get(&vote_id).cloned())
    }

    async fn list_votes_for_presentation(&self, presentation_id: Uuid) -> Result<Vec<VoteRecord>> {
        let votes = self
            .votes
            .read()
            .await
            .values()
            .filter(|v| v.presentation_id == presentation_id)
            .cloned()
            .collect();
        Ok(Self::sorted(votes))
    }

    async fn list_votes_for_user(&self, user_id: &str) -> Result<Vec<VoteRecord>> {
        let votes = self
            .votes
            .read()
            .await
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        Ok(Self::sorted(votes))
    }

    async fn list_votes(&self) -> Result<Vec<VoteRecord>> {
        let votes = self.votes.read().await.values().cloned().collect();
        Ok(Self::sorted(votes))
    }

    async fn insert_vote(&self, vote: &VoteRecord) -> Result<()> {
        self.check_write()?;
        let mut votes = self.votes.write().await;

        if votes.values().any(|v| {
            v.user_id == vote.user_id && v.presentation_id == vote.presentation_id
        }) {
            return Err(StorageError::ConstraintViolation(format!(
                "user {} already voted on presentation {}",
                vote.user_id, vote.presentation_id
            )));
        }

        votes.insert(vote.vote_id, vote.clone());
        Ok(())
    }

    async fn set_vote_absent(
        &self,
        vote_id: Uuid,
        is_absent: bool,
        reason: Option<&str>,
    ) -> Result<()> {
        self.check_write()?;
        let mut votes = self.votes.write().await;
        let vote = votes.get_mut(&vote_id).ok_or(StorageError::NotFound)?;
        vote.is_absent = is_absent;
        vote.absent_reason = reason.map(str::to_string);
        Ok(())
    }

    async fn write_rollup(&self, presentation_id: Uuid, rollup: &PresentationRollup) -> Result<()> {
        self.check_write()?;
        let mut presentations = self.presentations.write().await;
        let presentation = presentations
            .get_mut(&presentation_id)
            .ok_or(StorageError::NotFound)?;
        presentation.rollup = rollup.clone();
        Ok(())
    }

    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> Result<BatchReceipt> {
        if writes.len() > self.max_batch_writes {
            return Err(StorageError::BatchTooLarge {
                size: writes.len(),
                limit: self.max_batch_writes,
            });
        }
        self.check_write()?;

        let mut votes = self.votes.write().await;
        let mut presentations = self.presentations.write().await;

        // Validate everything first so a bad write leaves nothing applied.
        for write in &writes {
            match write {
                BatchWrite::InsertVote(vote) => {
                    if votes.contains_key(&vote.vote_id)
                        || votes.values().any(|v| {
                            v.user_id == vote.user_id && v.presentation_id == vote.presentation_id
                        })
                    {
                        return Err(StorageError::ConstraintViolation(format!(
                            "user {} already voted on presentation {}",
                            vote.user_id, vote.presentation_id
                        )));
                    }
                }
                BatchWrite::ReplaceVote {
                    vote,
                    expected_revision,
                } => {
                    let stored = votes.get(&vote.vote_id).ok_or(StorageError::NotFound)?;
                    if stored.revision() != *expected_revision {
                        return Err(StorageError::ConstraintViolation(format!(
                            "vote {} changed while it was being updated",
                            vote.vote_id
                        )));
                    }
                }
                BatchWrite::DeleteVote(vote_id) if !votes.contains_key(vote_id) => {
                    return Err(StorageError::NotFound);
                }
                BatchWrite::Rollup {
                    presentation_id, ..
                } if !presentations.contains_key(presentation_id) => {
                    return Err(StorageError::NotFound);
                }
                _ => {}
            }
        }

        let size = writes.len();
        let mut receipt = BatchReceipt::default();
        for write in writes {
            match write {
                BatchWrite::InsertVote(vote) | BatchWrite::ReplaceVote { vote, .. } => {
                    votes.insert(vote.vote_id, vote);
                }
                BatchWrite::DeleteVote(vote_id) => {
                    votes.remove(&vote_id);
                }
                BatchWrite::CorrectTotal {
                    vote_id,
                    expected_total,
                    expected_revision,
                    total_score,
                    original_total_score,
                } => {
                    let Some(vote) = votes.get_mut(&vote_id).filter(|v| {
                        v.total_score == expected_total && v.revision() == expected_revision
                    }) else {
                        receipt.stale.push(vote_id);
                        continue;
                    };
                    vote.original_total_score =
                        vote.original_total_score.or(Some(original_total_score));
                    vote.total_score = total_score;
                    vote.fixed_by_script = true;
                }
                BatchWrite::Rollup {
                    presentation_id,
                    rollup,
                } => {
                    if let Some(presentation) = presentations.get_mut(&presentation_id) {
                        presentation.rollup = rollup;
                    }
                }
            }
            receipt.applied += 1;
        }
        drop(presentations);
        drop(votes);

        self.commits.write().await.push(size);
        Ok(receipt)
    }
}
