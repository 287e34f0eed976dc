use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::models::{
    Ballot, HistoryAction, HistoryEntry, PresentationRollup, VoteRecord, VoteRole,
};
use crate::services::aggregator;
use crate::services::normalizer::{Normalized, strategy_for};
use crate::store::{BatchWrite, VoteStore};

/// Outcome of a submission, returned once the vote and rollup are stored
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitOutcome {
    pub vote_id: Uuid,
    pub total_score: Decimal,
    pub action: HistoryAction,
    pub rollup: PresentationRollup,
}

/// Vote record operations over an injected store
pub struct VotingService<'a> {
    store: &'a dyn VoteStore,
}

impl<'a> VotingService<'a> {
    pub fn new(store: &'a dyn VoteStore) -> Self {
        Self { store }
    }

    /// Records a ballot and refreshes the presentation rollup before
    /// returning.
    ///
    /// The vote and the rollup derived from it go to the store as one batch,
    /// so either both are stored or neither is.
    pub async fn submit_vote(
        &self,
        user_id: &str,
        presentation_id: Uuid,
        role: VoteRole,
        ballot: Ballot,
    ) -> Result<SubmitOutcome> {
        let pending = self
            .prepare_vote(user_id, presentation_id, role, ballot)
            .await?;
        let vote = pending.vote;

        let mut votes = self.store.list_votes_for_presentation(presentation_id).await?;
        votes.retain(|v| v.vote_id != vote.vote_id);
        votes.push(vote.clone());
        let mut rollup = aggregator::compute_rollup(&votes);
        rollup.recomputed_at = Some(Utc::now());

        let write = match pending.previous_score {
            None => BatchWrite::InsertVote(vote.clone()),
            Some(_) => BatchWrite::ReplaceVote {
                vote: vote.clone(),
                expected_revision: pending.expected_revision,
            },
        };
        self.store
            .commit_batch(vec![
                write,
                BatchWrite::Rollup {
                    presentation_id,
                    rollup: rollup.clone(),
                },
            ])
            .await?;

        let action = vote
            .history
            .last()
            .map(|h| h.action)
            .unwrap_or(HistoryAction::Created);

        match pending.previous_score {
            None => tracing::info!(
                vote_id = %vote.vote_id,
                user_id = %vote.user_id,
                %presentation_id,
                role = %role,
                total_score = %vote.total_score,
                "Vote created"
            ),
            Some(previous_score) => tracing::info!(
                vote_id = %vote.vote_id,
                user_id = %vote.user_id,
                %presentation_id,
                previous_score = %previous_score,
                total_score = %vote.total_score,
                "Vote updated"
            ),
        }

        Ok(SubmitOutcome {
            vote_id: vote.vote_id,
            total_score: vote.total_score,
            action,
            rollup,
        })
    }

    /// Builds the new or rewritten record without storing it.
    ///
    /// The new total always comes from the normalizer, so ratings and total
    /// never disagree.
    async fn prepare_vote(
        &self,
        user_id: &str,
        presentation_id: Uuid,
        role: VoteRole,
        ballot: Ballot,
    ) -> Result<PendingVote> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(StorageError::Validation("user id is required".to_string()));
        }
        check_ballot_shape(role, &ballot)?;

        if self.store.get_presentation(presentation_id).await?.is_none() {
            return Err(StorageError::NotFound);
        }

        let registry = self.store.load_registry().await?;
        let normalized = strategy_for(role).normalize(&ballot, &registry);
        log_ignored(user_id, presentation_id, &normalized);

        let now = Utc::now();

        match self.store.get_vote(user_id, presentation_id).await? {
            None => Ok(PendingVote {
                vote: new_vote(user_id, presentation_id, role, normalized, now),
                previous_score: None,
                expected_revision: 0,
            }),
            Some(existing) => {
                if existing.role != role {
                    return Err(StorageError::Validation(format!(
                        "vote {} was cast as {} and cannot be resubmitted as {}",
                        existing.vote_id, existing.role, role
                    )));
                }

                let previous_score = existing.total_score;
                let expected_revision = existing.revision();
                Ok(PendingVote {
                    vote: apply_update(existing, normalized, now),
                    previous_score: Some(previous_score),
                    expected_revision,
                })
            }
        }
    }

    pub async fn get_vote(&self, user_id: &str, presentation_id: Uuid) -> Result<Option<VoteRecord>> {
        self.store.get_vote(user_id, presentation_id).await
    }

    pub async fn list_votes_for_presentation(&self, presentation_id: Uuid) -> Result<Vec<VoteRecord>> {
        self.store.list_votes_for_presentation(presentation_id).await
    }

    /// Flags a vote's presenter as absent. Score and history are untouched.
    pub async fn mark_absent(
        &self,
        vote_id: Uuid,
        is_absent: bool,
        reason: Option<&str>,
    ) -> Result<VoteRecord> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.store
            .set_vote_absent(vote_id, is_absent, if is_absent { reason } else { None })
            .await?;

        let vote = self
            .store
            .get_vote_by_id(vote_id)
            .await?
            .ok_or(StorageError::NotFound)?;

        tracing::info!(%vote_id, is_absent, reason = ?reason, "Vote absence updated");
        Ok(vote)
    }

    /// Moderation delete. The vote goes in the same batch as the rollup
    /// rebuilt without it.
    pub async fn remove_vote(&self, vote_id: Uuid) -> Result<PresentationRollup> {
        let vote = self
            .store
            .get_vote_by_id(vote_id)
            .await?
            .ok_or(StorageError::NotFound)?;

        let mut votes = self
            .store
            .list_votes_for_presentation(vote.presentation_id)
            .await?;
        votes.retain(|v| v.vote_id != vote_id);
        let mut rollup = aggregator::compute_rollup(&votes);
        rollup.recomputed_at = Some(Utc::now());

        self.store
            .commit_batch(vec![
                BatchWrite::DeleteVote(vote_id),
                BatchWrite::Rollup {
                    presentation_id: vote.presentation_id,
                    rollup: rollup.clone(),
                },
            ])
            .await?;

        tracing::warn!(
            %vote_id,
            user_id = %vote.user_id,
            presentation_id = %vote.presentation_id,
            total_score = %vote.total_score,
            "Vote removed by moderation"
        );

        Ok(rollup)
    }
}

struct PendingVote {
    vote: VoteRecord,
    previous_score: Option<Decimal>,
    expected_revision: usize,
}

fn check_ballot_shape(role: VoteRole, ballot: &Ballot) -> Result<()> {
    match (role, ballot) {
        (VoteRole::Judge, Ballot::Ratings { .. }) | (VoteRole::Spectator, Ballot::Like { .. }) => {
            Ok(())
        }
        (VoteRole::Judge, Ballot::Like { .. }) => Err(StorageError::Validation(
            "judges must submit category ratings".to_string(),
        )),
        (VoteRole::Spectator, Ballot::Ratings { .. }) => Err(StorageError::Validation(
            "spectators submit a like, not category ratings".to_string(),
        )),
    }
}

fn log_ignored(user_id: &str, presentation_id: Uuid, normalized: &Normalized) {
    for ignored in &normalized.ignored {
        tracing::warn!(
            user_id,
            %presentation_id,
            entry = %ignored.id,
            score = ignored.score,
            reason = ?ignored.reason,
            "Ignoring rating entry"
        );
    }
}

fn new_vote(
    user_id: &str,
    presentation_id: Uuid,
    role: VoteRole,
    normalized: Normalized,
    now: DateTime<Utc>,
) -> VoteRecord {
    VoteRecord {
        vote_id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        presentation_id,
        role,
        history: vec![HistoryEntry {
            timestamp: now,
            action: HistoryAction::Created,
            total_score: normalized.total,
            previous_score: None,
            ratings: normalized.ratings.clone(),
        }],
        ratings: normalized.ratings,
        answers: normalized.answers,
        total_score: normalized.total,
        created_at: now,
        updated_at: None,
        is_absent: false,
        absent_reason: None,
        fixed_by_script: false,
        original_total_score: None,
    }
}

/// Applies a resubmission. History timestamps never go backwards, even if the
/// clock does.
fn apply_update(mut vote: VoteRecord, normalized: Normalized, now: DateTime<Utc>) -> VoteRecord {
    let timestamp = now.max(vote.last_touched());

    vote.history.push(HistoryEntry {
        timestamp,
        action: HistoryAction::Updated,
        total_score: normalized.total,
        previous_score: Some(vote.total_score),
        ratings: normalized.ratings.clone(),
    });
    vote.ratings = normalized.ratings;
    vote.answers = normalized.answers;
    vote.total_score = normalized.total;
    vote.updated_at = Some(timestamp);
    vote
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::{Presentation, QuestionAnswer, Rating};
    use crate::store::MemoryStore;

    fn judge_ballot(scores: &[(&str, i32)]) -> Ballot {
        Ballot::Ratings {
            ratings: scores
                .iter()
                .map(|(id, score)| Rating {
                    category_id: id.to_string(),
                    score: *score,
                })
                .collect(),
        }
    }

    async fn store_with_presentation() -> (MemoryStore, Uuid) {
        let store = MemoryStore::new();
        let presentation = Presentation::new("Zero-copy parsing");
        store.upsert_presentation(&presentation).await.unwrap();
        (store, presentation.presentation_id)
    }

    #[tokio::test]
    async fn test_identical_resubmission_keeps_one_record() {
        let (store, presentation_id) = store_with_presentation().await;
        let service = VotingService::new(&store);
        let ballot = judge_ballot(&[("content", 4), ("delivery", 5), ("originality", 3)]);

        let first = service
            .submit_vote("judge-1", presentation_id, VoteRole::Judge, ballot.clone())
            .await
            .unwrap();
        let second = service
            .submit_vote("judge-1", presentation_id, VoteRole::Judge, ballot)
            .await
            .unwrap();

        assert_eq!(first.vote_id, second.vote_id);
        assert_eq!(first.action, HistoryAction::Created);
        assert_eq!(second.action, HistoryAction::Updated);
        assert_eq!(second.total_score, Decimal::from(12));

        let votes = service.list_votes_for_presentation(presentation_id).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].history.len(), 2);
        assert_eq!(votes[0].history[1].previous_score, Some(Decimal::from(12)));
        assert_eq!(second.rollup.judge_total, Decimal::from(12));
    }

    #[tokio::test]
    async fn test_update_rewrites_total_and_rollup() {
        let (store, presentation_id) = store_with_presentation().await;
        let service = VotingService::new(&store);

        service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 2)]),
            )
            .await
            .unwrap();
        service
            .submit_vote(
                "judge-2",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 5), ("visuals", 5)]),
            )
            .await
            .unwrap();
        let outcome = service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 5), ("delivery", 4)]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.total_score, Decimal::from(9));
        assert_eq!(outcome.rollup.judge_total, Decimal::from(19));
        assert_eq!(outcome.rollup.judge_count, 2);

        let vote = service
            .get_vote("judge-1", presentation_id)
            .await
            .unwrap()
            .unwrap();
        assert!(vote.updated_at.is_some());
        assert_eq!(vote.ratings.len(), 2);
        assert_eq!(vote.history[0].total_score, Decimal::from(2));
    }

    #[tokio::test]
    async fn test_spectator_answers_do_not_move_judge_figures() {
        let (store, presentation_id) = store_with_presentation().await;
        let service = VotingService::new(&store);

        service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 3)]),
            )
            .await
            .unwrap();
        let outcome = service
            .submit_vote(
                "fan-1",
                presentation_id,
                VoteRole::Spectator,
                Ballot::Like {
                    answers: vec![QuestionAnswer {
                        question_id: "clarity".to_string(),
                        score: 5,
                    }],
                },
            )
            .await
            .unwrap();
        service
            .submit_vote(
                "fan-2",
                presentation_id,
                VoteRole::Spectator,
                Ballot::Like { answers: vec![] },
            )
            .await
            .unwrap();

        let rollup = aggregator::get_presentation_rollup(&store, presentation_id)
            .await
            .unwrap();
        assert_eq!(outcome.total_score, Decimal::ONE);
        assert_eq!(rollup.spectator_likes, 2);
        assert_eq!(rollup.judge_total, Decimal::from(3));
    }

    #[tokio::test]
    async fn test_failed_write_reports_error_and_leaves_no_vote() {
        let (store, presentation_id) = store_with_presentation().await;
        store.fail_writes_after(0);
        let service = VotingService::new(&store);

        let err = service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 3)]),
            )
            .await
            .unwrap_err();

        assert!(err.is_write_failure());
        assert!(service.get_vote("judge-1", presentation_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_vote_and_rollup_unchanged() {
        let (store, presentation_id) = store_with_presentation().await;
        let service = VotingService::new(&store);
        store.fail_writes_after(1);

        service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 4)]),
            )
            .await
            .unwrap();
        let err = service
            .submit_vote(
                "judge-2",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 5)]),
            )
            .await
            .unwrap_err();

        assert!(err.is_write_failure());
        assert!(service.get_vote("judge-2", presentation_id).await.unwrap().is_none());

        let rollup = aggregator::get_presentation_rollup(&store, presentation_id)
            .await
            .unwrap();
        assert_eq!(rollup.judge_total, Decimal::from(4));
        assert_eq!(rollup.judge_count, 1);
    }

    #[tokio::test]
    async fn test_outdated_rewrite_cannot_drop_history() {
        let (store, presentation_id) = store_with_presentation().await;
        let service = VotingService::new(&store);
        service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 2)]),
            )
            .await
            .unwrap();

        let outdated = service
            .prepare_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 3)]),
            )
            .await
            .unwrap();
        service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 5)]),
            )
            .await
            .unwrap();

        let err = store
            .commit_batch(vec![BatchWrite::ReplaceVote {
                vote: outdated.vote,
                expected_revision: outdated.expected_revision,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));

        let stored = service
            .get_vote("judge-1", presentation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.history.len(), 2);
        assert_eq!(stored.total_score, Decimal::from(5));
    }

    #[tokio::test]
    async fn test_role_and_ballot_must_match() {
        let (store, presentation_id) = store_with_presentation().await;
        let service = VotingService::new(&store);

        let err = service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                Ballot::Like { answers: vec![] },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_presentation() {
        let store = MemoryStore::new();
        let service = VotingService::new(&store);

        let err = service
            .submit_vote(
                "judge-1",
                Uuid::new_v4(),
                VoteRole::Judge,
                judge_ballot(&[("content", 3)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn test_mark_absent_keeps_score_history() {
        let (store, presentation_id) = store_with_presentation().await;
        let service = VotingService::new(&store);
        service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 4)]),
            )
            .await
            .unwrap();
        let vote = service
            .get_vote("judge-1", presentation_id)
            .await
            .unwrap()
            .unwrap();

        let marked = service
            .mark_absent(vote.vote_id, true, Some("  speaker missed the slot "))
            .await
            .unwrap();

        assert!(marked.is_absent);
        assert_eq!(marked.absent_reason.as_deref(), Some("speaker missed the slot"));
        assert_eq!(marked.history, vote.history);
        assert_eq!(marked.total_score, vote.total_score);
    }

    #[tokio::test]
    async fn test_remove_vote_recomputes_rollup() {
        let (store, presentation_id) = store_with_presentation().await;
        let service = VotingService::new(&store);
        let outcome = service
            .submit_vote(
                "judge-1",
                presentation_id,
                VoteRole::Judge,
                judge_ballot(&[("content", 4)]),
            )
            .await
            .unwrap();

        let rollup = service.remove_vote(outcome.vote_id).await.unwrap();
        assert_eq!(rollup.judge_total, Decimal::ZERO);
        assert!(rollup.judge_scores.is_empty());
    }

    #[test]
    fn test_history_never_goes_backwards() {
        let registry = crate::models::CategoryRegistry::default();
        let now = Utc::now();
        let normalized = strategy_for(VoteRole::Judge)
            .normalize(&judge_ballot(&[("content", 3)]), &registry);
        let vote = new_vote("judge-1", Uuid::new_v4(), VoteRole::Judge, normalized.clone(), now);

        let updated = apply_update(vote, normalized, now - Duration::minutes(5));

        assert_eq!(updated.history.len(), 2);
        assert!(updated.history[1].timestamp >= updated.history[0].timestamp);
        assert_eq!(updated.updated_at, Some(updated.history[1].timestamp));
    }
}
