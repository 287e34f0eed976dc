use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::models::{PresentationRollup, VoteRecord, VoteRole};
use crate::store::VoteStore;

/// Derives a rollup from the complete vote set of one presentation.
///
/// Judge scores are summed, never averaged. Every judge vote is listed in
/// `judge_scores`, but only positive totals count towards `judge_count`.
/// Each spectator vote is one like.
pub fn compute_rollup(votes: &[VoteRecord]) -> PresentationRollup {
    let mut judge_votes: Vec<&VoteRecord> = votes.iter().filter(|v| v.is_judge()).collect();
    judge_votes.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.vote_id.cmp(&b.vote_id))
    });

    let judge_scores: Vec<Decimal> = judge_votes.iter().map(|v| v.total_score).collect();
    let judge_total: Decimal = judge_scores.iter().copied().sum();
    let judge_count = judge_scores.iter().filter(|s| **s > Decimal::ZERO).count() as u32;
    let spectator_likes = votes
        .iter()
        .filter(|v| v.role == VoteRole::Spectator)
        .count() as u64;

    PresentationRollup {
        judge_scores,
        judge_total,
        judge_count,
        spectator_likes,
        fixed_by_script: false,
        recomputed_at: None,
    }
}

/// Rebuilds and stores the rollup of a presentation from a fresh read of
/// all its votes.
pub async fn recompute_presentation_rollup(
    store: &dyn VoteStore,
    presentation_id: Uuid,
) -> Result<PresentationRollup> {
    if store.get_presentation(presentation_id).await?.is_none() {
        return Err(StorageError::NotFound);
    }

    let votes = store.list_votes_for_presentation(presentation_id).await?;

    let mut rollup = compute_rollup(&votes);
    rollup.recomputed_at = Some(Utc::now());

    store.write_rollup(presentation_id, &rollup).await?;

    tracing::debug!(
        %presentation_id,
        judge_total = %rollup.judge_total,
        judge_count = rollup.judge_count,
        spectator_likes = rollup.spectator_likes,
        "Rollup recomputed"
    );

    Ok(rollup)
}

/// Stored rollup of a presentation
pub async fn get_presentation_rollup(
    store: &dyn VoteStore,
    presentation_id: Uuid,
) -> Result<PresentationRollup> {
    store
        .get_presentation(presentation_id)
        .await?
        .map(|p| p.rollup)
        .ok_or(StorageError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::models::{Presentation, QuestionAnswer};
    use crate::store::MemoryStore;

    fn vote(role: VoteRole, total: i64, minutes: i64) -> VoteRecord {
        VoteRecord {
            vote_id: Uuid::new_v4(),
            user_id: format!("user-{}", Uuid::new_v4()),
            presentation_id: Uuid::nil(),
            role,
            ratings: vec![],
            answers: vec![],
            total_score: Decimal::from(total),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap() + Duration::minutes(minutes),
            updated_at: None,
            history: vec![],
            is_absent: false,
            absent_reason: None,
            fixed_by_script: false,
            original_total_score: None,
        }
    }

    #[test]
    fn test_judge_total_is_a_sum_not_an_average() {
        let votes = vec![
            vote(VoteRole::Judge, 20, 2),
            vote(VoteRole::Judge, 18, 1),
            vote(VoteRole::Judge, 22, 3),
        ];

        let rollup = compute_rollup(&votes);
        assert_eq!(rollup.judge_total, Decimal::from(60));
        assert_eq!(
            rollup.judge_scores,
            vec![Decimal::from(18), Decimal::from(20), Decimal::from(22)]
        );
        assert_eq!(rollup.judge_count, 3);
    }

    #[test]
    fn test_zero_totals_are_stored_but_not_counted() {
        let votes = vec![vote(VoteRole::Judge, 0, 1), vote(VoteRole::Judge, 15, 2)];

        let rollup = compute_rollup(&votes);
        assert_eq!(rollup.judge_scores.len(), 2);
        assert_eq!(rollup.judge_count, 1);
        assert_eq!(rollup.judge_total, Decimal::from(15));
    }

    #[test]
    fn test_likes_count_spectator_votes_only() {
        let mut chatty = vote(VoteRole::Spectator, 1, 1);
        chatty.answers = vec![QuestionAnswer {
            question_id: "clarity".to_string(),
            score: 5,
        }];
        let votes = vec![
            chatty,
            vote(VoteRole::Spectator, 1, 2),
            vote(VoteRole::Judge, 12, 3),
        ];

        let rollup = compute_rollup(&votes);
        assert_eq!(rollup.spectator_likes, 2);
        assert_eq!(rollup.judge_total, Decimal::from(12));
    }

    #[test]
    fn test_empty_vote_set() {
        let rollup = compute_rollup(&[]);
        assert_eq!(rollup, PresentationRollup::default());
    }

    #[tokio::test]
    async fn test_recompute_writes_rollup_back() {
        let store = MemoryStore::new();
        let presentation = Presentation::new("Ownership in practice");
        store.upsert_presentation(&presentation).await.unwrap();

        let mut judge = vote(VoteRole::Judge, 17, 1);
        judge.presentation_id = presentation.presentation_id;
        store.seed_vote(judge).await;

        let rollup = recompute_presentation_rollup(&store, presentation.presentation_id)
            .await
            .unwrap();
        assert_eq!(rollup.judge_total, Decimal::from(17));

        let stored = get_presentation_rollup(&store, presentation.presentation_id)
            .await
            .unwrap();
        assert!(stored.same_figures(&rollup));
        assert!(stored.recomputed_at.is_some());
    }

    #[tokio::test]
    async fn test_recompute_unknown_presentation() {
        let store = MemoryStore::new();
        let err = recompute_presentation_rollup(&store, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
