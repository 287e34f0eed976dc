use storage::{
    VoteStore,
    dto::vote::SubmitVoteRequest,
    error::Result,
    models::{VoteRecord, VoteRole},
    services::voting::{SubmitOutcome, VotingService},
};
use uuid::Uuid;

/// Submit a ballot for the caller
pub async fn submit_vote(
    store: &dyn VoteStore,
    user_id: &str,
    role: VoteRole,
    presentation_id: Uuid,
    request: SubmitVoteRequest,
) -> Result<SubmitOutcome> {
    let ballot = request.into_ballot()?;
    VotingService::new(store)
        .submit_vote(user_id, presentation_id, role, ballot)
        .await
}

/// Get the caller's vote on a presentation
pub async fn get_vote(
    store: &dyn VoteStore,
    user_id: &str,
    presentation_id: Uuid,
) -> Result<Option<VoteRecord>> {
    VotingService::new(store).get_vote(user_id, presentation_id).await
}
