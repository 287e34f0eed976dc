use storage::{
    VoteStore,
    dto::presentation::CreatePresentationRequest,
    error::Result,
    models::{Presentation, PresentationRollup, VoteRecord},
    services::voting::VotingService,
};
use uuid::Uuid;

/// Register a presentation
pub async fn create_presentation(
    store: &dyn VoteStore,
    request: CreatePresentationRequest,
) -> Result<Presentation> {
    let presentation = request.into_presentation();
    store.upsert_presentation(&presentation).await?;

    tracing::info!(
        presentation_id = %presentation.presentation_id,
        title = %presentation.title,
        "Presentation registered"
    );
    Ok(presentation)
}

/// Flag or clear presenter absence on a vote
pub async fn mark_absent(
    store: &dyn VoteStore,
    vote_id: Uuid,
    is_absent: bool,
    reason: Option<&str>,
) -> Result<VoteRecord> {
    VotingService::new(store)
        .mark_absent(vote_id, is_absent, reason)
        .await
}

/// Delete a vote and rebuild its presentation rollup
pub async fn delete_vote(store: &dyn VoteStore, vote_id: Uuid) -> Result<PresentationRollup> {
    VotingService::new(store).remove_vote(vote_id).await
}
