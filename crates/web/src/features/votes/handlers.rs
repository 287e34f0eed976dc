use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use storage::{
    dto::vote::{SubmitVoteRequest, SubmitVoteResponse},
    models::{HistoryAction, VoteRecord},
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{WebError, WebResult};
use crate::middleware::identity::Caller;
use crate::state::AppState;

use super::services;

#[utoipa::path(
    post,
    path = "/api/presentations/{presentation_id}/votes",
    params(
        ("presentation_id" = Uuid, Path, description = "Presentation id"),
        ("X-User-Id" = String, Header, description = "Caller id from the auth service"),
        ("X-User-Role" = String, Header, description = "judge or spectator")
    ),
    request_body = SubmitVoteRequest,
    responses(
        (status = 201, description = "Vote created", body = SubmitVoteResponse),
        (status = 200, description = "Existing vote replaced", body = SubmitVoteResponse),
        (status = 400, description = "Invalid role or ballot"),
        (status = 401, description = "Missing caller identity"),
        (status = 404, description = "Presentation not found")
    ),
    tag = "votes"
)]
pub async fn submit_vote(
    State(state): State<AppState>,
    Path(presentation_id): Path<Uuid>,
    caller: Caller,
    Json(req): Json<SubmitVoteRequest>,
) -> WebResult<Response> {
    req.validate()?;
    let role = caller.require_role()?;

    let outcome =
        services::submit_vote(state.store(), &caller.user_id, role, presentation_id, req).await?;

    let status = match outcome.action {
        HistoryAction::Created => StatusCode::CREATED,
        HistoryAction::Updated => StatusCode::OK,
    };

    Ok((status, Json(SubmitVoteResponse::from(outcome))).into_response())
}

#[utoipa::path(
    get,
    path = "/api/presentations/{presentation_id}/votes/me",
    params(
        ("presentation_id" = Uuid, Path, description = "Presentation id"),
        ("X-User-Id" = String, Header, description = "Caller id from the auth service")
    ),
    responses(
        (status = 200, description = "The caller's vote", body = VoteRecord),
        (status = 401, description = "Missing caller identity"),
        (status = 404, description = "No vote yet")
    ),
    tag = "votes"
)]
pub async fn get_my_vote(
    State(state): State<AppState>,
    Path(presentation_id): Path<Uuid>,
    caller: Caller,
) -> WebResult<Json<VoteRecord>> {
    let vote = services::get_vote(state.store(), &caller.user_id, presentation_id)
        .await?
        .ok_or(WebError::NotFound)?;

    Ok(Json(vote))
}
