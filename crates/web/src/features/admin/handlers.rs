use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use storage::{
    dto::{
        presentation::CreatePresentationRequest,
        vote::{MarkAbsentRequest, RepairRequest},
    },
    models::{Presentation, PresentationRollup, VoteRecord},
    services::repair::{self, RollupRepairReport, VoteRepairReport},
};
use uuid::Uuid;
use validator::Validate;

use crate::error::WebResult;
use crate::state::AppState;

use super::services;

#[utoipa::path(
    post,
    path = "/api/admin/presentations",
    request_body = CreatePresentationRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 201, description = "Presentation registered", body = Presentation),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "admin"
)]
pub async fn create_presentation(
    State(state): State<AppState>,
    Json(req): Json<CreatePresentationRequest>,
) -> WebResult<Response> {
    req.validate()?;

    let presentation = services::create_presentation(state.store(), req).await?;

    Ok((StatusCode::CREATED, Json(presentation)).into_response())
}

#[utoipa::path(
    patch,
    path = "/api/admin/votes/{vote_id}/absence",
    params(
        ("vote_id" = Uuid, Path, description = "Vote id")
    ),
    request_body = MarkAbsentRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Absence flag updated", body = VoteRecord),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Vote not found")
    ),
    tag = "admin"
)]
pub async fn mark_absent(
    State(state): State<AppState>,
    Path(vote_id): Path<Uuid>,
    Json(req): Json<MarkAbsentRequest>,
) -> WebResult<Json<VoteRecord>> {
    req.validate()?;

    let vote =
        services::mark_absent(state.store(), vote_id, req.is_absent, req.reason.as_deref()).await?;

    Ok(Json(vote))
}

#[utoipa::path(
    delete,
    path = "/api/admin/votes/{vote_id}",
    params(
        ("vote_id" = Uuid, Path, description = "Vote id")
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Vote deleted, rebuilt rollup returned", body = PresentationRollup),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Vote not found")
    ),
    tag = "admin"
)]
pub async fn delete_vote(
    State(state): State<AppState>,
    Path(vote_id): Path<Uuid>,
) -> WebResult<Json<PresentationRollup>> {
    let rollup = services::delete_vote(state.store(), vote_id).await?;
    Ok(Json(rollup))
}

#[utoipa::path(
    post,
    path = "/api/admin/repair/vote-totals",
    request_body = RepairRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Vote totals reconciled with their ratings", body = VoteRepairReport),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "A batch failed to commit")
    ),
    tag = "admin"
)]
pub async fn repair_vote_totals(
    State(state): State<AppState>,
    Json(req): Json<RepairRequest>,
) -> WebResult<Json<VoteRepairReport>> {
    req.validate()?;

    let report = repair::repair_vote_totals(state.store(), &req.options(&state.repair)).await?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/admin/repair/rollups",
    request_body = RepairRequest,
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Rollups rebuilt from votes", body = RollupRepairReport),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "A batch failed to commit")
    ),
    tag = "admin"
)]
pub async fn repair_rollups(
    State(state): State<AppState>,
    Json(req): Json<RepairRequest>,
) -> WebResult<Json<RollupRepairReport>> {
    req.validate()?;

    let report =
        repair::repair_presentation_rollups(state.store(), &req.options(&state.repair)).await?;
    Ok(Json(report))
}
