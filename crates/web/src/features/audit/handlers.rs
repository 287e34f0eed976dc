use axum::{
    Json,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use storage::{
    dto::vote::ExportQuery,
    services::audit::{self, AuditFilter, VoteAudit},
};

use crate::error::WebResult;
use crate::features::presentations::handlers::RoleQuery;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/audit",
    params(
        ("user_id" = String, Path, description = "Voter id"),
        RoleQuery
    ),
    responses(
        (status = 200, description = "Every vote cast by the user with its history", body = Vec<VoteAudit>)
    ),
    tag = "audit"
)]
pub async fn get_user_audit(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<RoleQuery>,
) -> WebResult<Json<Vec<VoteAudit>>> {
    let filter = AuditFilter {
        user_id: Some(user_id),
        role: query.role,
        ..AuditFilter::default()
    };
    let audit = audit::get_vote_audit(state.store(), &filter).await?;

    Ok(Json(audit))
}

#[utoipa::path(
    get,
    path = "/api/audit/export",
    params(ExportQuery),
    responses(
        (status = 200, description = "Audit export as a JSON document or a CSV table"),
        (status = 400, description = "Unsupported format or filter")
    ),
    tag = "audit"
)]
pub async fn export_audit(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> WebResult<Response> {
    let bytes = audit::export_audit(state.store(), query.format, &query.filter()).await?;

    let headers = [
        (header::CONTENT_TYPE, query.format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"vote-audit.{}\"",
                query.format.extension()
            ),
        ),
    ];

    Ok((headers, bytes).into_response())
}
