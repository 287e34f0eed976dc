use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use storage::{
    models::{Presentation, PresentationRollup, VoteRole},
    services::{
        aggregator,
        audit::{self, AuditFilter, VoteAudit},
    },
};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::error::{WebError, WebResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoleQuery {
    pub role: Option<VoteRole>,
}

#[utoipa::path(
    get,
    path = "/api/presentations",
    responses(
        (status = 200, description = "All presentations with their cached rollups", body = Vec<Presentation>)
    ),
    tag = "presentations"
)]
pub async fn list_presentations(State(state): State<AppState>) -> WebResult<Json<Vec<Presentation>>> {
    let presentations = state.store().list_presentations().await?;
    Ok(Json(presentations))
}

#[utoipa::path(
    get,
    path = "/api/presentations/{presentation_id}",
    params(
        ("presentation_id" = Uuid, Path, description = "Presentation id")
    ),
    responses(
        (status = 200, description = "Presentation found", body = Presentation),
        (status = 404, description = "Presentation not found")
    ),
    tag = "presentations"
)]
pub async fn get_presentation(
    State(state): State<AppState>,
    Path(presentation_id): Path<Uuid>,
) -> WebResult<Json<Presentation>> {
    let presentation = state
        .store()
        .get_presentation(presentation_id)
        .await?
        .ok_or(WebError::NotFound)?;

    Ok(Json(presentation))
}

#[utoipa::path(
    get,
    path = "/api/presentations/{presentation_id}/rollup",
    params(
        ("presentation_id" = Uuid, Path, description = "Presentation id")
    ),
    responses(
        (status = 200, description = "Judge total, judge count and spectator likes", body = PresentationRollup),
        (status = 404, description = "Presentation not found")
    ),
    tag = "presentations"
)]
pub async fn get_rollup(
    State(state): State<AppState>,
    Path(presentation_id): Path<Uuid>,
) -> WebResult<Json<PresentationRollup>> {
    let rollup = aggregator::get_presentation_rollup(state.store(), presentation_id).await?;
    Ok(Json(rollup))
}

#[utoipa::path(
    get,
    path = "/api/presentations/{presentation_id}/audit",
    params(
        ("presentation_id" = Uuid, Path, description = "Presentation id"),
        RoleQuery
    ),
    responses(
        (status = 200, description = "Every vote on the presentation with its history", body = Vec<VoteAudit>),
        (status = 404, description = "Presentation not found")
    ),
    tag = "audit"
)]
pub async fn get_presentation_audit(
    State(state): State<AppState>,
    Path(presentation_id): Path<Uuid>,
    Query(query): Query<RoleQuery>,
) -> WebResult<Json<Vec<VoteAudit>>> {
    if state.store().get_presentation(presentation_id).await?.is_none() {
        return Err(WebError::NotFound);
    }

    let filter = AuditFilter {
        presentation_id: Some(presentation_id),
        role: query.role,
        ..AuditFilter::default()
    };
    let audit = audit::get_vote_audit(state.store(), &filter).await?;

    Ok(Json(audit))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;
    use uuid::Uuid;

    use crate::features::test_support::{TestApp, body_json, json_request};

    #[tokio::test]
    async fn test_rollup_after_votes() {
        let app = TestApp::new();
        let presentation = app.presentation("Pinning explained").await;
        let votes_uri = format!("/api/presentations/{}/votes", presentation.presentation_id);

        for (user, score) in [("judge-1", 4), ("judge-2", 5)] {
            let response = app
                .send(json_request(
                    "POST",
                    &votes_uri,
                    Some((user, "judge")),
                    json!({"ratings": [
                        {"category_id": "content", "score": score},
                        {"category_id": "delivery", "score": score}
                    ]}),
                ))
                .await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }
        app.send(json_request(
            "POST",
            &votes_uri,
            Some(("fan-1", "spectator")),
            json!({"like": true}),
        ))
        .await;

        let response = app
            .send(
                Request::get(format!(
                    "/api/presentations/{}/rollup",
                    presentation.presentation_id
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["judge_total"], "18");
        assert_eq!(body["judge_count"], 2);
        assert_eq!(body["spectator_likes"], 1);
    }

    #[tokio::test]
    async fn test_unknown_presentation_is_404() {
        let app = TestApp::new();
        let response = app
            .send(
                Request::get(format!("/api/presentations/{}/rollup", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_presentation_audit_filters_by_role() {
        let app = TestApp::new();
        let presentation = app.presentation("Async drop").await;
        let votes_uri = format!("/api/presentations/{}/votes", presentation.presentation_id);

        app.send(json_request(
            "POST",
            &votes_uri,
            Some(("judge-1", "judge")),
            json!({"ratings": [{"category_id": "content", "score": 3}]}),
        ))
        .await;
        app.send(json_request(
            "POST",
            &votes_uri,
            Some(("fan-1", "spectator")),
            json!({"like": true}),
        ))
        .await;

        let response = app
            .send(
                Request::get(format!(
                    "/api/presentations/{}/audit?role=judge",
                    presentation.presentation_id
                ))
                .body(Body::empty())
                .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let audits = body.as_array().unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0]["vote"]["user_id"], "judge-1");
        assert_eq!(audits[0]["history"][0]["action"], "created");
    }
}
