use axum::{Json, extract::State};
use storage::models::CategoryRegistry;

use crate::error::WebError;
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/categories",
    responses(
        (status = 200, description = "Active scoring categories and spectator questions", body = CategoryRegistry)
    ),
    tag = "categories"
)]
pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<CategoryRegistry>, WebError> {
    let registry = state.store().load_registry().await?;
    Ok(Json(registry))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::{Request, StatusCode}};

    use crate::features::test_support::{TestApp, body_json};

    #[tokio::test]
    async fn test_list_categories() {
        let app = TestApp::new();
        let response = app
            .send(Request::get("/api/categories").body(Body::empty()).unwrap())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["categories"].as_array().unwrap().len(), 5);
        assert_eq!(body["questions"][0]["question_id"], "clarity");
    }
}
