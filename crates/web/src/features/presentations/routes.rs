use axum::{Router, routing::get};

use super::handlers::{get_presentation, get_presentation_audit, get_rollup, list_presentations};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/presentations", get(list_presentations))
        .route("/presentations/:presentation_id", get(get_presentation))
        .route("/presentations/:presentation_id/rollup", get(get_rollup))
        .route(
            "/presentations/:presentation_id/audit",
            get(get_presentation_audit),
        )
}
