use axum::{
    Router, middleware,
    routing::{delete, patch, post},
};

use super::handlers::{
    create_presentation, delete_vote, mark_absent, repair_rollups, repair_vote_totals,
};
use crate::middleware::auth::{ApiKeys, require_auth};
use crate::state::AppState;

pub fn routes(api_keys: ApiKeys) -> Router<AppState> {
    Router::new()
        .route("/admin/presentations", post(create_presentation))
        .route("/admin/votes/:vote_id/absence", patch(mark_absent))
        .route("/admin/votes/:vote_id", delete(delete_vote))
        .route("/admin/repair/vote-totals", post(repair_vote_totals))
        .route("/admin/repair/rollups", post(repair_rollups))
        .route_layer(middleware::from_fn_with_state(api_keys, require_auth))
}
