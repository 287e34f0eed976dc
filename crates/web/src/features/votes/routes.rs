use axum::{
    Router,
    routing::{get, post},
};

use super::handlers::{get_my_vote, submit_vote};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/presentations/:presentation_id/votes", post(submit_vote))
        .route("/presentations/:presentation_id/votes/me", get(get_my_vote))
}
