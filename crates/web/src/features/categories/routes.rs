use axum::{Router, routing::get};

use super::handlers::list_categories;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/categories", get(list_categories))
}
