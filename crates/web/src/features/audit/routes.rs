use axum::{Router, routing::get};

use super::handlers::{export_audit, get_user_audit};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/:user_id/audit", get(get_user_audit))
        .route("/audit/export", get(export_audit))
}
