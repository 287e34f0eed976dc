use axum::Router;

use crate::middleware::auth::ApiKeys;
use crate::state::AppState;

pub mod admin;
pub mod audit;
pub mod categories;
pub mod presentations;
pub mod votes;

/// Every `/api` route, with state applied.
pub fn router(state: AppState, api_keys: ApiKeys) -> Router {
    let api = Router::new()
        .merge(categories::routes::routes())
        .merge(presentations::routes::routes())
        .merge(votes::routes::routes())
        .merge(audit::routes::routes())
        .merge(admin::routes::routes(api_keys));

    Router::new().nest("/api", api).with_state(state)
}
