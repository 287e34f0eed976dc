use anyhow::Context;
use std::sync::Arc;
use storage::{Database, services::repair::RepairOptions};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod error;
mod features;
mod middleware;
mod state;

use config::Config;
use features::{admin, audit, categories, presentations, votes};
use middleware::auth::ApiKeys;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        categories::handlers::list_categories,
        presentations::handlers::list_presentations,
        presentations::handlers::get_presentation,
        presentations::handlers::get_rollup,
        presentations::handlers::get_presentation_audit,
        votes::handlers::submit_vote,
        votes::handlers::get_my_vote,
        audit::handlers::get_user_audit,
        audit::handlers::export_audit,
        admin::handlers::create_presentation,
        admin::handlers::mark_absent,
        admin::handlers::delete_vote,
        admin::handlers::repair_vote_totals,
        admin::handlers::repair_rollups,
    ),
    components(
        schemas(
            storage::dto::vote::SubmitVoteRequest,
            storage::dto::vote::SubmitVoteResponse,
            storage::dto::vote::MarkAbsentRequest,
            storage::dto::vote::RepairRequest,
            storage::dto::presentation::CreatePresentationRequest,
            storage::models::CategoryRegistry,
            storage::models::ScoringCategory,
            storage::models::SpectatorQuestion,
            storage::models::Presentation,
            storage::models::PresentationRollup,
            storage::models::VoteRecord,
            storage::models::VoteRole,
            storage::models::Rating,
            storage::models::QuestionAnswer,
            storage::models::HistoryEntry,
            storage::models::HistoryAction,
            storage::services::audit::VoteAudit,
            storage::services::audit::AuditEntry,
            storage::services::audit::AuditExport,
            storage::services::audit::AuditRecord,
            storage::services::audit::CategoryBreakdown,
            storage::services::audit::ExportFormat,
            storage::services::repair::VoteRepairReport,
            storage::services::repair::RollupRepairReport,
        )
    ),
    tags(
        (name = "categories", description = "Scoring criteria and spectator questions"),
        (name = "presentations", description = "Presentations and their rollups"),
        (name = "votes", description = "Casting and reading votes"),
        (name = "audit", description = "Vote history and exports"),
        (name = "admin", description = "Moderation and repair, API key required"),
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("API Key")
                        .build(),
                ),
            )
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting presentation voting API");

    let config = Config::from_env().context("Failed to load API configuration")?;
    tracing::info!("Configuration loaded successfully");

    tracing::info!(
        "Connecting to database at: {}",
        config
            .database_url
            .split('@')
            .next_back()
            .unwrap_or("unknown")
    );
    let db = Database::new(&config.database_url)
        .await
        .context("Failed to initialize database")?
        .with_max_batch_writes(config.max_batch_writes);
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations");
    db.run_migrations()
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database migrations completed successfully");

    let api_keys = ApiKeys::from_comma_separated(&config.api_keys);
    if api_keys.is_empty() {
        tracing::warn!("API_KEYS is empty, admin routes will reject every request");
    }

    let repair = RepairOptions {
        batch_size: config.max_batch_writes,
        tolerance: config.drift_tolerance,
        dry_run: false,
    };
    let state = AppState::new(Arc::new(db), repair);

    let app = features::router(state, api_keys)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

    let bind_address = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server at http://{}", bind_address);

    tracing::info!(
        "Swagger UI available at http://{}/swagger-ui/",
        bind_address
    );

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    axum::serve(listener, app).await?;

    Ok(())
}
