use clap::{Parser, Subcommand};
use repair::{JsonFileSource, LegacyImporter, LegacyValidator, LegacyVoteSource};
use rust_decimal::Decimal;
use std::path::PathBuf;
use storage::{
    Database, VoteStore,
    models::VoteRole,
    services::{
        audit::{self, AuditFilter, ExportFormat},
        repair::{self as passes, RepairOptions, RollupRepairReport, VoteRepairReport},
    },
    store::DEFAULT_MAX_BATCH_WRITES,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "vote-repair")]
#[command(about = "Presentation vote repair, export and legacy import", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(clap::Args)]
struct PassArgs {
    /// Writes per committed batch
    #[arg(long, env = "REPAIR_BATCH_SIZE", default_value_t = DEFAULT_MAX_BATCH_WRITES)]
    batch_size: usize,

    /// Largest accepted gap between a stored total and its ratings
    #[arg(long, env = "REPAIR_TOLERANCE", default_value = "1")]
    tolerance: Decimal,

    /// Report what would change without writing
    #[arg(long)]
    dry_run: bool,
}

impl PassArgs {
    fn options(&self) -> RepairOptions {
        RepairOptions {
            batch_size: self.batch_size,
            tolerance: self.tolerance.abs(),
            dry_run: self.dry_run,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile judge vote totals with the raw sum of their ratings
    VoteTotals {
        #[command(flatten)]
        pass: PassArgs,
    },
    /// Rebuild every presentation rollup from its votes
    Rollups {
        #[command(flatten)]
        pass: PassArgs,
    },
    /// Vote totals, then rollups
    All {
        #[command(flatten)]
        pass: PassArgs,
    },
    /// Export votes with their history
    Export {
        #[arg(long, value_parser = parse_format, default_value = "json")]
        format: ExportFormat,

        #[arg(long)]
        presentation_id: Option<Uuid>,

        #[arg(long)]
        user_id: Option<String>,

        #[arg(long, value_parser = parse_role)]
        role: Option<VoteRole>,

        /// Defaults to stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load vote documents exported by the previous backend
    ImportLegacy {
        file: PathBuf,

        #[arg(long)]
        validate_only: bool,
    },
}

fn parse_format(value: &str) -> Result<ExportFormat, String> {
    value.parse().map_err(|e: storage::StorageError| e.to_string())
}

fn parse_role(value: &str) -> Result<VoteRole, String> {
    value.parse().map_err(|e: storage::StorageError| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "vote_repair={},repair={},storage={}",
                    log_level, log_level, log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Connecting to database...");
    let db = Database::new(&cli.database_url).await?;
    db.run_migrations().await?;

    match cli.command {
        Commands::VoteTotals { pass } => {
            let report = passes::repair_vote_totals(&db, &pass.options()).await?;
            log_vote_report(&report);
        }
        Commands::Rollups { pass } => {
            let report = passes::repair_presentation_rollups(&db, &pass.options()).await?;
            log_rollup_report(&report);
        }
        Commands::All { pass } => {
            let (votes, rollups) = passes::repair_all(&db, &pass.options()).await?;
            log_vote_report(&votes);
            log_rollup_report(&rollups);
        }
        Commands::Export {
            format,
            presentation_id,
            user_id,
            role,
            output,
        } => {
            let filter = AuditFilter {
                presentation_id,
                user_id,
                role,
            };
            handle_export(&db, format, &filter, output).await?;
        }
        Commands::ImportLegacy {
            file,
            validate_only,
        } => {
            handle_legacy_import(&db, &JsonFileSource::new(file), validate_only).await?;
        }
    }

    Ok(())
}

fn log_vote_report(report: &VoteRepairReport) {
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    tracing::info!(
        "{}Vote totals: {} scanned, {} fixed, {} skipped",
        prefix,
        report.scanned,
        report.fixed,
        report.skipped
    );
    for (idx, size) in report.batches.iter().enumerate() {
        tracing::info!("  batch {}: {} writes", idx + 1, size);
    }
}

fn log_rollup_report(report: &RollupRepairReport) {
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    tracing::info!(
        "{}Rollups: {} scanned, {} rewritten, {} changed",
        prefix,
        report.scanned,
        report.rewritten,
        report.changed
    );
    for (idx, size) in report.batches.iter().enumerate() {
        tracing::info!("  batch {}: {} writes", idx + 1, size);
    }
}

async fn handle_export(
    store: &dyn VoteStore,
    format: ExportFormat,
    filter: &AuditFilter,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = audit::export_audit(store, format, filter).await?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, &bytes).await?;
            tracing::info!("Exported {} bytes to: {}", bytes.len(), path.display());
        }
        None => {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

async fn handle_legacy_import(
    store: &dyn VoteStore,
    source: &dyn LegacyVoteSource,
    validate_only: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Loading legacy votes from: {}", source.describe());
    let export = source.load().await?;
    tracing::info!(
        "Loaded {} vote(s) (format v{})",
        export.votes.len(),
        export.format_version
    );

    tracing::info!("Validating legacy export...");
    let registry = store.load_registry().await?;
    let validation_report = LegacyValidator::validate(&export, &registry)?;
    validation_report.log_warnings();
    tracing::info!(
        "✓ Validation successful ({} warning(s))",
        validation_report.warnings.len()
    );

    if validate_only {
        return Ok(());
    }

    let summary = LegacyImporter::new(store).import(export).await?;
    tracing::info!(
        "✓ Import completed: {} inserted, {} already present, {} presentation(s) created, {} rollup(s) recomputed",
        summary.inserted,
        summary.already_present,
        summary.presentations_created,
        summary.rollups_recomputed
    );
    tracing::info!("Run `vote-repair all` to reconcile imported totals");

    Ok(())
}
