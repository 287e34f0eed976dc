//! Idempotent backfill passes that bring stored totals and rollups back in
//! line with their canonical derivation.
//!
//! Run `repair_vote_totals` to completion before `repair_presentation_rollups`:
//! the rollup pass trusts `total_score` as already corrected.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CategoryRegistry, VoteRecord};
use crate::services::aggregator::compute_rollup;
use crate::services::normalizer::{in_scale, raw_sum};
use crate::store::{BatchWrite, DEFAULT_MAX_BATCH_WRITES, VoteStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepairOptions {
    /// Writes per commit, capped by the store's own ceiling
    pub batch_size: usize,
    /// Largest accepted gap between stored total and raw sum
    pub tolerance: Decimal,
    pub dry_run: bool,
}

impl Default for RepairOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_MAX_BATCH_WRITES,
            tolerance: Decimal::ONE,
            dry_run: false,
        }
    }
}

impl RepairOptions {
    fn effective_batch_size(&self, store: &dyn VoteStore) -> usize {
        self.batch_size.clamp(1, store.max_batch_writes().max(1))
    }
}

/// Drift between a stored total and the raw sum of its ratings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyWarning {
    pub vote_id: Uuid,
    pub stored_total: Decimal,
    pub canonical_total: Decimal,
    /// The stored value is what the old weighted formula would produce
    pub matches_weighted_formula: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VoteRepairReport {
    pub scanned: usize,
    pub fixed: usize,
    pub skipped: usize,
    pub batches: Vec<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RollupRepairReport {
    pub scanned: usize,
    pub rewritten: usize,
    pub changed: usize,
    pub batches: Vec<usize>,
    pub dry_run: bool,
}

/// Compares a judge vote's stored total with the raw sum of its ratings.
///
/// Votes without ratings have nothing to check. A gap of exactly
/// `tolerance` is accepted.
pub fn check_vote_total(
    vote: &VoteRecord,
    tolerance: Decimal,
    registry: &CategoryRegistry,
) -> Option<ConsistencyWarning> {
    if !vote.is_judge() || vote.ratings.is_empty() {
        return None;
    }

    let canonical_total = raw_sum(&vote.ratings);
    if (vote.total_score - canonical_total).abs() <= tolerance {
        return None;
    }

    let weighted = registry.weighted_total(&vote.ratings);
    Some(ConsistencyWarning {
        vote_id: vote.vote_id,
        stored_total: vote.total_score,
        canonical_total,
        matches_weighted_formula: (vote.total_score - weighted).abs() < Decimal::new(1, 2),
    })
}

/// Targeted write for a drifted total. It only lands if the vote has not
/// been resubmitted since it was scanned.
fn correction(vote: &VoteRecord, warning: &ConsistencyWarning) -> BatchWrite {
    BatchWrite::CorrectTotal {
        vote_id: vote.vote_id,
        expected_total: vote.total_score,
        expected_revision: vote.revision(),
        total_score: warning.canonical_total,
        original_total_score: warning.stored_total,
    }
}

#[derive(Debug, Default)]
struct BatchTally {
    batches: Vec<usize>,
    applied: usize,
    stale: Vec<Uuid>,
}

struct BatchWriter<'a> {
    store: &'a dyn VoteStore,
    batch_size: usize,
    dry_run: bool,
    pending: Vec<BatchWrite>,
    tally: BatchTally,
}

impl<'a> BatchWriter<'a> {
    fn new(store: &'a dyn VoteStore, batch_size: usize, dry_run: bool) -> Self {
        Self {
            store,
            batch_size,
            dry_run,
            pending: Vec::with_capacity(batch_size),
            tally: BatchTally::default(),
        }
    }

    async fn push(&mut self, write: BatchWrite) -> Result<()> {
        self.pending.push(write);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let writes = std::mem::take(&mut self.pending);
        let size = writes.len();

        if self.dry_run {
            tracing::info!("Dry run: would commit batch of {} writes", size);
            return Ok(());
        }

        let receipt = match self.store.commit_batch(writes).await {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::error!(
                    "Batch of {} writes failed after {} committed batches: {}",
                    size,
                    self.tally.batches.len(),
                    e
                );
                return Err(e);
            }
        };

        self.tally.batches.push(size);
        self.tally.applied += receipt.applied;
        for vote_id in &receipt.stale {
            tracing::warn!(%vote_id, "Vote changed since it was scanned, leaving it alone");
        }
        self.tally.stale.extend(receipt.stale);
        tracing::info!(
            "Committed batch {} ({} writes)",
            self.tally.batches.len(),
            size
        );
        Ok(())
    }

    async fn finish(mut self) -> Result<BatchTally> {
        self.flush().await?;
        Ok(self.tally)
    }
}

/// Rewrites every judge vote whose stored total drifted from the raw sum.
///
/// Corrections are committed in batches. A failed commit stops the run;
/// batches already committed stay, and rerunning picks up the remainder.
pub async fn repair_vote_totals(
    store: &dyn VoteStore,
    options: &RepairOptions,
) -> Result<VoteRepairReport> {
    let registry = store.load_registry().await?;
    let votes = store.list_votes().await?;
    let batch_size = options.effective_batch_size(store);

    tracing::info!(
        "Scanning {} votes for total drift (tolerance {}, batch size {})",
        votes.len(),
        options.tolerance,
        batch_size
    );

    let mut report = VoteRepairReport {
        dry_run: options.dry_run,
        ..VoteRepairReport::default()
    };
    let mut writer = BatchWriter::new(store, batch_size, options.dry_run);
    let mut candidates = 0;

    for vote in votes {
        report.scanned += 1;

        if let Some(bad) = vote.ratings.iter().find(|r| !in_scale(r.score)) {
            report.skipped += 1;
            tracing::warn!(
                vote_id = %vote.vote_id,
                category_id = %bad.category_id,
                score = bad.score,
                "Skipping vote with out-of-scale rating"
            );
            continue;
        }

        let Some(warning) = check_vote_total(&vote, options.tolerance, &registry) else {
            continue;
        };

        tracing::warn!(
            vote_id = %warning.vote_id,
            old_total = %warning.stored_total,
            new_total = %warning.canonical_total,
            weighted_formula = warning.matches_weighted_formula,
            "Correcting vote total"
        );

        candidates += 1;
        writer.push(correction(&vote, &warning)).await?;
    }

    let tally = writer.finish().await?;
    report.fixed = if options.dry_run { candidates } else { tally.applied };
    report.skipped += tally.stale.len();
    report.batches = tally.batches;

    tracing::info!(
        "Vote total repair done: {} scanned, {} fixed, {} skipped",
        report.scanned,
        report.fixed,
        report.skipped
    );

    Ok(report)
}

/// Rebuilds every presentation rollup from its votes and overwrites it.
pub async fn repair_presentation_rollups(
    store: &dyn VoteStore,
    options: &RepairOptions,
) -> Result<RollupRepairReport> {
    let presentations = store.list_presentations().await?;
    let batch_size = options.effective_batch_size(store);

    tracing::info!("Rebuilding rollups for {} presentations", presentations.len());

    let mut report = RollupRepairReport {
        dry_run: options.dry_run,
        ..RollupRepairReport::default()
    };
    let mut writer = BatchWriter::new(store, batch_size, options.dry_run);

    for presentation in presentations {
        report.scanned += 1;

        let votes = store
            .list_votes_for_presentation(presentation.presentation_id)
            .await?;

        let mut rollup = compute_rollup(&votes);
        rollup.fixed_by_script = true;
        rollup.recomputed_at = Some(Utc::now());

        if !rollup.same_figures(&presentation.rollup) {
            report.changed += 1;
            tracing::warn!(
                presentation_id = %presentation.presentation_id,
                old_judge_total = %presentation.rollup.judge_total,
                new_judge_total = %rollup.judge_total,
                old_likes = presentation.rollup.spectator_likes,
                new_likes = rollup.spectator_likes,
                "Correcting presentation rollup"
            );
        }

        report.rewritten += 1;
        writer
            .push(BatchWrite::Rollup {
                presentation_id: presentation.presentation_id,
                rollup,
            })
            .await?;
    }

    report.batches = writer.finish().await?.batches;

    tracing::info!(
        "Rollup repair done: {} scanned, {} rewritten, {} changed",
        report.scanned,
        report.rewritten,
        report.changed
    );

    Ok(report)
}

/// Vote totals first, then rollups.
pub async fn repair_all(
    store: &dyn VoteStore,
    options: &RepairOptions,
) -> Result<(VoteRepairReport, RollupRepairReport)> {
    let votes = repair_vote_totals(store, options).await?;
    let rollups = repair_presentation_rollups(store, options).await?;
    Ok((votes, rollups))
}
