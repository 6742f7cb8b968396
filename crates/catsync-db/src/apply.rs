//! Live renderer: applies a [`ReconcilePlan`] to Postgres as immediate writes.
//!
//! There is no run-wide transaction. Every write is idempotent on its own, so
//! an interrupted run leaves a processed prefix behind and re-running the same
//! feed converges.

use std::collections::{HashMap, HashSet};

use catsync_core::{
    plan_reconciliation, CategoryRef, IndexedProduct, OutcomeKind, ProductAction,
    ProductDecision, ReconcilePlan, RecordDecision, RecordOutcome, Rejection, SyncMode,
    SyncReport, SyncStats,
};
use serde_json::Value;
use sqlx::PgPool;

use crate::catalog::load_catalog_snapshot;
use crate::resolver::{link_product_tag, mark_unavailable, upsert_main_image, upsert_product, Resolver};
use crate::sync_runs::{complete_sync_run, create_sync_run, fail_sync_run, get_sync_run, SyncRunRow};
use crate::DbError;

/// A finished, logged run: its final `sync_runs` row and what it did.
#[derive(Debug, Clone)]
pub struct LoggedRun {
    pub run: SyncRunRow,
    pub report: SyncReport,
}

/// Applies every decision in `plan` and returns the statistics actually
/// observed while writing.
///
/// The availability sweep runs first. Records whose category the store
/// refuses to create are omitted; a refused tag only drops that association.
///
/// The plan assumes every earlier decision on a code was written. After an
/// omission that assumption fails, so later records with that code are
/// re-decided against what the store actually holds.
///
/// # Errors
///
/// Returns [`DbError`] on any store failure other than a category or tag
/// rejection. Writes made before the failure stay applied.
pub async fn apply_plan(pool: &PgPool, plan: &ReconcilePlan) -> Result<SyncReport, DbError> {
    let mut outcomes = Vec::with_capacity(plan.records.len());
    let mut applier = Applier {
        pool,
        resolver: Resolver::new(),
        stats: SyncStats::new(plan.total),
        written: HashMap::new(),
        unwritten: HashSet::new(),
    };

    for code in &plan.sweep {
        if mark_unavailable(pool, code).await? {
            applier.stats.marked_unavailable += 1;
        }
    }

    for decision in &plan.records {
        let outcome = match decision {
            RecordDecision::Omit(omission) => {
                tracing::warn!(
                    position = omission.position,
                    code = omission.code.as_deref().unwrap_or(""),
                    reason = %omission.reason,
                    "feed record omitted"
                );
                applier.stats.omitted += 1;
                RecordOutcome::omitted(
                    omission.position,
                    omission.code.clone(),
                    omission.reason.to_string(),
                )
            }
            RecordDecision::Apply(product) => applier.apply(product).await?,
        };
        outcomes.push(outcome);
    }

    let stats = applier.stats;
    tracing::info!(
        mode = %plan.mode,
        total = stats.total,
        inserted = stats.inserted,
        updated = stats.updated,
        omitted = stats.omitted,
        marked_unavailable = stats.marked_unavailable,
        marked_available = stats.marked_available,
        written = stats.written(),
        "reconciliation applied"
    );

    Ok(SyncReport { stats, outcomes })
}

struct Applier<'a> {
    pool: &'a PgPool,
    resolver: Resolver,
    stats: SyncStats,
    /// State of every product written so far in this run.
    written: HashMap<String, IndexedProduct>,
    /// Codes whose last record was omitted before its product was written.
    unwritten: HashSet<String>,
}

impl Applier<'_> {
    async fn apply(&mut self, decision: &ProductDecision) -> Result<RecordOutcome, DbError> {
        let record = &decision.record;
        let redo = self.unwritten.contains(&record.code);

        if !redo && !decision.action.writes() {
            return Ok(unchanged(decision));
        }

        let category_id = match self.resolver.category_id(self.pool, &decision.category).await {
            Ok(id) => id,
            Err(err) if err.is_rejection() => {
                let reason = Rejection::CategoryRejected(record.category.clone());
                tracing::warn!(
                    position = decision.position,
                    code = %record.code,
                    error = %err,
                    "category rejected by store; record omitted"
                );
                self.stats.omitted += 1;
                self.unwritten.insert(record.code.clone());
                return Ok(RecordOutcome::omitted(
                    decision.position,
                    Some(record.code.clone()),
                    reason.to_string(),
                ));
            }
            Err(err) => return Err(err),
        };

        let current = self
            .written
            .get(&record.code)
            .or(decision.stored.as_ref());
        let incoming = IndexedProduct::from_record(
            record,
            current.and_then(|p| p.id),
            CategoryRef::Stored(category_id),
        );
        let action = if redo {
            ProductAction::derive(current, &incoming)
        } else {
            decision.action
        };
        if !action.writes() {
            self.unwritten.remove(&record.code);
            return Ok(unchanged(decision));
        }

        let product_id = upsert_product(self.pool, record, category_id).await?;
        self.unwritten.remove(&record.code);
        self.written.insert(
            record.code.clone(),
            IndexedProduct {
                id: Some(product_id),
                ..incoming
            },
        );
        let outcome = match action {
            ProductAction::Insert => {
                self.stats.inserted += 1;
                OutcomeKind::Inserted
            }
            ProductAction::Update => {
                self.stats.updated += 1;
                OutcomeKind::Updated
            }
            ProductAction::Reactivate => {
                self.stats.marked_available += 1;
                OutcomeKind::Reactivated
            }
            ProductAction::Unchanged => OutcomeKind::Unchanged,
        };

        upsert_main_image(self.pool, product_id, &record.image).await?;

        for tag in &record.tags {
            let tag_id = match self.resolver.ensure_tag(self.pool, tag).await {
                Ok(id) => id,
                Err(err) if err.is_rejection() => {
                    tracing::warn!(code = %record.code, tag, error = %err, "tag rejected by store; skipped");
                    continue;
                }
                Err(err) => return Err(err),
            };
            link_product_tag(self.pool, product_id, tag_id).await?;
        }

        tracing::debug!(position = decision.position, code = %record.code, product_id, ?outcome, "record applied");

        Ok(RecordOutcome {
            position: decision.position,
            code: Some(record.code.clone()),
            outcome,
            product_id: Some(product_id),
            reason: None,
        })
    }
}

fn unchanged(decision: &ProductDecision) -> RecordOutcome {
    RecordOutcome {
        position: decision.position,
        code: Some(decision.record.code.clone()),
        outcome: OutcomeKind::Unchanged,
        product_id: None,
        reason: None,
    }
}

/// Plans `feed` against the current store and applies the plan.
///
/// # Errors
///
/// Returns [`DbError`] if the snapshot cannot be read or the plan cannot be
/// applied.
pub async fn reconcile(pool: &PgPool, feed: &[Value], mode: SyncMode) -> Result<SyncReport, DbError> {
    let snapshot = load_catalog_snapshot(pool).await?;
    tracing::debug!(
        categories = snapshot.categories.len(),
        products = snapshot.products.len(),
        "catalog snapshot loaded"
    );
    let plan = plan_reconciliation(feed, &snapshot, mode);
    apply_plan(pool, &plan).await
}

/// Same as [`reconcile`], bracketed by a `sync_runs` entry.
///
/// The run is created `running`, then completed with the statistics or failed
/// with the error message. A failure to record the failure is logged and the
/// original error is returned.
///
/// # Errors
///
/// Returns [`DbError`] if the run cannot be created or completed, or if the
/// reconciliation itself fails.
pub async fn reconcile_with_run_log(
    pool: &PgPool,
    feed: &[Value],
    mode: SyncMode,
    trigger_source: &str,
) -> Result<LoggedRun, DbError> {
    let run = create_sync_run(pool, mode, trigger_source).await?;
    tracing::info!(run_id = run.id, public_id = %run.public_id, %mode, trigger_source, "sync run started");

    let report = match reconcile(pool, feed, mode).await {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(run_id = run.id, error = %err, "sync run failed");
            fail_run_best_effort(pool, run.id, &err.to_string()).await;
            return Err(err);
        }
    };

    complete_sync_run(pool, run.id, &report.stats).await?;
    let run = get_sync_run(pool, run.id).await?;

    Ok(LoggedRun { run, report })
}

async fn fail_run_best_effort(pool: &PgPool, run_id: i64, message: &str) {
    if let Err(mark_err) = fail_sync_run(pool, run_id, message).await {
        tracing::error!(run_id, error = %mark_err, "failed to mark sync run as failed");
    }
}
