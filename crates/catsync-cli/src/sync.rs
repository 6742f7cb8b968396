//! `sync` command: live reconciliation of a feed file.

use std::path::Path;

use anyhow::Context;
use catsync_core::{plan_reconciliation, SyncMode};
use serde_json::Value;

const TRIGGER_SOURCE: &str = "cli";

/// Reads and parses a feed file.
pub(crate) fn read_feed(path: &Path) -> anyhow::Result<Vec<Value>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read feed {}", path.display()))?;
    catsync_core::parse_feed(&bytes)
        .with_context(|| format!("feed {} is not valid JSON", path.display()))
}

/// Applies the feed and prints the run's statistics as JSON.
pub(crate) async fn run_sync(pool: &sqlx::PgPool, path: &Path, mode: SyncMode) -> anyhow::Result<()> {
    let feed = read_feed(path)?;
    tracing::info!(feed = %path.display(), records = feed.len(), %mode, "starting sync");

    let logged = catsync_db::reconcile_with_run_log(pool, &feed, mode, TRIGGER_SOURCE)
        .await
        .context("sync failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "syncRunId": logged.run.public_id,
            "stats": logged.report.stats,
        }))?
    );
    Ok(())
}

/// Plans the feed against the current catalog and prints the planned
/// statistics without writing anything.
pub(crate) async fn run_dry_run(
    pool: &sqlx::PgPool,
    path: &Path,
    mode: SyncMode,
) -> anyhow::Result<()> {
    let feed = read_feed(path)?;
    let snapshot = catsync_db::load_catalog_snapshot(pool).await?;
    let plan = plan_reconciliation(&feed, &snapshot, mode);

    for code in &plan.sweep {
        tracing::info!(code, "would mark unavailable");
    }
    let stats = plan.planned_stats();
    tracing::info!(
        inserted = stats.inserted,
        updated = stats.updated,
        omitted = stats.omitted,
        planned_writes = stats.written(),
        "dry run complete; nothing written"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "dryRun": true,
            "stats": stats,
        }))?
    );
    Ok(())
}
