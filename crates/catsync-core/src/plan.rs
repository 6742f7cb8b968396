//! The diff engine: compares a feed against a catalog snapshot and produces a
//! [`ReconcilePlan`] that either renderer can carry out.
//!
//! Planning is pure. It never touches the store; the live renderer in
//! `catsync-db` and the script renderer in [`crate::script`] consume the same
//! plan.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::feed::record_code;
use crate::index::{CatalogIndex, CatalogSnapshot, CategoryRef, IndexedProduct, StoredProduct};
use crate::normalize::{normalize_record, NormalizedRecord, Rejection};
use crate::stats::SyncStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Upserts every record and demotes stored products missing from the feed.
    Full,
    /// Upserts every record; products missing from the feed are left alone.
    UpsertOnly,
}

impl SyncMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::Full => "full",
            SyncMode::UpsertOnly => "upsert_only",
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductAction {
    Insert,
    Update,
    /// The stored product was disabled; every field is rewritten and it is
    /// enabled and available again.
    Reactivate,
    Unchanged,
}

impl ProductAction {
    /// Whether the product row, its detail and its tags are written.
    #[must_use]
    pub fn writes(self) -> bool {
        !matches!(self, ProductAction::Unchanged)
    }

    /// What writing `incoming` does to a product currently in state `current`.
    #[must_use]
    pub fn derive(current: Option<&IndexedProduct>, incoming: &IndexedProduct) -> Self {
        match current {
            None => ProductAction::Insert,
            Some(existing) if !existing.enabled => ProductAction::Reactivate,
            Some(existing) if existing.differs_from(incoming) => ProductAction::Update,
            Some(_) => ProductAction::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDecision {
    pub position: usize,
    pub action: ProductAction,
    pub category: CategoryRef,
    pub record: NormalizedRecord,
    /// The product as it was in the snapshot, before any decision of this run.
    pub stored: Option<IndexedProduct>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Omission {
    pub position: usize,
    pub code: Option<String>,
    pub reason: Rejection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordDecision {
    Apply(ProductDecision),
    Omit(Omission),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub mode: SyncMode,
    /// Number of records in the feed.
    pub total: usize,
    /// Every usable `code` seen in the feed, including codes of records that
    /// were omitted for other reasons.
    pub feed_codes: BTreeSet<String>,
    /// Stored codes to demote to unavailable, taken from the pre-run snapshot.
    /// Always applied before any record decision.
    pub sweep: Vec<String>,
    /// One decision per feed record, in feed order.
    pub records: Vec<RecordDecision>,
}

impl ReconcilePlan {
    /// Counters the plan would produce if every write succeeds.
    #[must_use]
    pub fn planned_stats(&self) -> SyncStats {
        let mut stats = SyncStats::new(self.total);
        stats.marked_unavailable = self.sweep.len();
        for decision in &self.records {
            match decision {
                RecordDecision::Omit(_) => stats.omitted += 1,
                RecordDecision::Apply(d) => match d.action {
                    ProductAction::Insert => stats.inserted += 1,
                    ProductAction::Update => stats.updated += 1,
                    ProductAction::Reactivate => stats.marked_available += 1,
                    ProductAction::Unchanged => {}
                },
            }
        }
        stats
    }

    pub fn decisions(&self) -> impl Iterator<Item = &ProductDecision> {
        self.records.iter().filter_map(|r| match r {
            RecordDecision::Apply(d) => Some(d),
            RecordDecision::Omit(_) => None,
        })
    }
}

/// Plans a reconciliation of `feed` against `snapshot`.
///
/// Records are decided in feed order against an index that absorbs each
/// decision, so a repeated code is compared with the earlier record of the
/// same run and the last occurrence wins.
#[must_use]
pub fn plan_reconciliation(
    feed: &[Value],
    snapshot: &CatalogSnapshot,
    mode: SyncMode,
) -> ReconcilePlan {
    let feed_codes: BTreeSet<String> = feed.iter().filter_map(record_code).collect();

    let sweep = match mode {
        SyncMode::Full => snapshot
            .products
            .iter()
            .filter(|p| p.available && !feed_codes.contains(&p.code))
            .map(|p| p.code.clone())
            .collect(),
        SyncMode::UpsertOnly => Vec::new(),
    };

    let stored: HashMap<&str, &StoredProduct> = snapshot
        .products
        .iter()
        .map(|p| (p.code.as_str(), p))
        .collect();

    let mut index = CatalogIndex::build(snapshot);
    let records = feed
        .iter()
        .enumerate()
        .map(|(position, raw)| match normalize_record(raw) {
            Ok(record) => {
                let baseline = stored.get(record.code.as_str()).map(|p| IndexedProduct::from(*p));
                RecordDecision::Apply(decide(&mut index, position, record, baseline))
            }
            Err(reason) => {
                tracing::debug!(position, %reason, "record omitted");
                RecordDecision::Omit(Omission {
                    position,
                    code: record_code(raw),
                    reason,
                })
            }
        })
        .collect();

    ReconcilePlan {
        mode,
        total: feed.len(),
        feed_codes,
        sweep,
        records,
    }
}

fn decide(
    index: &mut CatalogIndex,
    position: usize,
    record: NormalizedRecord,
    stored: Option<IndexedProduct>,
) -> ProductDecision {
    let category = index.resolve_category(&record.category);
    let current = index.product(&record.code);
    let id = current.and_then(|p| p.id);
    let incoming = IndexedProduct::from_record(&record, id, category.clone());
    let action = ProductAction::derive(current, &incoming);

    tracing::debug!(position, code = %record.code, ?action, "record decided");

    index.record_product(record.code.clone(), incoming);

    ProductDecision {
        position,
        action,
        category,
        record,
        stored,
    }
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
