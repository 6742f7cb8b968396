use serde::{Deserialize, Serialize};

/// Aggregate counters for one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Number of records in the feed, valid or not.
    pub total: usize,
    pub inserted: usize,
    /// Enabled products whose reconciled fields actually changed.
    pub updated: usize,
    pub omitted: usize,
    pub marked_unavailable: usize,
    /// Disabled products brought back by the feed.
    pub marked_available: usize,
}

impl SyncStats {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Records that caused a product write.
    #[must_use]
    pub fn written(&self) -> usize {
        self.inserted + self.updated + self.marked_available
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Inserted,
    Updated,
    Reactivated,
    Unchanged,
    Omitted,
}

/// Per-record echo of what a run did. Optional output next to [`SyncStats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    /// Zero-based position of the record in the feed.
    pub position: usize,
    pub code: Option<String>,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RecordOutcome {
    #[must_use]
    pub fn omitted(position: usize, code: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            position,
            code,
            outcome: OutcomeKind::Omitted,
            product_id: None,
            reason: Some(reason.into()),
        }
    }
}

/// Result of applying a plan to the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub stats: SyncStats,
    pub outcomes: Vec<RecordOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_with_camel_case_keys() {
        let stats = SyncStats {
            total: 4,
            inserted: 1,
            updated: 1,
            omitted: 1,
            marked_unavailable: 2,
            marked_available: 1,
        };
        let json = serde_json::to_value(stats).expect("serialize stats");
        assert_eq!(json["markedUnavailable"], 2);
        assert_eq!(json["markedAvailable"], 1);
        assert_eq!(json["total"], 4);
    }

    #[test]
    fn written_counts_every_product_write() {
        let stats = SyncStats {
            inserted: 2,
            updated: 3,
            marked_available: 1,
            ..SyncStats::new(10)
        };
        assert_eq!(stats.written(), 6);
    }

    #[test]
    fn omitted_outcome_skips_product_id_when_serialized() {
        let outcome = RecordOutcome::omitted(2, None, "missing required field 'price'");
        let json = serde_json::to_value(&outcome).expect("serialize outcome");
        assert_eq!(json["outcome"], "omitted");
        assert!(json.get("product_id").is_none());
        assert_eq!(json["reason"], "missing required field 'price'");
    }
}
