pub mod app_config;
pub mod config;
pub mod feed;
pub mod index;
pub mod normalize;
pub mod plan;
pub mod script;
pub mod stats;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env, log_level_from_env};
pub use feed::{feed_records, parse_feed, record_code};
pub use index::{CatalogIndex, CatalogSnapshot, CategoryRef, IndexedProduct, StoredCategory, StoredProduct};
pub use normalize::{normalize_record, normalize_tags, NormalizedRecord, Rejection};
pub use plan::{
    plan_reconciliation, Omission, ProductAction, ProductDecision, ReconcilePlan,
    RecordDecision, SyncMode,
};
pub use script::{render_feed_script, render_script};
pub use stats::{OutcomeKind, RecordOutcome, SyncReport, SyncStats};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
