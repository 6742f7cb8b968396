//! Offline tests for catsync-db pool configuration and row types.
//! These tests do not require a live database connection.

use catsync_core::{AppConfig, Environment, StoredCategory, StoredProduct};
use catsync_db::{CategoryRow, DbError, PoolConfig, ProductRow, SyncRunRow};
use rust_decimal::Decimal;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        max_feed_bytes: 1024,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn product_row_converts_into_stored_product() {
    let row = ProductRow {
        id: 42,
        code: "W1".to_string(),
        title: "Widget".to_string(),
        price: Decimal::new(999, 2),
        asin: String::new(),
        category_id: 3,
        available: false,
        enabled: true,
    };

    let stored = StoredProduct::from(row);
    assert_eq!(stored.id, 42);
    assert_eq!(stored.code, "W1");
    assert_eq!(stored.price, Decimal::new(999, 2));
    assert_eq!(stored.category_id, 3);
    assert!(!stored.available);
    assert!(stored.enabled);
}

#[test]
fn category_row_converts_into_stored_category() {
    let stored = StoredCategory::from(CategoryRow {
        id: 3,
        name: "Tools".to_string(),
    });
    assert_eq!(stored.id, 3);
    assert_eq!(stored.name, "Tools");
}

/// Compile-time smoke test: confirm that [`SyncRunRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn sync_run_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = SyncRunRow {
        id: 1_i64,
        public_id: Uuid::new_v4(),
        mode: "full".to_string(),
        trigger_source: "cli".to_string(),
        status: "running".to_string(),
        total: 0_i32,
        inserted: 0,
        updated: 0,
        omitted: 0,
        marked_unavailable: 0,
        marked_available: 0,
        error_message: None,
        started_at: Utc::now(),
        completed_at: None,
    };

    assert_eq!(row.mode, "full");
    assert_eq!(row.status, "running");
    assert!(row.completed_at.is_none());
    assert!(row.error_message.is_none());
}

#[test]
fn invalid_transition_error_names_expected_status() {
    let err = DbError::InvalidSyncRunTransition {
        id: 7,
        expected_status: "running",
    };
    assert_eq!(err.to_string(), "sync run 7 is not in expected status 'running'");
}
