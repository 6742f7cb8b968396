use axum::{
    extract::{Query, State},
    Extension, Json,
};
use catsync_core::SyncStats;
use catsync_db::SyncRunRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SyncRunsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncRunItem {
    sync_run_id: Uuid,
    mode: String,
    trigger_source: String,
    status: String,
    stats: SyncStats,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<SyncRunRow> for SyncRunItem {
    fn from(row: SyncRunRow) -> Self {
        // Counters are written from usize and never negative.
        let count = |v: i32| usize::try_from(v).unwrap_or(0);
        Self {
            sync_run_id: row.public_id,
            mode: row.mode,
            trigger_source: row.trigger_source,
            status: row.status,
            stats: SyncStats {
                total: count(row.total),
                inserted: count(row.inserted),
                updated: count(row.updated),
                omitted: count(row.omitted),
                marked_unavailable: count(row.marked_unavailable),
                marked_available: count(row.marked_available),
            },
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

/// GET /api/v1/sync-runs
pub(super) async fn list_sync_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<SyncRunsQuery>,
) -> Result<Json<ApiResponse<Vec<SyncRunItem>>>, ApiError> {
    let rows = catsync_db::list_sync_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(SyncRunItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
