use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use catsync_core::{RecordOutcome, SyncMode, SyncStats};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

const TRIGGER_SOURCE: &str = "api";

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    product_id: i64,
    code: String,
    title: String,
    price: Decimal,
    asin: String,
    category: String,
    main_image: Option<String>,
    tags: Vec<String>,
    available: bool,
    enabled: bool,
    modified_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductQuery {
    pub available: Option<bool>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncResponse {
    sync_run_id: Uuid,
    stats: SyncStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<Vec<RecordOutcome>>,
}

/// GET /api/v1/products
pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rows = catsync_db::list_products(
        &state.pool,
        query.available.unwrap_or(false),
        normalize_limit(query.limit),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| ProductItem {
            product_id: row.id,
            code: row.code,
            title: row.title,
            price: row.price,
            asin: row.asin,
            category: row.category,
            main_image: row.main_image,
            tags: row.tags,
            available: row.available,
            enabled: row.enabled,
            modified_at: row.modified_at,
        })
        .collect();

    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PUT /api/v1/products: the body is the complete feed; products missing
/// from it are marked unavailable.
pub(super) async fn replace_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<SyncResponse>>), ApiError> {
    run_sync(&state, req_id, &body, SyncMode::Full).await
}

/// POST /api/v1/products: inserts and updates only, echoing every record's
/// outcome.
pub(super) async fn upsert_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<SyncResponse>>), ApiError> {
    run_sync(&state, req_id, &body, SyncMode::UpsertOnly).await
}

async fn run_sync(
    state: &AppState,
    req_id: RequestId,
    body: &[u8],
    mode: SyncMode,
) -> Result<(StatusCode, Json<ApiResponse<SyncResponse>>), ApiError> {
    let feed = catsync_core::parse_feed(body).map_err(|e| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            format!("feed is not valid JSON: {e}"),
        )
    })?;

    let _guard = state.sync_lock.lock().await;
    tracing::info!(request_id = %req_id.0, %mode, records = feed.len(), "feed received");

    let logged = catsync_db::reconcile_with_run_log(&state.pool, &feed, mode, TRIGGER_SOURCE)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let results = match mode {
        SyncMode::Full => None,
        SyncMode::UpsertOnly => Some(logged.report.outcomes),
    };

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: SyncResponse {
                sync_run_id: logged.run.public_id,
                stats: logged.report.stats,
                results,
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}
