mod products;
mod sync_runs;

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Held for the whole of a reconciliation so two feeds never interleave.
    pub sync_lock: Arc<Mutex<()>>,
    pub max_feed_bytes: usize,
}

impl AppState {
    #[must_use]
    pub fn new(pool: PgPool, max_feed_bytes: usize) -> Self {
        Self {
            pool,
            sync_lock: Arc::new(Mutex::new(())),
            max_feed_bytes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(100).clamp(1, 500)
}

pub(super) fn map_db_error(request_id: String, error: &catsync_db::DbError) -> ApiError {
    tracing::error!(error = %error, "database operation failed");
    ApiError::new(request_id, "internal_error", "database operation failed")
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(
    auth: AuthState,
    rate_limit: RateLimitState,
    max_feed_bytes: usize,
) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/products",
            get(products::list_products)
                .put(products::replace_products)
                .post(products::upsert_products),
        )
        .route("/api/v1/sync-runs", get(sync_runs::list_sync_runs))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                ))
                .layer(DefaultBodyLimit::max(max_feed_bytes)),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));
    let max_feed_bytes = state.max_feed_bytes;

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit, max_feed_bytes))
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match catsync_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const TEST_FEED_LIMIT: usize = 64 * 1024;

    fn dev_app(pool: PgPool) -> Router {
        let auth = AuthState::from_keys("", true).expect("auth");
        build_app(
            AppState::new(pool, TEST_FEED_LIMIT),
            auth,
            default_rate_limit_state(),
        )
    }

    fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&body).expect("json parse")
    }

    fn widget_feed() -> Value {
        json!([{"title": "Widget", "price": 9.99, "code": "W1", "category": "Tools", "tags": "a, B , a"}])
    }

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 100);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(10_000)), 500);
        assert_eq!(normalize_limit(Some(25)), 25);
    }

    #[test]
    fn api_error_validation_error_maps_to_bad_request() {
        let response = ApiError::new("req-1", "validation_error", "invalid input").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn api_error_unknown_code_maps_to_internal_error() {
        let response = ApiError::new("req-1", "internal_error", "boom").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn health_reports_ok_with_database(pool: PgPool) {
        let response = dev_app(pool)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .header("x-request-id", "req-health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-request-id").map(|v| v.as_bytes()),
            Some(&b"req-health"[..])
        );
        let json = body_json(response).await;
        assert_eq!(json["data"]["database"], "ok");
        assert_eq!(json["meta"]["request_id"], "req-health");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn put_products_reconciles_full_feed(pool: PgPool) {
        let app = dev_app(pool.clone());
        let response = app
            .clone()
            .oneshot(json_request(Method::PUT, "/api/v1/products", &widget_feed()))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["stats"]["inserted"], 1);
        assert_eq!(json["data"]["stats"]["markedUnavailable"], 0);
        assert!(json["data"].get("results").is_none());

        let response = app
            .oneshot(json_request(Method::PUT, "/api/v1/products", &json!([])))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["stats"]["markedUnavailable"], 1);

        let available: bool =
            sqlx::query_scalar("SELECT available FROM products WHERE code = 'W1'")
                .fetch_one(&pool)
                .await
                .expect("available flag");
        assert!(!available);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn post_products_upserts_and_echoes_results(pool: PgPool) {
        let feed = json!([
            {"title": "Widget", "price": 9.99, "code": "W1", "category": "Tools"},
            {"title": "No price", "code": "W2", "category": "Tools"}
        ]);
        let response = dev_app(pool)
            .oneshot(json_request(Method::POST, "/api/v1/products", &feed))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["stats"]["inserted"], 1);
        assert_eq!(json["data"]["stats"]["omitted"], 1);
        let results = json["data"]["results"].as_array().expect("results array");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["outcome"], "inserted");
        assert_eq!(results[1]["outcome"], "omitted");
        assert_eq!(results[1]["code"], "W2");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn single_object_body_is_a_one_record_feed(pool: PgPool) {
        let record = json!({"title": "Widget", "price": "9.99", "code": "W1", "category": "Tools"});
        let response = dev_app(pool)
            .oneshot(json_request(Method::POST, "/api/v1/products", &record))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["data"]["stats"]["total"], 1);
        assert_eq!(json["data"]["stats"]["inserted"], 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn malformed_body_is_a_validation_error(pool: PgPool) {
        let response = dev_app(pool)
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/v1/products")
                    .body(Body::from("[{\"code\": "))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn oversized_feed_is_rejected(pool: PgPool) {
        let filler = "x".repeat(TEST_FEED_LIMIT + 1);
        let feed = json!([{"title": filler, "price": 1, "code": "BIG", "category": "Tools"}]);
        let response = dev_app(pool)
            .oneshot(json_request(Method::PUT, "/api/v1/products", &feed))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn list_products_returns_reconciled_rows(pool: PgPool) {
        let app = dev_app(pool);
        app.clone()
            .oneshot(json_request(Method::PUT, "/api/v1/products", &widget_feed()))
            .await
            .expect("seed response");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/products?limit=5")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["code"], "W1");
        assert_eq!(data[0]["category"], "Tools");
        assert_eq!(data[0]["price"], "9.99");
        assert_eq!(data[0]["tags"], json!(["a", "b"]));
        assert_eq!(data[0]["available"], true);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn sync_runs_lists_logged_runs(pool: PgPool) {
        let app = dev_app(pool);
        app.clone()
            .oneshot(json_request(Method::PUT, "/api/v1/products", &widget_feed()))
            .await
            .expect("seed response");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/sync-runs")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let data = json["data"].as_array().expect("data array");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["mode"], "full");
        assert_eq!(data[0]["trigger_source"], "api");
        assert_eq!(data[0]["status"], "succeeded");
        assert_eq!(data[0]["stats"]["inserted"], 1);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn protected_routes_require_bearer_token_when_enabled(pool: PgPool) {
        let auth = AuthState::from_keys("secret", false).expect("auth");
        let app = build_app(
            AppState::new(pool, TEST_FEED_LIMIT),
            auth,
            default_rate_limit_state(),
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/products")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/products")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK, "health stays public");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn rate_limit_rejects_requests_over_the_window(pool: PgPool) {
        let auth = AuthState::from_keys("", true).expect("auth");
        let app = build_app(
            AppState::new(pool, TEST_FEED_LIMIT),
            auth,
            RateLimitState::new(1, Duration::from_secs(60)),
        );

        let request = || {
            Request::builder()
                .uri("/api/v1/sync-runs")
                .body(Body::empty())
                .expect("request")
        };
        let first = app.clone().oneshot(request()).await.expect("response");
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.oneshot(request()).await.expect("response");
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
