// =============================================================================
// HANDLERS MODULE
// =============================================================================
// HTTP request handlers. Path ids arrive as strings and are parsed into
// their newtypes here, so a malformed id is a 400 INVALID_IDENTIFIER rather
// than a routing error. Every handler records request count and latency.
// =============================================================================

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use crate::error::AppResult;
use crate::ids::{ProductId, VariantId};
use crate::metrics;
use crate::models::*;
use crate::AppState;

/// Record one request against its route template.
fn observe<T>(method: &str, endpoint: &str, start: Instant, result: &AppResult<T>) {
    let status = match result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_and_code().0,
    };
    metrics::record_http_request(method, endpoint, status.as_u16(), start.elapsed().as_secs_f64());
}

// =============================================================================
// HEALTH CHECK ENDPOINTS
// =============================================================================

/// Liveness probe
///
/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "variant-service".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness probe: storage must answer; Redis only counts when configured.
///
/// GET /ready
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let storage = state.storage.health_check().await;
    let redis = state.cache.ping().await;

    let ready = storage && redis.unwrap_or(true);
    let response = ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks { storage, redis },
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

// =============================================================================
// METRICS ENDPOINT
// =============================================================================
/// Prometheus metrics endpoint
///
/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

// =============================================================================
// VARIANT ENDPOINTS
// =============================================================================

// -----------------------------------------------------------------------------
// GENERATE
// -----------------------------------------------------------------------------
/// Generate every compatible variant for a product
///
/// POST /api/v1/products/:product_id/variants/generate
///
/// # Response
/// - 201 Created: at least one variant was created
/// - 200 OK: everything already existed (`total_generated` is 0)
/// - 400: invalid selections or base data
/// - 409: rules leave nothing to generate, or SKUs ran out
pub async fn generate_variants(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
    Json(request): Json<GenerateVariantsRequest>,
) -> AppResult<(StatusCode, Json<GenerateVariantsResponse>)> {
    let start = Instant::now();
    let endpoint = "/api/v1/products/:product_id/variants/generate";

    let result = match product_id.parse::<ProductId>() {
        Ok(product_id) => state.variants.generate(product_id, request).await,
        Err(e) => Err(e),
    };

    let status = match &result {
        Ok(response) if response.total_generated > 0 => StatusCode::CREATED,
        Ok(_) => StatusCode::OK,
        Err(e) => e.status_and_code().0,
    };
    metrics::record_http_request("POST", endpoint, status.as_u16(), start.elapsed().as_secs_f64());

    result.map(|response| (status, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct ListVariantsParams {
    /// Include soft-deleted variants (default: false)
    #[serde(default)]
    pub include_deleted: bool,
}

/// List a product's variants in creation order
///
/// GET /api/v1/products/:product_id/variants?include_deleted=true
pub async fn list_variants(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
    Query(params): Query<ListVariantsParams>,
) -> AppResult<Json<Vec<VariantConfiguration>>> {
    let start = Instant::now();
    let result = async {
        let product_id: ProductId = product_id.parse()?;
        state.variants.list(product_id, params.include_deleted).await
    }
    .await;
    observe("GET", "/api/v1/products/:product_id/variants", start, &result);
    result.map(Json)
}

/// GET /api/v1/variants/:variant_id
pub async fn get_variant(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
) -> AppResult<Json<VariantConfiguration>> {
    let start = Instant::now();
    let result = async { state.variants.get(variant_id.parse()?).await }.await;
    observe("GET", "/api/v1/variants/:variant_id", start, &result);
    result.map(Json)
}

/// Explicit admin edit of price and/or status
///
/// PATCH /api/v1/variants/:variant_id
///
/// # Request Body
/// ```json
/// { "price": "1199.00", "status": "INACTIVE" }
/// ```
pub async fn update_variant(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(request): Json<UpdateVariantRequest>,
) -> AppResult<Json<VariantConfiguration>> {
    let start = Instant::now();
    let result = async { state.variants.update(variant_id.parse()?, request).await }.await;
    observe("PATCH", "/api/v1/variants/:variant_id", start, &result);
    result.map(Json)
}

/// Soft delete
///
/// DELETE /api/v1/variants/:variant_id
pub async fn delete_variant(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
) -> AppResult<Json<VariantConfiguration>> {
    let start = Instant::now();
    let result = async { state.variants.soft_delete(variant_id.parse()?).await }.await;
    observe("DELETE", "/api/v1/variants/:variant_id", start, &result);
    result.map(Json)
}

// =============================================================================
// INVENTORY ENDPOINTS
// =============================================================================

/// GET /api/v1/inventory/:variant_id
pub async fn get_inventory(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
) -> AppResult<Json<InventoryRecord>> {
    let start = Instant::now();
    let result = async { state.ledger.get(variant_id.parse()?).await }.await;
    observe("GET", "/api/v1/inventory/:variant_id", start, &result);
    result.map(Json)
}

// -----------------------------------------------------------------------------
// RESERVE STOCK
// -----------------------------------------------------------------------------
/// Reserve stock for an order
///
/// POST /api/v1/inventory/:variant_id/reserve
///
/// # Request Body
/// ```json
/// { "quantity": 2, "reference": "ORD-12345" }
/// ```
///
/// # Response
/// - 200 OK: updated inventory record
/// - 409 Conflict: insufficient available stock, or variant discontinued
/// - 404 Not Found: no inventory record for the variant
pub async fn reserve_stock(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(request): Json<StockQuantityRequest>,
) -> AppResult<Json<InventoryRecord>> {
    let start = Instant::now();
    let result = async {
        let variant_id: VariantId = variant_id.parse()?;
        state
            .ledger
            .reserve(variant_id, request.quantity, request.reference)
            .await
    }
    .await;
    observe("POST", "/api/v1/inventory/:variant_id/reserve", start, &result);
    result.map(Json)
}

/// Ship reserved stock (order fulfilled)
///
/// POST /api/v1/inventory/:variant_id/commit
pub async fn commit_stock(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(request): Json<StockQuantityRequest>,
) -> AppResult<Json<InventoryRecord>> {
    let start = Instant::now();
    let result = async {
        let variant_id: VariantId = variant_id.parse()?;
        state
            .ledger
            .commit(variant_id, request.quantity, request.reference)
            .await
    }
    .await;
    observe("POST", "/api/v1/inventory/:variant_id/commit", start, &result);
    result.map(Json)
}

/// Return reserved stock to available (order cancelled)
///
/// POST /api/v1/inventory/:variant_id/release
pub async fn release_stock(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(request): Json<StockQuantityRequest>,
) -> AppResult<Json<InventoryRecord>> {
    let start = Instant::now();
    let result = async {
        let variant_id: VariantId = variant_id.parse()?;
        state
            .ledger
            .release(variant_id, request.quantity, request.reference)
            .await
    }
    .await;
    observe("POST", "/api/v1/inventory/:variant_id/release", start, &result);
    result.map(Json)
}

/// Receive stock (returns, supplier deliveries)
///
/// POST /api/v1/inventory/:variant_id/restock
pub async fn restock(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(request): Json<StockQuantityRequest>,
) -> AppResult<Json<InventoryRecord>> {
    let start = Instant::now();
    let result = async {
        let variant_id: VariantId = variant_id.parse()?;
        state
            .ledger
            .restock(variant_id, request.quantity, request.reference)
            .await
    }
    .await;
    observe("POST", "/api/v1/inventory/:variant_id/restock", start, &result);
    result.map(Json)
}

// -----------------------------------------------------------------------------
// ADJUST STOCK
// -----------------------------------------------------------------------------
/// Manual stock correction
///
/// POST /api/v1/inventory/:variant_id/adjust
///
/// # Request Body
/// ```json
/// { "delta": -3, "reason": "cycle count correction" }
/// ```
pub async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Json(request): Json<AdjustStockRequest>,
) -> AppResult<Json<InventoryRecord>> {
    let start = Instant::now();
    let result = async {
        let variant_id: VariantId = variant_id.parse()?;
        state
            .ledger
            .adjust(variant_id, request.delta, request.reason)
            .await
    }
    .await;
    observe("POST", "/api/v1/inventory/:variant_id/adjust", start, &result);
    result.map(Json)
}

/// POST /api/v1/inventory/:variant_id/discontinue
pub async fn discontinue(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
) -> AppResult<Json<InventoryRecord>> {
    let start = Instant::now();
    let result = async { state.ledger.discontinue(variant_id.parse()?).await }.await;
    observe("POST", "/api/v1/inventory/:variant_id/discontinue", start, &result);
    result.map(Json)
}

/// POST /api/v1/inventory/:variant_id/reactivate
pub async fn reactivate(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
) -> AppResult<Json<InventoryRecord>> {
    let start = Instant::now();
    let result = async { state.ledger.reactivate(variant_id.parse()?).await }.await;
    observe("POST", "/api/v1/inventory/:variant_id/reactivate", start, &result);
    result.map(Json)
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// Page size (default 50, clamped to 1..=500)
    pub limit: Option<i64>,
}

/// Ledger rows, newest first
///
/// GET /api/v1/inventory/:variant_id/history?limit=20
pub async fn inventory_history(
    State(state): State<Arc<AppState>>,
    Path(variant_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> AppResult<Json<Vec<InventoryTransaction>>> {
    let start = Instant::now();
    let result = async { state.ledger.history(variant_id.parse()?, params.limit).await }.await;
    observe("GET", "/api/v1/inventory/:variant_id/history", start, &result);
    result.map(Json)
}

// -----------------------------------------------------------------------------
// LOW STOCK ALERTS
// -----------------------------------------------------------------------------
/// Records whose available stock is below threshold, lowest first
///
/// GET /api/v1/inventory/alerts
pub async fn low_stock_alerts(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<LowStockAlert>>> {
    let start = Instant::now();
    let result = state.ledger.low_stock_alerts().await;
    observe("GET", "/api/v1/inventory/alerts", start, &result);
    result.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::VariantCache;
    use crate::catalog::sample_catalog;
    use crate::config::Config;
    use crate::memory::MemoryStore;
    use crate::{router, Storage};
    use axum::{
        body::Body,
        http::{header::CONTENT_TYPE, Method, Request},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = MemoryStore::new();
        store.seed_sample_catalog().await;
        let state = AppState::new(
            Storage::memory(store),
            VariantCache::disabled(),
            metrics::detached_handle().expect("metrics handle"),
            &Config::default(),
        );
        router(Arc::new(state))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn generate_body(initial_stock: i64) -> Value {
        let sample = sample_catalog();
        let selections: Vec<Value> = sample
            .types
            .iter()
            .map(|t| {
                let ids: Vec<String> = sample
                    .values
                    .iter()
                    .filter(|v| v.attribute_type_id == t.id)
                    .map(|v| v.id.to_string())
                    .collect();
                json!({ "attribute_type_id": t.id.to_string(), "attribute_value_ids": ids })
            })
            .collect();

        json!({
            "selections": selections,
            "base_product_data": {
                "base_sku": "IPH15",
                "base_price": 1000,
                "initial_stock": initial_stock
            }
        })
    }

    async fn generated_variant(app: &Router, initial_stock: i64) -> String {
        let uri = format!("/api/v1/products/{}/variants/generate", ProductId::new());
        let (status, body) = send(app, Method::POST, &uri, Some(generate_body(initial_stock))).await;
        assert_eq!(status, StatusCode::CREATED);
        body["variants"][0]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_and_metrics_endpoints() {
        let app = app().await;

        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "variant-service");

        let (status, body) = send(&app, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["storage"], true);

        let (status, _) = send(&app, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_generate_then_regenerate() {
        let app = app().await;
        let product = ProductId::new();
        let uri = format!("/api/v1/products/{product}/variants/generate");

        let (status, body) = send(&app, Method::POST, &uri, Some(generate_body(0))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["total_generated"], 8);

        let (status, body) = send(&app, Method::POST, &uri, Some(generate_body(0))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_generated"], 0);
        assert_eq!(body["skipped_duplicates"], 8);

        let list = format!("/api/v1/products/{product}/variants");
        let (status, body) = send(&app, Method::GET, &list, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(8));
    }

    #[tokio::test]
    async fn test_empty_selection_is_bad_request() {
        let app = app().await;
        let uri = format!("/api/v1/products/{}/variants/generate", ProductId::new());
        let body = json!({
            "selections": [],
            "base_product_data": { "base_sku": "X", "base_price": 1 }
        });

        let (status, body) = send(&app, Method::POST, &uri, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "NO_VARIANT_ATTRIBUTES_SELECTED");
    }

    #[tokio::test]
    async fn test_reserve_conflict_then_success() {
        let app = app().await;
        let variant = generated_variant(&app, 2).await;
        let reserve = format!("/api/v1/inventory/{variant}/reserve");

        let (status, body) = send(&app, Method::POST, &reserve, Some(json!({ "quantity": 3 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "INSUFFICIENT_STOCK");

        let (status, body) = send(
            &app,
            Method::POST,
            &reserve,
            Some(json!({ "quantity": 2, "reference": "ORD-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available_stock"], 0);
        assert_eq!(body["reserved_stock"], 2);

        let history = format!("/api/v1/inventory/{variant}/history?limit=1");
        let (status, body) = send(&app, Method::GET, &history, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["kind"], "RESERVED");
        assert_eq!(body[0]["reference"], "ORD-1");

        let (status, body) = send(&app, Method::GET, "/api/v1/inventory/alerts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body
            .as_array()
            .unwrap()
            .iter()
            .any(|alert| alert["variant_id"] == variant.as_str()));
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_ids() {
        let app = app().await;

        let (status, body) = send(&app, Method::GET, "/api/v1/inventory/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_IDENTIFIER");

        let uri = format!("/api/v1/variants/{}", VariantId::new());
        let (status, body) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
