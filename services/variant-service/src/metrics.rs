// =============================================================================
// METRICS MODULE
// =============================================================================
// Prometheus metrics, scraped from GET /metrics.
//
// SERIES:
// - HTTP: request counter + latency histogram per method/endpoint
// - Generation: variants created, duplicates skipped, SKU collisions,
//   clamped prices
// - Inventory: operations by kind/outcome, available stock per variant,
//   count of records below threshold
// - Storage: Postgres and Redis latency histograms
// =============================================================================

use anyhow::Result;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// METRIC NAMES
// =============================================================================

/// HTTP request counter
/// Labels: method, endpoint, status
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";

/// HTTP request duration histogram
/// Labels: method, endpoint
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

/// Variants created by generation runs
pub const VARIANTS_GENERATED_TOTAL: &str = "variants_generated_total";

/// Combinations skipped because they already existed for the product
pub const VARIANT_DUPLICATES_SKIPPED_TOTAL: &str = "variant_duplicates_skipped_total";

/// SKU candidates rejected as already taken
pub const SKU_COLLISIONS_TOTAL: &str = "sku_collisions_total";

/// Prices floored at zero
pub const PRICING_CLAMPED_TOTAL: &str = "pricing_clamped_total";

/// Ledger operations
/// Labels: operation (RESERVED/OUT/RELEASED/IN/ADJUSTMENT), status (success/failed)
pub const INVENTORY_OPERATIONS_TOTAL: &str = "inventory_operations_total";

/// Available stock gauge
/// Labels: variant_id
pub const INVENTORY_AVAILABLE_STOCK: &str = "inventory_available_stock";

/// Records currently below their low stock threshold
pub const INVENTORY_LOW_STOCK_ITEMS: &str = "inventory_low_stock_items";

/// Database query duration histogram
/// Labels: operation
pub const DB_QUERY_DURATION_SECONDS: &str = "db_query_duration_seconds";

/// Redis operation duration histogram
/// Labels: operation (get/set/delete/ping)
pub const REDIS_OPERATION_DURATION_SECONDS: &str = "redis_operation_duration_seconds";

// =============================================================================
// SETUP FUNCTION
// =============================================================================

/// Latency buckets shared by every histogram: 1ms up to 10s.
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn builder() -> Result<PrometheusBuilder> {
    let mut builder = PrometheusBuilder::new();
    for name in [
        HTTP_REQUEST_DURATION_SECONDS,
        DB_QUERY_DURATION_SECONDS,
        REDIS_OPERATION_DURATION_SECONDS,
    ] {
        builder = builder.set_buckets_for_metric(Matcher::Full(name.to_string()), LATENCY_BUCKETS)?;
    }
    Ok(builder)
}

/// Install the global Prometheus recorder and return the handle that
/// renders the /metrics body.
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let handle = builder()?.install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request latency in seconds");
    describe_counter!(VARIANTS_GENERATED_TOTAL, "Variants created by generation runs");
    describe_counter!(
        VARIANT_DUPLICATES_SKIPPED_TOTAL,
        "Combinations skipped because they already existed"
    );
    describe_counter!(SKU_COLLISIONS_TOTAL, "SKU candidates rejected as already taken");
    describe_counter!(PRICING_CLAMPED_TOTAL, "Variant prices floored at zero");
    describe_counter!(INVENTORY_OPERATIONS_TOTAL, "Inventory ledger operations by outcome");
    describe_gauge!(INVENTORY_AVAILABLE_STOCK, "Available stock per variant");
    describe_gauge!(
        INVENTORY_LOW_STOCK_ITEMS,
        "Number of variants currently below low stock threshold"
    );
    describe_histogram!(DB_QUERY_DURATION_SECONDS, "Database query latency in seconds");
    describe_histogram!(REDIS_OPERATION_DURATION_SECONDS, "Redis operation latency in seconds");

    Ok(handle)
}

/// A handle whose recorder is not installed globally. Router tests use it
/// to serve /metrics without touching process-wide state.
pub fn detached_handle() -> Result<PrometheusHandle> {
    Ok(builder()?.build_recorder().handle())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

/// Record the outcome of one generation run
pub fn record_generation(created: usize, skipped_duplicates: usize) {
    counter!(VARIANTS_GENERATED_TOTAL).increment(created as u64);
    counter!(VARIANT_DUPLICATES_SKIPPED_TOTAL).increment(skipped_duplicates as u64);
}

pub fn record_sku_collision() {
    counter!(SKU_COLLISIONS_TOTAL).increment(1);
}

pub fn record_pricing_clamp() {
    counter!(PRICING_CLAMPED_TOTAL).increment(1);
}

/// Record a ledger operation attempt
///
/// # Arguments
/// * `operation` - Ledger row kind (RESERVED, OUT, ...)
/// * `success` - Whether the guarded update went through
pub fn record_inventory_operation(operation: &str, success: bool) {
    let status = if success { "success" } else { "failed" };
    counter!(
        INVENTORY_OPERATIONS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status
    )
    .increment(1);
}

pub fn set_available_stock(variant_id: &str, available: i64) {
    gauge!(INVENTORY_AVAILABLE_STOCK, "variant_id" => variant_id.to_string()).set(available as f64);
}

pub fn set_low_stock_count(count: i64) {
    gauge!(INVENTORY_LOW_STOCK_ITEMS).set(count as f64);
}

/// Record database query duration
///
/// # Arguments
/// * `operation` - Logical query name (insert_batch, apply_change, ...)
/// * `duration_secs` - Query duration in seconds
pub fn record_db_query(operation: &str, duration_secs: f64) {
    histogram!(
        DB_QUERY_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

pub fn record_redis_operation(operation: &str, duration_secs: f64) {
    histogram!(
        REDIS_OPERATION_DURATION_SECONDS,
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}
