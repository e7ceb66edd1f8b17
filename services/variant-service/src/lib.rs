// =============================================================================
// VARIANT SERVICE LIBRARY
// =============================================================================
// Product variant generation plus the per-variant inventory ledger.
//
// MODULE MAP:
// - catalog / compatibility / generator : attribute lookups and the pruned
//   combination enumeration
// - pricing / sku / persistence         : per-combination price, SKU and the
//   all-or-nothing batch write
// - ledger                              : guarded stock mutations + history
// - db / memory                         : Postgres and in-process storage
// - service / handlers                  : orchestration and HTTP surface
// =============================================================================

pub mod cache;
pub mod catalog;
pub mod compatibility;
pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod ids;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod pricing;
pub mod service;
pub mod sku;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::cache::VariantCache;
use crate::catalog::{AttributeCatalog, CompatibilityRules};
use crate::config::Config;
use crate::db::Database;
use crate::ledger::{InventoryLedger, InventoryStore};
use crate::memory::MemoryStore;
use crate::persistence::VariantStore;
use crate::service::VariantService;

// -----------------------------------------------------------------------------
// STORAGE
// -----------------------------------------------------------------------------
/// Storage handles for every contract, all backed by one store.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn AttributeCatalog>,
    pub rules: Arc<dyn CompatibilityRules>,
    pub variants: Arc<dyn VariantStore>,
    pub inventory: Arc<dyn InventoryStore>,
    database: Option<Database>,
}

impl Storage {
    pub fn postgres(db: Database) -> Self {
        let shared = Arc::new(db.clone());
        Self {
            catalog: shared.clone(),
            rules: shared.clone(),
            variants: shared.clone(),
            inventory: shared,
            database: Some(db),
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let shared = Arc::new(store);
        Self {
            catalog: shared.clone(),
            rules: shared.clone(),
            variants: shared.clone(),
            inventory: shared,
            database: None,
        }
    }

    pub fn backend(&self) -> &'static str {
        if self.database.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }

    pub async fn health_check(&self) -> bool {
        match &self.database {
            Some(db) => db.health_check().await,
            None => true,
        }
    }
}

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Shared by every handler through State<Arc<AppState>>.
pub struct AppState {
    pub variants: VariantService,
    pub ledger: InventoryLedger,
    pub storage: Storage,
    pub cache: VariantCache,

    /// Renders the /metrics body
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(
        storage: Storage,
        cache: VariantCache,
        metrics_handle: PrometheusHandle,
        config: &Config,
    ) -> Self {
        let ledger = InventoryLedger::new(storage.inventory.clone());
        let variants = VariantService::new(
            storage.catalog.clone(),
            storage.rules.clone(),
            storage.variants.clone(),
            ledger.clone(),
            cache.clone(),
            config,
        );

        Self {
            variants,
            ledger,
            storage,
            cache,
            metrics_handle,
        }
    }
}

// -----------------------------------------------------------------------------
// ROUTES
// -----------------------------------------------------------------------------
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ----- Health, Readiness & Metrics -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        // ----- Variant Generation & Administration -----
        .route(
            "/api/v1/products/:product_id/variants/generate",
            post(handlers::generate_variants),
        )
        .route(
            "/api/v1/products/:product_id/variants",
            get(handlers::list_variants),
        )
        .route(
            "/api/v1/variants/:variant_id",
            get(handlers::get_variant)
                .patch(handlers::update_variant)
                .delete(handlers::delete_variant),
        )
        // ----- Inventory Ledger -----
        .route("/api/v1/inventory/alerts", get(handlers::low_stock_alerts))
        .route("/api/v1/inventory/:variant_id", get(handlers::get_inventory))
        .route(
            "/api/v1/inventory/:variant_id/reserve",
            post(handlers::reserve_stock),
        )
        .route(
            "/api/v1/inventory/:variant_id/commit",
            post(handlers::commit_stock),
        )
        .route(
            "/api/v1/inventory/:variant_id/release",
            post(handlers::release_stock),
        )
        .route(
            "/api/v1/inventory/:variant_id/restock",
            post(handlers::restock),
        )
        .route(
            "/api/v1/inventory/:variant_id/adjust",
            post(handlers::adjust_stock),
        )
        .route(
            "/api/v1/inventory/:variant_id/discontinue",
            post(handlers::discontinue),
        )
        .route(
            "/api/v1/inventory/:variant_id/reactivate",
            post(handlers::reactivate),
        )
        .route(
            "/api/v1/inventory/:variant_id/history",
            get(handlers::inventory_history),
        )
        // ----- Middleware Layers -----
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
