// =============================================================================
// VARIANT SERVICE - Main Entry Point
// =============================================================================
// Bootstraps the service:
// - Generates product variants from attribute selections
// - Tracks per-variant stock through an append-only inventory ledger
// - Exposes Prometheus metrics, optional Redis caching
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use variant_service::cache::VariantCache;
use variant_service::config::Config;
use variant_service::db::Database;
use variant_service::memory::MemoryStore;
use variant_service::metrics::setup_metrics;
use variant_service::{router, AppState, Storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // STEP 1: Load environment variables
    // -------------------------------------------------------------------------
    dotenvy::dotenv().ok();

    // -------------------------------------------------------------------------
    // STEP 2: Initialize logging/tracing
    // -------------------------------------------------------------------------
    // RUST_LOG controls levels, e.g. RUST_LOG=info,variant_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,variant_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Variant Service...");

    // -------------------------------------------------------------------------
    // STEP 3: Load configuration
    // -------------------------------------------------------------------------
    let config = Config::from_env()?;
    info!(
        port = config.port,
        sku_max_attempts = config.sku_max_attempts,
        default_low_stock_threshold = config.default_low_stock_threshold,
        "Configuration loaded"
    );

    // -------------------------------------------------------------------------
    // STEP 4: Set up Prometheus metrics
    // -------------------------------------------------------------------------
    let metrics_handle = setup_metrics().context("Failed to install metrics recorder")?;
    info!("Prometheus metrics initialized");

    // -------------------------------------------------------------------------
    // STEP 5: Storage (PostgreSQL, or in-memory for local runs)
    // -------------------------------------------------------------------------
    let storage = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            info!("Connected to PostgreSQL");

            db.run_migrations().await?;
            info!("Database migrations completed");

            Storage::postgres(db)
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory storage, data is lost on restart");
            let store = MemoryStore::new();
            store.seed_sample_catalog().await;
            Storage::memory(store)
        }
    };

    // -------------------------------------------------------------------------
    // STEP 6: Redis cache (optional)
    // -------------------------------------------------------------------------
    let cache = match &config.redis_url {
        Some(url) => {
            let cache = VariantCache::connect(url, config.variant_cache_ttl_secs)
                .await
                .context("Failed to connect to Redis")?;
            info!(ttl_secs = config.variant_cache_ttl_secs, "Connected to Redis");
            cache
        }
        None => {
            info!("REDIS_URL not set; variant list caching disabled");
            VariantCache::disabled()
        }
    };

    // -------------------------------------------------------------------------
    // STEP 7: Application state and routes
    // -------------------------------------------------------------------------
    let backend = storage.backend();
    let state = Arc::new(AppState::new(storage, cache, metrics_handle, &config));
    let app = router(state);

    // -------------------------------------------------------------------------
    // STEP 8: Start the HTTP server
    // -------------------------------------------------------------------------
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(address = %addr, storage = backend, "Variant Service is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
