// =============================================================================
// VARIANT SERVICE
// =============================================================================
// Orchestrates one generation run:
//
//   validate base data
//     -> enumerate compatible combinations
//     -> drop combinations already stored for the product
//     -> price + allocate SKU per combination
//     -> persist the batch in one transaction
//     -> initialize inventory for every created variant
//
// and the admin operations on stored variants (list, get, patch, soft
// delete). Every write invalidates the product's cached variant list.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use crate::cache::VariantCache;
use crate::catalog::{AttributeCatalog, CompatibilityRules};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::generator::CombinationGenerator;
use crate::ids::{ProductId, VariantId};
use crate::ledger::{InventoryLedger, MAX_STOCK_QUANTITY};
use crate::metrics;
use crate::models::{
    BaseProductData, GenerateVariantsRequest, GenerateVariantsResponse, UpdateVariantRequest,
    VariantConfiguration,
};
use crate::persistence::{
    config_hash, InventoryInitialized, InventorySeed, VariantDraft, VariantPatch,
    VariantPersistence, VariantStore,
};
use crate::pricing::{self, round2, MAX_PRICE};
use crate::sku::{self, SkuAllocator};

/// Warehouse code given to every new inventory record
pub const DEFAULT_WAREHOUSE: &str = "DEFAULT";

#[derive(Clone)]
pub struct VariantService {
    generator: CombinationGenerator,
    skus: SkuAllocator,
    persistence: VariantPersistence,
    variants: Arc<dyn VariantStore>,
    ledger: InventoryLedger,
    cache: VariantCache,
    default_low_stock_threshold: i64,
}

impl VariantService {
    pub fn new(
        catalog: Arc<dyn AttributeCatalog>,
        rules: Arc<dyn CompatibilityRules>,
        variants: Arc<dyn VariantStore>,
        ledger: InventoryLedger,
        cache: VariantCache,
        config: &Config,
    ) -> Self {
        Self {
            generator: CombinationGenerator::new(catalog, rules),
            skus: SkuAllocator::new(variants.clone(), config.sku_max_attempts),
            persistence: VariantPersistence::new(variants.clone()),
            variants,
            ledger,
            cache,
            default_low_stock_threshold: config.default_low_stock_threshold,
        }
    }

    fn seed_for(&self, base: &BaseProductData) -> AppResult<InventorySeed> {
        if sku::normalize(&base.base_sku).is_empty() {
            return Err(AppError::BadRequest(
                "base_sku must contain at least one alphanumeric character".to_string(),
            ));
        }
        if base.base_price.is_sign_negative() && !base.base_price.is_zero() {
            return Err(AppError::BadRequest(format!(
                "base_price must not be negative, got {}",
                base.base_price
            )));
        }
        if base.base_price > MAX_PRICE {
            return Err(AppError::BadRequest(format!(
                "base_price must not exceed {MAX_PRICE}, got {}",
                base.base_price
            )));
        }

        let initial_stock = base.initial_stock.unwrap_or(0);
        if !(0..=MAX_STOCK_QUANTITY).contains(&initial_stock) {
            return Err(AppError::BadRequest(format!(
                "initial_stock must be between 0 and {MAX_STOCK_QUANTITY}, got {initial_stock}"
            )));
        }
        let low_stock_threshold = base
            .low_stock_threshold
            .unwrap_or(self.default_low_stock_threshold);
        if low_stock_threshold < 0 {
            return Err(AppError::BadRequest(format!(
                "low_stock_threshold must not be negative, got {low_stock_threshold}"
            )));
        }

        Ok(InventorySeed {
            initial_stock,
            low_stock_threshold,
            warehouse: DEFAULT_WAREHOUSE.to_string(),
        })
    }

    // -------------------------------------------------------------------------
    // GENERATION
    // -------------------------------------------------------------------------

    /// Generate, price and store every compatible combination for a product.
    ///
    /// Re-running with the same selections creates nothing and reports every
    /// combination as a skipped duplicate.
    #[instrument(skip(self, request), fields(product_id = %product_id))]
    pub async fn generate(
        &self,
        product_id: ProductId,
        request: GenerateVariantsRequest,
    ) -> AppResult<GenerateVariantsResponse> {
        let base = request.base_product_data;
        let seed = self.seed_for(&base)?;

        let combinations = self.generator.generate(product_id, &request.selections).await?;
        let enumerated = combinations.len();

        let hashes: Vec<String> = combinations
            .iter()
            .map(|c| config_hash(product_id, &c.pairs))
            .collect();
        let existing = self.variants.existing_hashes(product_id, &hashes).await?;

        let mut batch_skus = HashSet::new();
        let mut drafts = Vec::with_capacity(enumerated - existing.len().min(enumerated));
        for (combination, hash) in combinations.iter().zip(&hashes) {
            if existing.contains(hash) {
                continue;
            }
            let quote = pricing::price(base.base_price, combination)?;
            let sku = self
                .skus
                .allocate(&base.base_sku, combination, &mut batch_skus)
                .await?;
            drafts.push(VariantDraft {
                pairs: combination.pairs.clone(),
                price: quote.price,
                sku,
            });
        }
        let prefiltered = enumerated - drafts.len();

        let outcome = self.persistence.persist(product_id, drafts, &seed).await?;
        self.ledger.initialize_all(&outcome.events).await?;

        if !existing.is_empty() {
            self.heal_inventory(product_id, &existing, &seed).await?;
        }

        let skipped_duplicates = prefiltered + outcome.skipped_duplicates;
        metrics::record_generation(outcome.created.len(), skipped_duplicates);
        self.cache.invalidate(product_id).await;

        info!(
            enumerated,
            created = outcome.created.len(),
            skipped_duplicates,
            "Variant generation finished"
        );

        Ok(GenerateVariantsResponse {
            total_generated: outcome.created.len(),
            skipped_duplicates,
            variants: outcome.created,
        })
    }

    /// Make sure live variants created by an earlier run have inventory
    /// records. Soft-deleted variants are skipped. Initialization is
    /// idempotent, so present records are left untouched.
    async fn heal_inventory(
        &self,
        product_id: ProductId,
        hashes: &HashSet<String>,
        seed: &InventorySeed,
    ) -> AppResult<()> {
        let events: Vec<InventoryInitialized> = self
            .variants
            .list_by_product(product_id, false)
            .await?
            .into_iter()
            .filter(|v| !v.is_deleted && hashes.contains(&v.config_hash))
            .map(|v| InventoryInitialized {
                variant_id: v.id,
                seed: seed.clone(),
            })
            .collect();

        self.ledger.initialize_all(&events).await
    }

    // -------------------------------------------------------------------------
    // ADMINISTRATION
    // -------------------------------------------------------------------------

    pub async fn list(
        &self,
        product_id: ProductId,
        include_deleted: bool,
    ) -> AppResult<Vec<VariantConfiguration>> {
        if include_deleted {
            return self.variants.list_by_product(product_id, true).await;
        }

        let slot = self.cache.slot(product_id).await;
        if let Some(slot) = &slot {
            if let Some(cached) = self.cache.get(slot).await {
                return Ok(cached);
            }
        }

        let variants = self.variants.list_by_product(product_id, false).await?;
        if let Some(slot) = &slot {
            self.cache.put(slot, &variants).await;
        }
        Ok(variants)
    }

    pub async fn get(&self, id: VariantId) -> AppResult<VariantConfiguration> {
        self.variants
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("variant {id}")))
    }

    /// Explicit admin edit. Price is rounded to cents and must not be
    /// negative.
    pub async fn update(
        &self,
        id: VariantId,
        request: UpdateVariantRequest,
    ) -> AppResult<VariantConfiguration> {
        let price = match request.price {
            Some(price) if price < Decimal::ZERO || round2(price) > MAX_PRICE => {
                return Err(AppError::BadRequest(format!(
                    "price must be between 0 and {MAX_PRICE}, got {price}"
                )))
            }
            other => other.map(round2),
        };

        self.apply_patch(
            id,
            VariantPatch {
                price,
                status: request.status,
                is_deleted: None,
            },
        )
        .await
    }

    /// Soft delete: the row and its configuration hash stay, so generating
    /// the same combination again remains a no-op.
    pub async fn soft_delete(&self, id: VariantId) -> AppResult<VariantConfiguration> {
        let variant = self
            .apply_patch(
                id,
                VariantPatch {
                    is_deleted: Some(true),
                    ..Default::default()
                },
            )
            .await?;
        warn!(variant_id = %id, sku = %variant.sku, "Variant soft-deleted");
        Ok(variant)
    }

    async fn apply_patch(&self, id: VariantId, patch: VariantPatch) -> AppResult<VariantConfiguration> {
        let variant = self
            .variants
            .update(id, patch)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("variant {id}")))?;
        self.cache.invalidate(variant.product_id).await;
        Ok(variant)
    }
}
