// =============================================================================
// VARIANT PERSISTENCE
// =============================================================================
// Writes a generation batch as one all-or-nothing unit, keyed by a content
// hash so that re-running a generation never duplicates a configuration.
//
// FLOW:
// 1. Hash every draft: SHA-256 over product id + sorted (type, value) pairs
// 2. Hand the batch to the store, which inserts inside one transaction and
//    silently skips rows whose (product_id, config_hash) already exists
// 3. Emit one inventory initialization event per newly created variant
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::error::AppResult;
use crate::ids::{ProductId, VariantId};
use crate::models::{VariantAttribute, VariantConfiguration, VariantStatus};

// =============================================================================
// STORAGE CONTRACT
// =============================================================================

/// A row ready for insertion
#[derive(Debug, Clone)]
pub struct NewVariant {
    pub id: VariantId,
    pub attributes: Vec<VariantAttribute>,
    pub config_hash: String,
    pub sku: String,
    pub price: Decimal,
}

/// Explicit admin changes to a stored variant; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct VariantPatch {
    pub price: Option<Decimal>,
    pub status: Option<VariantStatus>,
    pub is_deleted: Option<bool>,
}

#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Subset of `hashes` already stored for `product_id`.
    async fn existing_hashes(
        &self,
        product_id: ProductId,
        hashes: &[String],
    ) -> AppResult<HashSet<String>>;

    /// Whether any variant of any product already uses `sku`.
    async fn sku_exists(&self, sku: &str) -> AppResult<bool>;

    /// Insert `variants` atomically.
    ///
    /// Rows whose `(product_id, config_hash)` already exists are skipped and
    /// left out of the returned list. Any other failure rolls back the whole
    /// batch.
    async fn insert_batch(
        &self,
        product_id: ProductId,
        variants: Vec<NewVariant>,
    ) -> AppResult<Vec<VariantConfiguration>>;

    /// Variants of a product in creation order.
    async fn list_by_product(
        &self,
        product_id: ProductId,
        include_deleted: bool,
    ) -> AppResult<Vec<VariantConfiguration>>;

    async fn get(&self, id: VariantId) -> AppResult<Option<VariantConfiguration>>;

    /// Apply an admin patch; `None` when the variant does not exist.
    async fn update(
        &self,
        id: VariantId,
        patch: VariantPatch,
    ) -> AppResult<Option<VariantConfiguration>>;
}

// =============================================================================
// CONFIGURATION HASH
// =============================================================================

/// Stable identity of a (product, combination) pair.
///
/// Pairs are sorted by (type id, value id) first, so the hash does not
/// depend on enumeration order.
pub fn config_hash(product_id: ProductId, pairs: &[VariantAttribute]) -> String {
    let mut sorted: Vec<&VariantAttribute> = pairs.iter().collect();
    sorted.sort_by_key(|p| (p.attribute_type_id, p.attribute_value_id));

    let mut hasher = Sha256::new();
    hasher.update(product_id.to_string().as_bytes());
    for pair in sorted {
        hasher.update(b"|");
        hasher.update(pair.attribute_type_id.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(pair.attribute_value_id.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

// =============================================================================
// PERSISTENCE SERVICE
// =============================================================================

/// A priced, SKU'd combination waiting to be stored
#[derive(Debug, Clone)]
pub struct VariantDraft {
    pub pairs: Vec<VariantAttribute>,
    pub price: Decimal,
    pub sku: String,
}

/// Stock seed applied to every variant created by one generation
#[derive(Debug, Clone)]
pub struct InventorySeed {
    pub initial_stock: i64,
    pub low_stock_threshold: i64,
    pub warehouse: String,
}

/// Emitted for each newly created variant; consumed by the inventory ledger
#[derive(Debug, Clone)]
pub struct InventoryInitialized {
    pub variant_id: VariantId,
    pub seed: InventorySeed,
}

#[derive(Debug, Default)]
pub struct PersistOutcome {
    pub created: Vec<VariantConfiguration>,
    pub skipped_duplicates: usize,
    pub events: Vec<InventoryInitialized>,
}

#[derive(Clone)]
pub struct VariantPersistence {
    store: Arc<dyn VariantStore>,
}

impl VariantPersistence {
    pub fn new(store: Arc<dyn VariantStore>) -> Self {
        Self { store }
    }

    /// Store `drafts` for `product_id` in a single transaction.
    #[instrument(skip(self, drafts, seed), fields(product_id = %product_id, drafts = drafts.len()))]
    pub async fn persist(
        &self,
        product_id: ProductId,
        drafts: Vec<VariantDraft>,
        seed: &InventorySeed,
    ) -> AppResult<PersistOutcome> {
        let requested = drafts.len();
        let mut hashes = HashSet::with_capacity(requested);
        let mut rows = Vec::with_capacity(requested);

        for draft in drafts {
            let hash = config_hash(product_id, &draft.pairs);
            if !hashes.insert(hash.clone()) {
                debug!(sku = %draft.sku, "Dropping repeated combination within batch");
                continue;
            }
            rows.push(NewVariant {
                id: VariantId::new(),
                attributes: draft.pairs,
                config_hash: hash,
                sku: draft.sku,
                price: draft.price,
            });
        }

        let created = self.store.insert_batch(product_id, rows).await?;
        let skipped_duplicates = requested - created.len();

        let events = created
            .iter()
            .map(|variant| InventoryInitialized {
                variant_id: variant.id,
                seed: seed.clone(),
            })
            .collect();

        info!(
            created = created.len(),
            skipped_duplicates = skipped_duplicates,
            "Persisted variant batch"
        );

        Ok(PersistOutcome {
            created,
            skipped_duplicates,
            events,
        })
    }
}
