// =============================================================================
// IN-PROCESS STORE
// =============================================================================
// Implements every storage contract without a database. Used by the test
// suite and by local runs without DATABASE_URL.
//
// CONCURRENCY:
// - Inventory: one DashMap entry per variant. A mutation holds the entry's
//   shard lock while it checks the guards, updates the counters and appends
//   the ledger row, so the three steps are indivisible.
// - Variants: one mutex-guarded table. A batch is validated in full before
//   the first row is inserted, giving all-or-nothing semantics.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::catalog::{sample_catalog, AttributeCatalog, CompatibilityRules};
use crate::error::{AppError, AppResult};
use crate::ids::{
    AttributeTypeId, AttributeValueId, InventoryId, ProductId, TransactionId, VariantId,
};
use crate::ledger::{InventoryStore, StockChange, INITIAL_STOCK_REFERENCE};
use crate::models::{
    AttributeType, AttributeValue, CompatibilityRule, InventoryRecord, InventoryTransaction,
    TransactionKind, VariantConfiguration, VariantStatus,
};
use crate::persistence::{InventorySeed, NewVariant, VariantPatch, VariantStore};

#[derive(Default)]
struct VariantTable {
    rows: Vec<VariantConfiguration>,
    hashes: HashSet<(ProductId, String)>,
    skus: HashSet<String>,
}

struct InventoryCell {
    record: InventoryRecord,
    ledger: Vec<InventoryTransaction>,
}

#[derive(Default)]
struct Inner {
    types: DashMap<AttributeTypeId, AttributeType>,
    values: DashMap<AttributeValueId, AttributeValue>,
    rules: RwLock<Vec<CompatibilityRule>>,
    variants: Mutex<VariantTable>,
    inventory: DashMap<VariantId, InventoryCell>,
}

/// Cheap to clone; clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&self, attribute_type: AttributeType) {
        self.inner.types.insert(attribute_type.id, attribute_type);
    }

    pub fn add_value(&self, value: AttributeValue) {
        self.inner.values.insert(value.id, value);
    }

    pub async fn add_rule(&self, rule: CompatibilityRule) {
        self.inner.rules.write().await.push(rule);
    }

    /// Load the sample phone catalog if no attribute types exist yet.
    pub async fn seed_sample_catalog(&self) {
        if !self.inner.types.is_empty() {
            return;
        }

        let sample = sample_catalog();
        let (types, values, rules) = (sample.types.len(), sample.values.len(), sample.rules.len());
        for t in sample.types {
            self.add_type(t);
        }
        for v in sample.values {
            self.add_value(v);
        }
        for r in sample.rules {
            self.add_rule(r).await;
        }

        info!(types, values, rules, "Seeded sample catalog into memory store");
    }
}

// =============================================================================
// CATALOG
// =============================================================================

#[async_trait]
impl AttributeCatalog for MemoryStore {
    async fn get_types(&self, ids: &[AttributeTypeId]) -> AppResult<Vec<AttributeType>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.inner.types.get(id).map(|t| t.value().clone()))
            .collect())
    }

    async fn get_active_values(
        &self,
        type_ids: &[AttributeTypeId],
    ) -> AppResult<Vec<AttributeValue>> {
        let wanted: HashSet<AttributeTypeId> = type_ids.iter().copied().collect();
        Ok(self
            .inner
            .values
            .iter()
            .filter(|v| v.is_active() && wanted.contains(&v.attribute_type_id))
            .map(|v| v.value().clone())
            .collect())
    }
}

#[async_trait]
impl CompatibilityRules for MemoryStore {
    async fn rules_for(
        &self,
        parent_type_id: AttributeTypeId,
        parent_value_id: Option<AttributeValueId>,
    ) -> AppResult<Vec<CompatibilityRule>> {
        let rules = self.inner.rules.read().await;
        Ok(rules
            .iter()
            .filter(|r| r.parent_type_id == parent_type_id && r.parent_value_id == parent_value_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// VARIANTS
// =============================================================================

#[async_trait]
impl VariantStore for MemoryStore {
    async fn existing_hashes(
        &self,
        product_id: ProductId,
        hashes: &[String],
    ) -> AppResult<HashSet<String>> {
        let table = self.inner.variants.lock().await;
        Ok(hashes
            .iter()
            .filter(|h| table.hashes.contains(&(product_id, (*h).clone())))
            .cloned()
            .collect())
    }

    async fn sku_exists(&self, sku: &str) -> AppResult<bool> {
        Ok(self.inner.variants.lock().await.skus.contains(sku))
    }

    async fn insert_batch(
        &self,
        product_id: ProductId,
        variants: Vec<NewVariant>,
    ) -> AppResult<Vec<VariantConfiguration>> {
        let mut table = self.inner.variants.lock().await;

        let mut accepted = Vec::with_capacity(variants.len());
        let mut batch_skus = HashSet::new();
        for variant in variants {
            if table.hashes.contains(&(product_id, variant.config_hash.clone())) {
                continue;
            }
            if table.skus.contains(&variant.sku) || !batch_skus.insert(variant.sku.clone()) {
                return Err(AppError::PersistenceFailure(format!(
                    "sku {} is already in use",
                    variant.sku
                )));
            }
            accepted.push(variant);
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(accepted.len());
        for variant in accepted {
            let row = VariantConfiguration {
                id: variant.id,
                product_id,
                attributes: variant.attributes,
                config_hash: variant.config_hash,
                sku: variant.sku,
                price: variant.price,
                status: VariantStatus::Active,
                is_deleted: false,
                created_at: now,
                updated_at: now,
            };
            table.hashes.insert((product_id, row.config_hash.clone()));
            table.skus.insert(row.sku.clone());
            table.rows.push(row.clone());
            created.push(row);
        }

        Ok(created)
    }

    async fn list_by_product(
        &self,
        product_id: ProductId,
        include_deleted: bool,
    ) -> AppResult<Vec<VariantConfiguration>> {
        let table = self.inner.variants.lock().await;
        Ok(table
            .rows
            .iter()
            .filter(|v| v.product_id == product_id && (include_deleted || !v.is_deleted))
            .cloned()
            .collect())
    }

    async fn get(&self, id: VariantId) -> AppResult<Option<VariantConfiguration>> {
        let table = self.inner.variants.lock().await;
        Ok(table.rows.iter().find(|v| v.id == id).cloned())
    }

    async fn update(
        &self,
        id: VariantId,
        patch: VariantPatch,
    ) -> AppResult<Option<VariantConfiguration>> {
        let mut table = self.inner.variants.lock().await;
        let Some(row) = table.rows.iter_mut().find(|v| v.id == id) else {
            return Ok(None);
        };

        if let Some(price) = patch.price {
            row.price = price;
        }
        if let Some(status) = patch.status {
            row.status = status;
        }
        if let Some(is_deleted) = patch.is_deleted {
            row.is_deleted = is_deleted;
        }
        row.updated_at = Utc::now();

        Ok(Some(row.clone()))
    }
}

// =============================================================================
// INVENTORY
// =============================================================================

fn not_found(variant_id: VariantId) -> AppError {
    AppError::NotFound(format!("inventory for variant {variant_id}"))
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn initialize(
        &self,
        variant_id: VariantId,
        seed: &InventorySeed,
    ) -> AppResult<InventoryRecord> {
        let cell = self.inner.inventory.entry(variant_id).or_insert_with(|| {
            let now = Utc::now();
            let initial = seed.initial_stock.max(0);
            let record = InventoryRecord::from_counters(
                InventoryId::new(),
                variant_id,
                initial,
                0,
                seed.low_stock_threshold,
                seed.warehouse.clone(),
                false,
                now,
                now,
            );

            let mut ledger = Vec::new();
            if initial > 0 {
                ledger.push(InventoryTransaction {
                    id: TransactionId::new(),
                    inventory_id: record.id,
                    variant_id,
                    kind: TransactionKind::In,
                    quantity: initial,
                    stock_before: 0,
                    stock_after: initial,
                    reference: Some(INITIAL_STOCK_REFERENCE.to_string()),
                    created_at: now,
                });
            }

            InventoryCell { record, ledger }
        });

        Ok(cell.record.clone())
    }

    async fn apply(
        &self,
        variant_id: VariantId,
        change: &StockChange,
    ) -> AppResult<(InventoryRecord, InventoryTransaction)> {
        let mut cell = self
            .inner
            .inventory
            .get_mut(&variant_id)
            .ok_or_else(|| not_found(variant_id))?;

        let (record, entry) = change.apply_to(&cell.record, TransactionId::new(), Utc::now())?;
        cell.record = record.clone();
        cell.ledger.push(entry.clone());

        Ok((record, entry))
    }

    async fn get(&self, variant_id: VariantId) -> AppResult<Option<InventoryRecord>> {
        Ok(self
            .inner
            .inventory
            .get(&variant_id)
            .map(|cell| cell.record.clone()))
    }

    async fn set_discontinued(
        &self,
        variant_id: VariantId,
        discontinued: bool,
    ) -> AppResult<InventoryRecord> {
        let mut cell = self
            .inner
            .inventory
            .get_mut(&variant_id)
            .ok_or_else(|| not_found(variant_id))?;

        let current = &cell.record;
        let record = InventoryRecord::from_counters(
            current.id,
            current.variant_id,
            current.total_stock,
            current.reserved_stock,
            current.low_stock_threshold,
            current.warehouse.clone(),
            discontinued,
            current.created_at,
            Utc::now(),
        );
        cell.record = record.clone();

        Ok(record)
    }

    async fn history(
        &self,
        variant_id: VariantId,
        limit: i64,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .inner
            .inventory
            .get(&variant_id)
            .map(|cell| cell.ledger.iter().rev().take(take).cloned().collect())
            .unwrap_or_default())
    }

    async fn low_stock(&self) -> AppResult<Vec<InventoryRecord>> {
        let mut records: Vec<InventoryRecord> = self
            .inner
            .inventory
            .iter()
            .filter(|cell| cell.record.is_low_stock())
            .map(|cell| cell.record.clone())
            .collect();
        records.sort_by_key(|r| r.available_stock);
        Ok(records)
    }
}
