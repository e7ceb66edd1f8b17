// =============================================================================
// INVENTORY LEDGER
// =============================================================================
// Per-variant stock counters plus an append-only transaction log.
//
// Every stock operation is expressed as one guarded change
// (Δtotal, Δreserved) that the store applies in a single atomic step
// together with its ledger row:
//
//   operation   Δtotal   Δreserved   ledger kind   ledger quantity
//   reserve       0        +q         RESERVED        +q
//   commit       -q        -q         OUT             -q
//   release       0        -q         RELEASED        -q
//   restock      +q         0         IN              +q
//   adjust       +d         0         ADJUSTMENT      +d
//
// GUARDS (checked inside the same conditional update):
// - reserved + Δreserved >= 0
// - (total + Δtotal) - (reserved + Δreserved) >= 0   (available never < 0)
// - reserve and restock are refused on discontinued variants
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use crate::error::{AppError, AppResult};
use crate::ids::{TransactionId, VariantId};
use crate::metrics;
use crate::models::{InventoryRecord, InventoryTransaction, LowStockAlert, TransactionKind};
use crate::persistence::{InventoryInitialized, InventorySeed};

/// Default and maximum page size for ledger history
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 500;

/// Reference written on the seed row of a freshly initialized record
pub const INITIAL_STOCK_REFERENCE: &str = "initial-stock";

/// Largest quantity a single operation (or an initial stock) may move
pub const MAX_STOCK_QUANTITY: i64 = 1_000_000_000;

// =============================================================================
// STOCK CHANGE
// =============================================================================

/// One guarded mutation of an inventory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub kind: TransactionKind,
    pub total_delta: i64,
    pub reserved_delta: i64,
    pub allow_discontinued: bool,
    pub reference: Option<String>,
}

fn positive(quantity: i64, operation: &str) -> AppResult<i64> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(format!(
            "{operation} quantity must be greater than zero, got {quantity}"
        )));
    }
    if quantity > MAX_STOCK_QUANTITY {
        return Err(AppError::BadRequest(format!(
            "{operation} quantity must not exceed {MAX_STOCK_QUANTITY}, got {quantity}"
        )));
    }
    Ok(quantity)
}

fn counter_overflow(variant_id: VariantId) -> AppError {
    AppError::BadRequest(format!("stock counters of variant {variant_id} would overflow"))
}

impl StockChange {
    pub fn reserve(quantity: i64, reference: Option<String>) -> AppResult<Self> {
        let q = positive(quantity, "reserve")?;
        Ok(Self {
            kind: TransactionKind::Reserved,
            total_delta: 0,
            reserved_delta: q,
            allow_discontinued: false,
            reference,
        })
    }

    pub fn commit(quantity: i64, reference: Option<String>) -> AppResult<Self> {
        let q = positive(quantity, "commit")?;
        Ok(Self {
            kind: TransactionKind::Out,
            total_delta: -q,
            reserved_delta: -q,
            allow_discontinued: true,
            reference,
        })
    }

    pub fn release(quantity: i64, reference: Option<String>) -> AppResult<Self> {
        let q = positive(quantity, "release")?;
        Ok(Self {
            kind: TransactionKind::Released,
            total_delta: 0,
            reserved_delta: -q,
            allow_discontinued: true,
            reference,
        })
    }

    pub fn restock(quantity: i64, reference: Option<String>) -> AppResult<Self> {
        let q = positive(quantity, "restock")?;
        Ok(Self {
            kind: TransactionKind::In,
            total_delta: q,
            reserved_delta: 0,
            allow_discontinued: false,
            reference,
        })
    }

    pub fn adjust(delta: i64, reason: impl Into<String>) -> AppResult<Self> {
        if delta == 0 {
            return Err(AppError::BadRequest(
                "adjustment delta must be non-zero".to_string(),
            ));
        }
        if delta.unsigned_abs() > MAX_STOCK_QUANTITY.unsigned_abs() {
            return Err(AppError::BadRequest(format!(
                "adjustment delta must not exceed {MAX_STOCK_QUANTITY} in magnitude, got {delta}"
            )));
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(AppError::BadRequest(
                "adjustment reason is required".to_string(),
            ));
        }
        Ok(Self {
            kind: TransactionKind::Adjustment,
            total_delta: delta,
            reserved_delta: 0,
            allow_discontinued: true,
            reference: Some(reason),
        })
    }

    /// Signed quantity written to the ledger row
    pub fn ledger_quantity(&self) -> i64 {
        match self.kind {
            TransactionKind::Reserved | TransactionKind::Released => self.reserved_delta,
            _ => self.total_delta,
        }
    }

    /// `(total, reserved)` after this change, or `None` on i64 overflow.
    fn counters_after(&self, record: &InventoryRecord) -> Option<(i64, i64)> {
        let total = record.total_stock.checked_add(self.total_delta)?;
        let reserved = record.reserved_stock.checked_add(self.reserved_delta)?;
        Some((total, reserved))
    }

    /// The guard error `record` would produce, if any.
    pub fn check(&self, record: &InventoryRecord) -> Option<AppError> {
        if record.discontinued && !self.allow_discontinued {
            return Some(AppError::Discontinued(record.variant_id));
        }

        let Some((total_after, reserved_after)) = self.counters_after(record) else {
            return Some(counter_overflow(record.variant_id));
        };
        if reserved_after < 0 {
            return Some(AppError::InsufficientReservedStock {
                variant_id: record.variant_id,
                reserved: record.reserved_stock,
                requested: -self.reserved_delta,
            });
        }

        let Some(available_after) = total_after.checked_sub(reserved_after) else {
            return Some(counter_overflow(record.variant_id));
        };
        if available_after < 0 {
            return Some(AppError::InsufficientStock {
                variant_id: record.variant_id,
                available: record.available_stock,
                requested: self.reserved_delta - self.total_delta,
            });
        }

        None
    }

    /// Explain why a guarded update matched no row, given the current record.
    ///
    /// The record may have moved on since the update ran; when it now passes
    /// every guard the caller still gets an `InsufficientStock` to retry on.
    pub fn rejection(&self, record: &InventoryRecord) -> AppError {
        self.check(record)
            .unwrap_or_else(|| AppError::InsufficientStock {
                variant_id: record.variant_id,
                available: record.available_stock,
                requested: self.reserved_delta - self.total_delta,
            })
    }

    /// Post-image and ledger row of applying this change to `record`.
    ///
    /// Used by stores that hold the record under a lock; SQL stores express
    /// the same guards in their conditional update.
    pub fn apply_to(
        &self,
        record: &InventoryRecord,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> AppResult<(InventoryRecord, InventoryTransaction)> {
        if let Some(err) = self.check(record) {
            return Err(err);
        }
        let (total_after, reserved_after) = self
            .counters_after(record)
            .ok_or_else(|| counter_overflow(record.variant_id))?;

        let updated = InventoryRecord::from_counters(
            record.id,
            record.variant_id,
            total_after,
            reserved_after,
            record.low_stock_threshold,
            record.warehouse.clone(),
            record.discontinued,
            record.created_at,
            now,
        );

        let entry = InventoryTransaction {
            id: transaction_id,
            inventory_id: record.id,
            variant_id: record.variant_id,
            kind: self.kind,
            quantity: self.ledger_quantity(),
            stock_before: record.total_stock,
            stock_after: updated.total_stock,
            reference: self.reference.clone(),
            created_at: now,
        };

        Ok((updated, entry))
    }
}

// =============================================================================
// STORAGE CONTRACT
// =============================================================================

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Create the record for `variant_id` if missing. A positive initial
    /// stock is booked as one IN row in the same atomic step. Calling this
    /// again for an existing record returns it unchanged.
    async fn initialize(
        &self,
        variant_id: VariantId,
        seed: &InventorySeed,
    ) -> AppResult<InventoryRecord>;

    /// Apply `change` and append its ledger row atomically.
    async fn apply(
        &self,
        variant_id: VariantId,
        change: &StockChange,
    ) -> AppResult<(InventoryRecord, InventoryTransaction)>;

    async fn get(&self, variant_id: VariantId) -> AppResult<Option<InventoryRecord>>;

    /// Toggle the discontinued flag. No ledger row: stock is not affected.
    async fn set_discontinued(
        &self,
        variant_id: VariantId,
        discontinued: bool,
    ) -> AppResult<InventoryRecord>;

    /// Ledger rows, newest first.
    async fn history(
        &self,
        variant_id: VariantId,
        limit: i64,
    ) -> AppResult<Vec<InventoryTransaction>>;

    /// Records whose available stock is below their threshold, lowest first.
    async fn low_stock(&self) -> AppResult<Vec<InventoryRecord>>;
}

// =============================================================================
// LEDGER SERVICE
// =============================================================================

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Initialize records for newly created variants.
    pub async fn initialize_all(&self, events: &[InventoryInitialized]) -> AppResult<()> {
        for event in events {
            let record = self.store.initialize(event.variant_id, &event.seed).await?;
            metrics::set_available_stock(&record.variant_id.to_string(), record.available_stock);
        }
        Ok(())
    }

    #[instrument(skip(self, reference), fields(variant_id = %variant_id))]
    pub async fn reserve(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: Option<String>,
    ) -> AppResult<InventoryRecord> {
        self.mutate(variant_id, StockChange::reserve(quantity, reference)?)
            .await
    }

    #[instrument(skip(self, reference), fields(variant_id = %variant_id))]
    pub async fn commit(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: Option<String>,
    ) -> AppResult<InventoryRecord> {
        self.mutate(variant_id, StockChange::commit(quantity, reference)?)
            .await
    }

    #[instrument(skip(self, reference), fields(variant_id = %variant_id))]
    pub async fn release(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: Option<String>,
    ) -> AppResult<InventoryRecord> {
        self.mutate(variant_id, StockChange::release(quantity, reference)?)
            .await
    }

    #[instrument(skip(self, reference), fields(variant_id = %variant_id))]
    pub async fn restock(
        &self,
        variant_id: VariantId,
        quantity: i64,
        reference: Option<String>,
    ) -> AppResult<InventoryRecord> {
        self.mutate(variant_id, StockChange::restock(quantity, reference)?)
            .await
    }

    #[instrument(skip(self, reason), fields(variant_id = %variant_id))]
    pub async fn adjust(
        &self,
        variant_id: VariantId,
        delta: i64,
        reason: impl Into<String>,
    ) -> AppResult<InventoryRecord> {
        self.mutate(variant_id, StockChange::adjust(delta, reason)?)
            .await
    }

    pub async fn discontinue(&self, variant_id: VariantId) -> AppResult<InventoryRecord> {
        let record = self.store.set_discontinued(variant_id, true).await?;
        info!(variant_id = %variant_id, "Variant discontinued");
        Ok(record)
    }

    pub async fn reactivate(&self, variant_id: VariantId) -> AppResult<InventoryRecord> {
        let record = self.store.set_discontinued(variant_id, false).await?;
        info!(variant_id = %variant_id, "Variant reactivated");
        Ok(record)
    }

    pub async fn get(&self, variant_id: VariantId) -> AppResult<InventoryRecord> {
        self.store
            .get(variant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("inventory for variant {variant_id}")))
    }

    /// Ledger rows for a variant, newest first. `limit` defaults to
    /// [`DEFAULT_HISTORY_LIMIT`] and is clamped to 1..=[`MAX_HISTORY_LIMIT`].
    pub async fn history(
        &self,
        variant_id: VariantId,
        limit: Option<i64>,
    ) -> AppResult<Vec<InventoryTransaction>> {
        // Surface a 404 rather than an empty page for unknown variants.
        self.get(variant_id).await?;

        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.store.history(variant_id, limit).await
    }

    pub async fn low_stock_alerts(&self) -> AppResult<Vec<LowStockAlert>> {
        let records = self.store.low_stock().await?;
        metrics::set_low_stock_count(records.len() as i64);
        Ok(records.iter().map(LowStockAlert::from).collect())
    }

    async fn mutate(&self, variant_id: VariantId, change: StockChange) -> AppResult<InventoryRecord> {
        let operation = change.kind.as_str();

        match self.store.apply(variant_id, &change).await {
            Ok((record, entry)) => {
                metrics::record_inventory_operation(operation, true);
                metrics::set_available_stock(&variant_id.to_string(), record.available_stock);
                info!(
                    transaction_id = %entry.id,
                    kind = operation,
                    quantity = entry.quantity,
                    stock_before = entry.stock_before,
                    stock_after = entry.stock_after,
                    reserved = record.reserved_stock,
                    available = record.available_stock,
                    "Inventory ledger entry appended"
                );
                Ok(record)
            }
            Err(err) => {
                metrics::record_inventory_operation(operation, false);
                warn!(kind = operation, error = %err, "Inventory operation rejected");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::InventoryId;
    use crate::memory::MemoryStore;
    use crate::models::StockStatus;

    fn seed(initial_stock: i64) -> InventorySeed {
        InventorySeed {
            initial_stock,
            low_stock_threshold: 5,
            warehouse: "DEFAULT".into(),
        }
    }

    async fn ledger_with(initial_stock: i64) -> (InventoryLedger, VariantId) {
        let store = Arc::new(MemoryStore::new());
        let ledger = InventoryLedger::new(store);
        let variant_id = VariantId::new();
        ledger
            .initialize_all(&[InventoryInitialized {
                variant_id,
                seed: seed(initial_stock),
            }])
            .await
            .unwrap();
        (ledger, variant_id)
    }

    fn assert_consistent(record: &InventoryRecord, ledger: &[InventoryTransaction]) {
        assert!(record.reserved_stock >= 0);
        assert!(record.reserved_stock <= record.total_stock);
        assert_eq!(record.available_stock, record.total_stock - record.reserved_stock);
        let reconstructed: i64 = ledger.iter().map(|t| t.stock_after - t.stock_before).sum();
        assert_eq!(reconstructed, record.total_stock);
    }

    #[test]
    fn test_guard_reports_available_shortfall() {
        let now = Utc::now();
        let record = InventoryRecord::from_counters(
            InventoryId::new(),
            VariantId::new(),
            10,
            8,
            5,
            "DEFAULT".into(),
            false,
            now,
            now,
        );
        let change = StockChange::reserve(3, None).unwrap();
        match change.check(&record) {
            Some(AppError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(available, 2);
                assert_eq!(requested, 3);
            }
            other => panic!("unexpected guard result: {other:?}"),
        }
    }

    #[test]
    fn test_non_positive_quantities_are_rejected() {
        assert!(StockChange::reserve(0, None).is_err());
        assert!(StockChange::commit(-1, None).is_err());
        assert!(StockChange::adjust(0, "recount").is_err());
        assert!(StockChange::adjust(4, "  ").is_err());
    }

    #[test]
    fn test_oversized_quantities_are_rejected() {
        assert!(StockChange::restock(MAX_STOCK_QUANTITY, None).is_ok());
        assert!(matches!(
            StockChange::restock(i64::MAX, None),
            Err(AppError::BadRequest(_))
        ));
        assert!(StockChange::reserve(MAX_STOCK_QUANTITY + 1, None).is_err());
        assert!(StockChange::adjust(i64::MIN, "recount").is_err());
    }

    #[test]
    fn test_counter_overflow_is_a_bad_request() {
        let now = Utc::now();
        let record = InventoryRecord::from_counters(
            InventoryId::new(),
            VariantId::new(),
            i64::MAX - 1,
            0,
            5,
            "DEFAULT".into(),
            false,
            now,
            now,
        );
        let change = StockChange::restock(10, None).unwrap();
        assert!(matches!(change.check(&record), Some(AppError::BadRequest(_))));
        assert!(matches!(
            change.apply_to(&record, TransactionId::new(), now),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_huge_restock_leaves_record_untouched() {
        let (ledger, variant_id) = ledger_with(5).await;

        let result = ledger.restock(variant_id, i64::MAX, None).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let record = ledger.get(variant_id).await.unwrap();
        assert_eq!(record.total_stock, 5);
        assert_eq!(ledger.history(variant_id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_new_record_starts_out_of_stock() {
        let (ledger, variant_id) = ledger_with(0).await;
        let record = ledger.get(variant_id).await.unwrap();
        assert_eq!(record.total_stock, 0);
        assert_eq!(record.status, StockStatus::OutOfStock);
        assert!(ledger.history(variant_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_initial_stock_is_booked_once() {
        let (ledger, variant_id) = ledger_with(12).await;

        // A repeated initialization must not book the seed again.
        ledger
            .initialize_all(&[InventoryInitialized {
                variant_id,
                seed: seed(12),
            }])
            .await
            .unwrap();

        let record = ledger.get(variant_id).await.unwrap();
        let history = ledger.history(variant_id, None).await.unwrap();
        assert_eq!(record.total_stock, 12);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransactionKind::In);
        assert_eq!(history[0].reference.as_deref(), Some(INITIAL_STOCK_REFERENCE));
    }

    #[tokio::test]
    async fn test_reserve_commit_release_flow() {
        let (ledger, variant_id) = ledger_with(10).await;

        let r = ledger.reserve(variant_id, 4, Some("ORD-1".into())).await.unwrap();
        assert_eq!((r.total_stock, r.reserved_stock, r.available_stock), (10, 4, 6));

        let r = ledger.commit(variant_id, 3, Some("ORD-1".into())).await.unwrap();
        assert_eq!((r.total_stock, r.reserved_stock, r.available_stock), (7, 1, 6));

        let r = ledger.release(variant_id, 1, Some("ORD-1".into())).await.unwrap();
        assert_eq!((r.total_stock, r.reserved_stock, r.available_stock), (7, 0, 7));

        let history = ledger.history(variant_id, None).await.unwrap();
        let kinds: Vec<_> = history.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionKind::Released,
                TransactionKind::Out,
                TransactionKind::Reserved,
                TransactionKind::In,
            ]
        );
        assert_eq!(history[1].quantity, -3);
        assert_consistent(&r, &history);
    }

    #[tokio::test]
    async fn test_failed_reserve_writes_no_ledger_row() {
        let (ledger, variant_id) = ledger_with(2).await;

        let err = ledger.reserve(variant_id, 3, None).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 2, requested: 3, .. }));

        let record = ledger.get(variant_id).await.unwrap();
        assert_eq!(record.reserved_stock, 0);
        assert_eq!(ledger.history(variant_id, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_and_release_need_reserved_stock() {
        let (ledger, variant_id) = ledger_with(10).await;
        ledger.reserve(variant_id, 2, None).await.unwrap();

        let commit = ledger.commit(variant_id, 3, None).await.unwrap_err();
        assert!(matches!(commit, AppError::InsufficientReservedStock { reserved: 2, .. }));

        let release = ledger.release(variant_id, 5, None).await.unwrap_err();
        assert!(matches!(release, AppError::InsufficientReservedStock { .. }));
    }

    #[tokio::test]
    async fn test_adjust_never_drives_available_negative() {
        let (ledger, variant_id) = ledger_with(10).await;
        ledger.reserve(variant_id, 6, None).await.unwrap();

        let err = ledger.adjust(variant_id, -5, "shrinkage").await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { available: 4, requested: 5, .. }));

        let r = ledger.adjust(variant_id, -4, "shrinkage").await.unwrap();
        assert_eq!((r.total_stock, r.available_stock), (6, 0));

        let r = ledger.adjust(variant_id, 9, "found pallet").await.unwrap();
        assert_eq!(r.available_stock, 9);
        assert_eq!(r.status, StockStatus::InStock);
    }

    #[tokio::test]
    async fn test_discontinued_blocks_sales_but_not_fulfilment() {
        let (ledger, variant_id) = ledger_with(10).await;
        ledger.reserve(variant_id, 2, None).await.unwrap();
        let record = ledger.discontinue(variant_id).await.unwrap();
        assert_eq!(record.status, StockStatus::Discontinued);

        let err = ledger.reserve(variant_id, 1, None).await.unwrap_err();
        assert!(matches!(err, AppError::Discontinued(_)));

        let err = ledger.restock(variant_id, 5, None).await.unwrap_err();
        assert!(matches!(err, AppError::Discontinued(_)));

        // Existing reservations can still ship.
        ledger.commit(variant_id, 2, None).await.unwrap();

        let record = ledger.reactivate(variant_id).await.unwrap();
        assert_eq!(record.status, StockStatus::InStock);
    }

    #[tokio::test]
    async fn test_ledger_reconstructs_total_after_mixed_sequence() {
        let (ledger, variant_id) = ledger_with(20).await;

        ledger.reserve(variant_id, 5, None).await.unwrap();
        ledger.restock(variant_id, 8, Some("RMA-7".into())).await.unwrap();
        ledger.commit(variant_id, 5, None).await.unwrap();
        ledger.adjust(variant_id, -2, "damaged").await.unwrap();
        ledger.reserve(variant_id, 7, None).await.unwrap();
        ledger.release(variant_id, 3, None).await.unwrap();
        let _ = ledger.reserve(variant_id, 1_000, None).await;

        let record = ledger.get(variant_id).await.unwrap();
        let history = ledger.history(variant_id, Some(MAX_HISTORY_LIMIT)).await.unwrap();
        assert_eq!(history.len(), 7);
        assert_consistent(&record, &history);
        assert_eq!(record.total_stock, 21);
        assert_eq!(record.reserved_stock, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_oversell() {
        const STOCK: i64 = 7;
        const CALLERS: usize = 40;

        let (ledger, variant_id) = ledger_with(STOCK).await;

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..CALLERS {
            let ledger = ledger.clone();
            tasks.spawn(async move { ledger.reserve(variant_id, 1, Some(format!("ORD-{n}"))).await });
        }

        let mut succeeded = 0;
        let mut insufficient = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined.expect("task panicked") {
                Ok(_) => succeeded += 1,
                Err(AppError::InsufficientStock { .. }) => insufficient += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(succeeded, STOCK as usize);
        assert_eq!(insufficient, CALLERS - STOCK as usize);

        let record = ledger.get(variant_id).await.unwrap();
        assert_eq!(record.available_stock, 0);
        let reserved_rows = ledger
            .history(variant_id, Some(MAX_HISTORY_LIMIT))
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.kind == TransactionKind::Reserved)
            .count();
        assert_eq!(reserved_rows, STOCK as usize);
    }

    #[tokio::test]
    async fn test_unknown_variant_is_not_found() {
        let (ledger, _) = ledger_with(0).await;
        let err = ledger.reserve(VariantId::new(), 1, None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(matches!(
            ledger.history(VariantId::new(), None).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
