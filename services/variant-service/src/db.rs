// =============================================================================
// DATABASE MODULE
// =============================================================================
// PostgreSQL implementation of every storage contract.
//
// ATOMICITY:
// - Generation batches run inside one transaction; a (product_id,
//   config_hash) conflict skips the row, any other error rolls back.
// - Each stock mutation is ONE statement: a guarded UPDATE whose RETURNING
//   row feeds the ledger INSERT in a data-modifying CTE. Under concurrent
//   writers Postgres re-checks the guards against the latest row version,
//   so the counters can never be driven past their invariants.
// =============================================================================

use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPoolOptions, types::Json, FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::catalog::{sample_catalog, AttributeCatalog, CompatibilityRules};
use crate::error::{AppError, AppResult};
use crate::ids::{
    AttributeTypeId, AttributeValueId, InventoryId, ProductId, TransactionId, VariantId,
};
use crate::ledger::{InventoryStore, StockChange, INITIAL_STOCK_REFERENCE};
use crate::metrics;
use crate::models::{
    AttributeType, AttributeValue, CompatibilityRule, InventoryRecord, InventoryTransaction,
    PriceModifier, TransactionKind, VariantAttribute, VariantConfiguration,
};
use crate::persistence::{InventorySeed, NewVariant, VariantPatch, VariantStore};

// -----------------------------------------------------------------------------
// SCHEMA
// -----------------------------------------------------------------------------
// Executed in order by `run_migrations`. Every statement is idempotent.
const SCHEMA: &[(&str, &str)] = &[
    (
        "attribute_types",
        r#"
        CREATE TABLE IF NOT EXISTS attribute_types (
            id UUID PRIMARY KEY,
            name VARCHAR(100) NOT NULL UNIQUE,
            display_name VARCHAR(255) NOT NULL,
            input_type VARCHAR(20) NOT NULL DEFAULT 'select',
            participates_in_variants BOOLEAN NOT NULL DEFAULT TRUE,
            variant_priority INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "attribute_values",
        r#"
        CREATE TABLE IF NOT EXISTS attribute_values (
            id UUID PRIMARY KEY,
            attribute_type_id UUID NOT NULL REFERENCES attribute_types(id),
            value VARCHAR(255) NOT NULL,
            display_name VARCHAR(255) NOT NULL,
            -- [{"kind": "FIXED" | "PERCENTAGE", "amount": "..."}]
            price_modifiers JSONB NOT NULL DEFAULT '[]'::jsonb,
            sku_fragment VARCHAR(20) NOT NULL DEFAULT '',
            sort_order INTEGER NOT NULL DEFAULT 0,
            status VARCHAR(20) NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "attribute_values index",
        "CREATE INDEX IF NOT EXISTS idx_attribute_values_type ON attribute_values(attribute_type_id)",
    ),
    (
        "compatibility_rules",
        r#"
        CREATE TABLE IF NOT EXISTS compatibility_rules (
            seq BIGSERIAL,
            id UUID PRIMARY KEY,
            parent_type_id UUID NOT NULL REFERENCES attribute_types(id),
            parent_value_id UUID REFERENCES attribute_values(id),
            child_type_id UUID NOT NULL REFERENCES attribute_types(id),
            allowed_child_value_ids UUID[] NOT NULL DEFAULT '{}',
            is_required BOOLEAN NOT NULL DEFAULT FALSE,
            is_forbidden BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "compatibility_rules key",
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_compatibility_rules_key
        ON compatibility_rules (
            parent_type_id,
            COALESCE(parent_value_id, '00000000-0000-0000-0000-000000000000'::uuid),
            child_type_id
        )
        "#,
    ),
    (
        "variants",
        r#"
        CREATE TABLE IF NOT EXISTS variants (
            seq BIGSERIAL,
            id UUID PRIMARY KEY,
            product_id UUID NOT NULL,
            attributes JSONB NOT NULL,
            config_hash CHAR(64) NOT NULL,
            sku VARCHAR(128) NOT NULL UNIQUE,
            price NUMERIC(12, 2) NOT NULL,
            status VARCHAR(20) NOT NULL DEFAULT 'ACTIVE',
            is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

            CONSTRAINT variants_product_config UNIQUE (product_id, config_hash),
            CONSTRAINT non_negative_price CHECK (price >= 0)
        )
        "#,
    ),
    (
        "variants index",
        "CREATE INDEX IF NOT EXISTS idx_variants_product ON variants(product_id, seq)",
    ),
    (
        "inventory",
        r#"
        CREATE TABLE IF NOT EXISTS inventory (
            id UUID PRIMARY KEY,
            variant_id UUID NOT NULL UNIQUE REFERENCES variants(id),
            total_stock BIGINT NOT NULL DEFAULT 0,
            reserved_stock BIGINT NOT NULL DEFAULT 0,
            low_stock_threshold BIGINT NOT NULL DEFAULT 10,
            warehouse VARCHAR(50) NOT NULL DEFAULT 'DEFAULT',
            discontinued BOOLEAN NOT NULL DEFAULT FALSE,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

            CONSTRAINT valid_reserved CHECK (reserved_stock >= 0 AND reserved_stock <= total_stock)
        )
        "#,
    ),
    (
        "inventory_transactions",
        r#"
        CREATE TABLE IF NOT EXISTS inventory_transactions (
            seq BIGSERIAL,
            id UUID PRIMARY KEY,
            inventory_id UUID NOT NULL REFERENCES inventory(id),
            variant_id UUID NOT NULL,
            kind VARCHAR(20) NOT NULL,
            quantity BIGINT NOT NULL,
            stock_before BIGINT NOT NULL,
            stock_after BIGINT NOT NULL,
            reference VARCHAR(255),
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "inventory_transactions index",
        r#"
        CREATE INDEX IF NOT EXISTS idx_inventory_transactions_variant
        ON inventory_transactions(variant_id, created_at DESC, seq DESC)
        "#,
    ),
    (
        "ledger guard function",
        r#"
        CREATE OR REPLACE FUNCTION reject_ledger_mutation() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'inventory_transactions is append-only';
        END;
        $$ LANGUAGE plpgsql
        "#,
    ),
    (
        "ledger guard trigger reset",
        "DROP TRIGGER IF EXISTS inventory_transactions_append_only ON inventory_transactions",
    ),
    (
        "ledger guard trigger",
        r#"
        CREATE TRIGGER inventory_transactions_append_only
        BEFORE UPDATE OR DELETE ON inventory_transactions
        FOR EACH ROW EXECUTE FUNCTION reject_ledger_mutation()
        "#,
    ),
];

const VARIANT_COLUMNS: &str =
    "id, product_id, attributes, config_hash, sku, price, status, is_deleted, created_at, updated_at";

const INVENTORY_COLUMNS: &str = "id, variant_id, total_stock, reserved_stock, low_stock_threshold, \
     warehouse, discontinued, created_at, updated_at";

/// Guarded update of one inventory record plus its ledger row, as a single
/// statement. Binds: $1 variant, $2 Δtotal, $3 Δreserved, $4 allow
/// discontinued, $5 transaction id, $6 kind, $7 ledger quantity,
/// $8 reference.
fn apply_statement() -> String {
    format!(
        r#"
        WITH updated AS (
            UPDATE inventory
            SET total_stock = total_stock + $2,
                reserved_stock = reserved_stock + $3,
                updated_at = NOW()
            WHERE variant_id = $1
              AND reserved_stock + $3 >= 0
              AND (total_stock + $2) - (reserved_stock + $3) >= 0
              AND ($4 OR NOT discontinued)
            RETURNING {INVENTORY_COLUMNS}
        ),
        entry AS (
            INSERT INTO inventory_transactions
                (id, inventory_id, variant_id, kind, quantity, stock_before, stock_after,
                 reference, created_at)
            SELECT $5, id, variant_id, $6, $7, total_stock - $2, total_stock, $8, updated_at
            FROM updated
        )
        SELECT {INVENTORY_COLUMNS} FROM updated
        "#
    )
}

// -----------------------------------------------------------------------------
// ROW TYPES
// -----------------------------------------------------------------------------
// Plain column mirrors; text-encoded enums are parsed on conversion.

#[derive(FromRow)]
struct AttributeTypeRow {
    id: Uuid,
    name: String,
    display_name: String,
    input_type: String,
    participates_in_variants: bool,
    variant_priority: i32,
}

impl TryFrom<AttributeTypeRow> for AttributeType {
    type Error = AppError;

    fn try_from(row: AttributeTypeRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id.into(),
            name: row.name,
            display_name: row.display_name,
            input_type: row.input_type.parse()?,
            participates_in_variants: row.participates_in_variants,
            variant_priority: row.variant_priority,
        })
    }
}

#[derive(FromRow)]
struct AttributeValueRow {
    id: Uuid,
    attribute_type_id: Uuid,
    value: String,
    display_name: String,
    price_modifiers: Json<Vec<PriceModifier>>,
    sku_fragment: String,
    sort_order: i32,
    status: String,
}

impl TryFrom<AttributeValueRow> for AttributeValue {
    type Error = AppError;

    fn try_from(row: AttributeValueRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id.into(),
            attribute_type_id: row.attribute_type_id.into(),
            value: row.value,
            display_name: row.display_name,
            price_modifiers: row.price_modifiers.0,
            sku_fragment: row.sku_fragment,
            sort_order: row.sort_order,
            status: row.status.parse()?,
        })
    }
}

#[derive(FromRow)]
struct CompatibilityRuleRow {
    id: Uuid,
    parent_type_id: Uuid,
    parent_value_id: Option<Uuid>,
    child_type_id: Uuid,
    allowed_child_value_ids: Vec<Uuid>,
    is_required: bool,
    is_forbidden: bool,
}

impl From<CompatibilityRuleRow> for CompatibilityRule {
    fn from(row: CompatibilityRuleRow) -> Self {
        Self {
            id: row.id.into(),
            parent_type_id: row.parent_type_id.into(),
            parent_value_id: row.parent_value_id.map(Into::into),
            child_type_id: row.child_type_id.into(),
            allowed_child_value_ids: row.allowed_child_value_ids.into_iter().map(Into::into).collect(),
            is_required: row.is_required,
            is_forbidden: row.is_forbidden,
        }
    }
}

#[derive(FromRow)]
struct VariantRow {
    id: Uuid,
    product_id: Uuid,
    attributes: Json<Vec<VariantAttribute>>,
    config_hash: String,
    sku: String,
    price: Decimal,
    status: String,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VariantRow> for VariantConfiguration {
    type Error = AppError;

    fn try_from(row: VariantRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id.into(),
            product_id: row.product_id.into(),
            attributes: row.attributes.0,
            config_hash: row.config_hash,
            sku: row.sku,
            price: row.price,
            status: row.status.parse()?,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InventoryRow {
    id: Uuid,
    variant_id: Uuid,
    total_stock: i64,
    reserved_stock: i64,
    low_stock_threshold: i64,
    warehouse: String,
    discontinued: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryRecord {
    fn from(row: InventoryRow) -> Self {
        InventoryRecord::from_counters(
            row.id.into(),
            row.variant_id.into(),
            row.total_stock,
            row.reserved_stock,
            row.low_stock_threshold,
            row.warehouse,
            row.discontinued,
            row.created_at,
            row.updated_at,
        )
    }
}

#[derive(FromRow)]
struct TransactionRow {
    id: Uuid,
    inventory_id: Uuid,
    variant_id: Uuid,
    kind: String,
    quantity: i64,
    stock_before: i64,
    stock_after: i64,
    reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for InventoryTransaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id.into(),
            inventory_id: row.inventory_id.into(),
            variant_id: row.variant_id.into(),
            kind: row.kind.parse()?,
            quantity: row.quantity,
            stock_before: row.stock_before,
            stock_after: row.stock_after,
            reference: row.reference,
            created_at: row.created_at,
        })
    }
}

fn uuids<T: Copy + Into<Uuid>>(ids: &[T]) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

fn observe(operation: &str, started: Instant) {
    metrics::record_db_query(operation, started.elapsed().as_secs_f64());
}

// -----------------------------------------------------------------------------
// DATABASE WRAPPER
// -----------------------------------------------------------------------------
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    // -------------------------------------------------------------------------
    // CONNECTION
    // -------------------------------------------------------------------------
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(300))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        Ok(Self { pool })
    }

    // -------------------------------------------------------------------------
    // MIGRATIONS
    // -------------------------------------------------------------------------
    /// Create the schema if missing and seed the sample catalog into an
    /// empty database.
    pub async fn run_migrations(&self) -> Result<()> {
        for (name, statement) in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to apply schema step: {name}"))?;
        }

        self.seed_sample_catalog().await?;

        Ok(())
    }

    async fn seed_sample_catalog(&self) -> Result<()> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM attribute_types")
            .fetch_one(&self.pool)
            .await?;

        if count.0 > 0 {
            return Ok(());
        }

        let sample = sample_catalog();
        let mut tx = self.pool.begin().await?;

        for t in &sample.types {
            sqlx::query(
                r#"
                INSERT INTO attribute_types
                    (id, name, display_name, input_type, participates_in_variants, variant_priority)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(t.id.as_uuid())
            .bind(&t.name)
            .bind(&t.display_name)
            .bind(t.input_type.as_str())
            .bind(t.participates_in_variants)
            .bind(t.variant_priority)
            .execute(&mut *tx)
            .await?;
        }

        for v in &sample.values {
            sqlx::query(
                r#"
                INSERT INTO attribute_values
                    (id, attribute_type_id, value, display_name, price_modifiers,
                     sku_fragment, sort_order, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(v.id.as_uuid())
            .bind(v.attribute_type_id.as_uuid())
            .bind(&v.value)
            .bind(&v.display_name)
            .bind(Json(&v.price_modifiers))
            .bind(&v.sku_fragment)
            .bind(v.sort_order)
            .bind(v.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        for r in &sample.rules {
            sqlx::query(
                r#"
                INSERT INTO compatibility_rules
                    (id, parent_type_id, parent_value_id, child_type_id,
                     allowed_child_value_ids, is_required, is_forbidden)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(r.id.as_uuid())
            .bind(r.parent_type_id.as_uuid())
            .bind(r.parent_value_id.map(|id| id.as_uuid()))
            .bind(r.child_type_id.as_uuid())
            .bind(uuids(&r.allowed_child_value_ids))
            .bind(r.is_required)
            .bind(r.is_forbidden)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            types = sample.types.len(),
            values = sample.values.len(),
            rules = sample.rules.len(),
            "Seeded sample catalog"
        );

        Ok(())
    }

    // -------------------------------------------------------------------------
    // HEALTH CHECK
    // -------------------------------------------------------------------------

    /// Check if database connection is healthy
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn fetch_inventory(&self, variant_id: VariantId) -> AppResult<Option<InventoryRecord>> {
        let row = sqlx::query_as::<_, InventoryRow>(&format!(
            "SELECT {INVENTORY_COLUMNS} FROM inventory WHERE variant_id = $1"
        ))
        .bind(variant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(InventoryRecord::from))
    }
}

// =============================================================================
// CATALOG
// =============================================================================

#[async_trait]
impl AttributeCatalog for Database {
    async fn get_types(&self, ids: &[AttributeTypeId]) -> AppResult<Vec<AttributeType>> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, AttributeTypeRow>(
            r#"
            SELECT id, name, display_name, input_type, participates_in_variants, variant_priority
            FROM attribute_types
            WHERE id = ANY($1)
            "#,
        )
        .bind(uuids(ids))
        .fetch_all(&self.pool)
        .await?;
        observe("get_types", started);

        rows.into_iter().map(AttributeType::try_from).collect()
    }

    async fn get_active_values(
        &self,
        type_ids: &[AttributeTypeId],
    ) -> AppResult<Vec<AttributeValue>> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, AttributeValueRow>(
            r#"
            SELECT id, attribute_type_id, value, display_name, price_modifiers,
                   sku_fragment, sort_order, status
            FROM attribute_values
            WHERE attribute_type_id = ANY($1) AND status = 'active'
            ORDER BY sort_order ASC
            "#,
        )
        .bind(uuids(type_ids))
        .fetch_all(&self.pool)
        .await?;
        observe("get_active_values", started);

        rows.into_iter().map(AttributeValue::try_from).collect()
    }
}

#[async_trait]
impl CompatibilityRules for Database {
    async fn rules_for(
        &self,
        parent_type_id: AttributeTypeId,
        parent_value_id: Option<AttributeValueId>,
    ) -> AppResult<Vec<CompatibilityRule>> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, CompatibilityRuleRow>(
            r#"
            SELECT id, parent_type_id, parent_value_id, child_type_id,
                   allowed_child_value_ids, is_required, is_forbidden
            FROM compatibility_rules
            WHERE parent_type_id = $1 AND parent_value_id IS NOT DISTINCT FROM $2
            ORDER BY seq ASC
            "#,
        )
        .bind(parent_type_id.as_uuid())
        .bind(parent_value_id.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await?;
        observe("rules_for", started);

        Ok(rows.into_iter().map(CompatibilityRule::from).collect())
    }
}

// =============================================================================
// VARIANTS
// =============================================================================

#[async_trait]
impl VariantStore for Database {
    async fn existing_hashes(
        &self,
        product_id: ProductId,
        hashes: &[String],
    ) -> AppResult<HashSet<String>> {
        let started = Instant::now();
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT config_hash FROM variants WHERE product_id = $1 AND config_hash = ANY($2)",
        )
        .bind(product_id.as_uuid())
        .bind(hashes)
        .fetch_all(&self.pool)
        .await?;
        observe("existing_hashes", started);

        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    async fn sku_exists(&self, sku: &str) -> AppResult<bool> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM variants WHERE sku = $1)")
            .bind(sku)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists.0)
    }

    async fn insert_batch(
        &self,
        product_id: ProductId,
        variants: Vec<NewVariant>,
    ) -> AppResult<Vec<VariantConfiguration>> {
        let started = Instant::now();
        let failure = |e: sqlx::Error| AppError::PersistenceFailure(e.to_string());

        // Dropping `tx` without commit rolls everything back.
        let mut tx = self.pool.begin().await.map_err(failure)?;
        let mut created = Vec::with_capacity(variants.len());

        for variant in variants {
            let row = sqlx::query_as::<_, VariantRow>(&format!(
                r#"
                INSERT INTO variants (id, product_id, attributes, config_hash, sku, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (product_id, config_hash) DO NOTHING
                RETURNING {VARIANT_COLUMNS}
                "#
            ))
            .bind(variant.id.as_uuid())
            .bind(product_id.as_uuid())
            .bind(Json(&variant.attributes))
            .bind(&variant.config_hash)
            .bind(&variant.sku)
            .bind(variant.price)
            .fetch_optional(&mut *tx)
            .await
            .map_err(failure)?;

            if let Some(row) = row {
                created.push(VariantConfiguration::try_from(row)?);
            }
        }

        tx.commit().await.map_err(failure)?;
        observe("insert_batch", started);

        Ok(created)
    }

    async fn list_by_product(
        &self,
        product_id: ProductId,
        include_deleted: bool,
    ) -> AppResult<Vec<VariantConfiguration>> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, VariantRow>(&format!(
            r#"
            SELECT {VARIANT_COLUMNS}
            FROM variants
            WHERE product_id = $1 AND ($2 OR NOT is_deleted)
            ORDER BY seq ASC
            "#
        ))
        .bind(product_id.as_uuid())
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        observe("list_by_product", started);

        rows.into_iter().map(VariantConfiguration::try_from).collect()
    }

    async fn get(&self, id: VariantId) -> AppResult<Option<VariantConfiguration>> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(VariantConfiguration::try_from).transpose()
    }

    async fn update(
        &self,
        id: VariantId,
        patch: VariantPatch,
    ) -> AppResult<Option<VariantConfiguration>> {
        let row = sqlx::query_as::<_, VariantRow>(&format!(
            r#"
            UPDATE variants
            SET price = COALESCE($2, price),
                status = COALESCE($3, status),
                is_deleted = COALESCE($4, is_deleted),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(patch.price)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.is_deleted)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VariantConfiguration::try_from).transpose()
    }
}

// =============================================================================
// INVENTORY
// =============================================================================

#[async_trait]
impl InventoryStore for Database {
    async fn initialize(
        &self,
        variant_id: VariantId,
        seed: &InventorySeed,
    ) -> AppResult<InventoryRecord> {
        let started = Instant::now();

        // Record and seed row are written together or not at all; a second
        // call hits the conflict and writes nothing.
        sqlx::query(
            r#"
            WITH inserted AS (
                INSERT INTO inventory
                    (id, variant_id, total_stock, reserved_stock, low_stock_threshold, warehouse)
                VALUES ($1, $2, $3, 0, $4, $5)
                ON CONFLICT (variant_id) DO NOTHING
                RETURNING id, variant_id, total_stock, created_at
            )
            INSERT INTO inventory_transactions
                (id, inventory_id, variant_id, kind, quantity, stock_before, stock_after,
                 reference, created_at)
            SELECT $6, id, variant_id, 'IN', total_stock, 0, total_stock, $7, created_at
            FROM inserted
            WHERE total_stock > 0
            "#,
        )
        .bind(InventoryId::new().as_uuid())
        .bind(variant_id.as_uuid())
        .bind(seed.initial_stock.max(0))
        .bind(seed.low_stock_threshold)
        .bind(&seed.warehouse)
        .bind(TransactionId::new().as_uuid())
        .bind(INITIAL_STOCK_REFERENCE)
        .execute(&self.pool)
        .await?;
        observe("initialize_inventory", started);

        self.fetch_inventory(variant_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("inventory for {variant_id} vanished")))
    }

    async fn apply(
        &self,
        variant_id: VariantId,
        change: &StockChange,
    ) -> AppResult<(InventoryRecord, InventoryTransaction)> {
        let started = Instant::now();
        let transaction_id = TransactionId::new();

        let row = sqlx::query_as::<_, InventoryRow>(&apply_statement())
            .bind(variant_id.as_uuid())
            .bind(change.total_delta)
            .bind(change.reserved_delta)
            .bind(change.allow_discontinued)
            .bind(transaction_id.as_uuid())
            .bind(change.kind.as_str())
            .bind(change.ledger_quantity())
            .bind(change.reference.as_deref())
            .fetch_optional(&self.pool)
            .await?;
        observe("apply_stock_change", started);

        let Some(row) = row else {
            // Guard failed or record missing: report against the current state.
            return Err(match self.fetch_inventory(variant_id).await? {
                Some(record) => change.rejection(&record),
                None => AppError::NotFound(format!("inventory for variant {variant_id}")),
            });
        };

        let record = InventoryRecord::from(row);
        let entry = InventoryTransaction {
            id: transaction_id,
            inventory_id: record.id,
            variant_id,
            kind: change.kind,
            quantity: change.ledger_quantity(),
            stock_before: record.total_stock - change.total_delta,
            stock_after: record.total_stock,
            reference: change.reference.clone(),
            created_at: record.updated_at,
        };

        Ok((record, entry))
    }

    async fn get(&self, variant_id: VariantId) -> AppResult<Option<InventoryRecord>> {
        self.fetch_inventory(variant_id).await
    }

    async fn set_discontinued(
        &self,
        variant_id: VariantId,
        discontinued: bool,
    ) -> AppResult<InventoryRecord> {
        let row = sqlx::query_as::<_, InventoryRow>(&format!(
            r#"
            UPDATE inventory
            SET discontinued = $2, updated_at = NOW()
            WHERE variant_id = $1
            RETURNING {INVENTORY_COLUMNS}
            "#
        ))
        .bind(variant_id.as_uuid())
        .bind(discontinued)
        .fetch_optional(&self.pool)
        .await?;

        row.map(InventoryRecord::from)
            .ok_or_else(|| AppError::NotFound(format!("inventory for variant {variant_id}")))
    }

    async fn history(
        &self,
        variant_id: VariantId,
        limit: i64,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, inventory_id, variant_id, kind, quantity, stock_before, stock_after,
                   reference, created_at
            FROM inventory_transactions
            WHERE variant_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2
            "#,
        )
        .bind(variant_id.as_uuid())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        observe("inventory_history", started);

        rows.into_iter().map(InventoryTransaction::try_from).collect()
    }

    async fn low_stock(&self) -> AppResult<Vec<InventoryRecord>> {
        let started = Instant::now();
        let rows = sqlx::query_as::<_, InventoryRow>(&format!(
            r#"
            SELECT {INVENTORY_COLUMNS}
            FROM inventory
            WHERE NOT discontinued AND (total_stock - reserved_stock) < low_stock_threshold
            ORDER BY (total_stock - reserved_stock) ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;
        observe("low_stock", started);

        Ok(rows.into_iter().map(InventoryRecord::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_steps_are_idempotent() {
        for (name, statement) in SCHEMA {
            let sql = statement.trim_start().to_uppercase();
            let idempotent = sql.contains("IF NOT EXISTS")
                || sql.starts_with("CREATE OR REPLACE")
                || sql.starts_with("DROP TRIGGER IF EXISTS")
                || name.ends_with("trigger");
            assert!(idempotent, "schema step {name} cannot be re-run safely");
        }
    }

    #[test]
    fn test_stock_mutation_is_guarded_in_sql() {
        let (_, inventory) = SCHEMA
            .iter()
            .find(|(name, _)| *name == "inventory")
            .expect("inventory table");
        assert!(inventory.contains("reserved_stock >= 0 AND reserved_stock <= total_stock"));

        // The guards live in the UPDATE's WHERE clause, and the ledger insert
        // only reads rows that UPDATE returned.
        let statement = apply_statement();
        let update = &statement[..statement.find("RETURNING").expect("RETURNING clause")];
        assert!(update.contains("WHERE variant_id = $1"));
        assert!(update.contains("AND reserved_stock + $3 >= 0"));
        assert!(update.contains("AND (total_stock + $2) - (reserved_stock + $3) >= 0"));
        assert!(update.contains("AND ($4 OR NOT discontinued)"));
        assert!(statement.contains("FROM updated"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs a PostgreSQL database in DATABASE_URL"]
    async fn test_concurrent_reserves_never_oversell_in_postgres() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL");
        let db = Database::connect(&url).await.unwrap();
        db.run_migrations().await.unwrap();

        let product_id = ProductId::new();
        let variant_id = VariantId::new();
        db.insert_batch(
            product_id,
            vec![NewVariant {
                id: variant_id,
                attributes: vec![],
                config_hash: crate::persistence::config_hash(product_id, &[]),
                sku: format!("GUARD-{variant_id}"),
                price: Decimal::ONE_HUNDRED,
            }],
        )
        .await
        .unwrap();
        let seed = InventorySeed {
            initial_stock: 7,
            low_stock_threshold: 2,
            warehouse: "DEFAULT".into(),
        };
        db.initialize(variant_id, &seed).await.unwrap();

        let change = StockChange::reserve(1, None).unwrap();
        let tasks: Vec<_> = (0..40)
            .map(|_| {
                let db = db.clone();
                let change = change.clone();
                tokio::spawn(async move { db.apply(variant_id, &change).await })
            })
            .collect();

        let mut reserved = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => reserved += 1,
                Err(AppError::InsufficientStock { .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(reserved, 7);

        let record = db.fetch_inventory(variant_id).await.unwrap().unwrap();
        assert_eq!(record.reserved_stock, 7);
        assert_eq!(record.available_stock, 0);
        // Seed row plus one row per successful reservation.
        assert_eq!(db.history(variant_id, 100).await.unwrap().len(), 8);
    }
}
