// =============================================================================
// MODELS MODULE
// =============================================================================
// Data structures shared by the catalog, the generator, the variant store
// and the inventory ledger, followed by the API request/response shapes.
// =============================================================================

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::ids::{
    AttributeTypeId, AttributeValueId, CompatibilityRuleId, InventoryId, ProductId, TransactionId,
    VariantId,
};

/// Implements `as_str` / `Display` / `FromStr` for a fieldless enum stored
/// as text. Unknown strings are rejected rather than defaulted.
macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(AppError::Internal(format!(
                        "unknown {} {:?}", $label, other
                    ))),
                }
            }
        }
    };
}

// =============================================================================
// ATTRIBUTE CATALOG
// =============================================================================

/// Rendering hint for the admin UI. Carried through, never interpreted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeInputType {
    Select,
    Color,
    Button,
    Text,
}

text_enum!(AttributeInputType, "input type", {
    Select => "select",
    Color => "color",
    Button => "button",
    Text => "text",
});

/// A variant dimension (Color, Storage, RAM ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeType {
    pub id: AttributeTypeId,

    /// Machine name, e.g. "storage"
    pub name: String,

    /// Label shown in the admin panel, e.g. "Storage"
    pub display_name: String,

    pub input_type: AttributeInputType,

    /// Only participating types may be selected for generation
    pub participates_in_variants: bool,

    /// Higher priority types are enumerated first
    pub variant_priority: i32,
}

/// A price adjustment attached to an attribute value.
///
/// Serialized as a tagged object so a misspelled kind is rejected at the
/// boundary instead of silently pricing as zero:
///
/// ```json
/// { "kind": "FIXED", "amount": "200" }
/// { "kind": "PERCENTAGE", "amount": "5" }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceModifier {
    /// Added to the base price in currency units
    Fixed { amount: Decimal },
    /// Applied after fixed deltas, in percent (5 means +5%)
    Percentage { amount: Decimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueStatus {
    Active,
    Inactive,
    Deleted,
}

text_enum!(ValueStatus, "value status", {
    Active => "active",
    Inactive => "inactive",
    Deleted => "deleted",
});

/// One concrete option within an attribute type ("Red", "512GB")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeValue {
    pub id: AttributeValueId,

    /// Owning type; a value belongs to exactly one type
    pub attribute_type_id: AttributeTypeId,

    pub value: String,
    pub display_name: String,

    /// Zero or more modifiers; a value may carry both kinds
    #[serde(default)]
    pub price_modifiers: Vec<PriceModifier>,

    /// Short code used when building SKUs, e.g. "512"
    pub sku_fragment: String,

    /// Display ordering inside the type
    #[serde(default)]
    pub sort_order: i32,

    pub status: ValueStatus,
}

impl AttributeValue {
    pub fn is_active(&self) -> bool {
        self.status == ValueStatus::Active
    }
}

/// Directed compatibility constraint between two attribute types.
///
/// When the parent value (or any value of the parent type when
/// `parent_value_id` is `None`) is part of a combination:
/// - `is_forbidden`: the listed child values may not appear with it
///   (an empty list forbids every value of the child type)
/// - `is_required`: the child type must take one of the listed values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityRule {
    pub id: CompatibilityRuleId,
    pub parent_type_id: AttributeTypeId,
    pub parent_value_id: Option<AttributeValueId>,
    pub child_type_id: AttributeTypeId,
    #[serde(default)]
    pub allowed_child_value_ids: Vec<AttributeValueId>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_forbidden: bool,
}

// =============================================================================
// VARIANT CONFIGURATION
// =============================================================================

/// One (type, value) pair of a combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantAttribute {
    pub attribute_type_id: AttributeTypeId,
    pub attribute_value_id: AttributeValueId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantStatus {
    Active,
    Inactive,
    OutOfStock,
}

text_enum!(VariantStatus, "variant status", {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
    OutOfStock => "OUT_OF_STOCK",
});

/// A generated, persisted variant of a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantConfiguration {
    pub id: VariantId,
    pub product_id: ProductId,

    /// Pairs in canonical enumeration order
    pub attributes: Vec<VariantAttribute>,

    /// Stable hash of product + sorted pairs; unique per product
    pub config_hash: String,

    /// Unique across all products
    pub sku: String,

    pub price: Decimal,
    pub status: VariantStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// INVENTORY
// =============================================================================

/// Derived stock state; only `Discontinued` is backed by a stored flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    OutOfStock,
    LowStock,
    InStock,
    Discontinued,
}

impl StockStatus {
    pub fn derive(available: i64, threshold: i64, discontinued: bool) -> Self {
        if discontinued {
            StockStatus::Discontinued
        } else if available <= 0 {
            StockStatus::OutOfStock
        } else if available < threshold {
            StockStatus::LowStock
        } else {
            StockStatus::InStock
        }
    }
}

/// Live stock counters for one variant.
///
/// `available_stock` and `status` are always recomputed from the stored
/// counters through [`InventoryRecord::from_counters`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: InventoryId,
    pub variant_id: VariantId,
    pub total_stock: i64,
    pub reserved_stock: i64,
    pub available_stock: i64,
    pub low_stock_threshold: i64,

    /// Location code the stock is held at
    pub warehouse: String,

    pub discontinued: bool,
    pub status: StockStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn from_counters(
        id: InventoryId,
        variant_id: VariantId,
        total_stock: i64,
        reserved_stock: i64,
        low_stock_threshold: i64,
        warehouse: String,
        discontinued: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let available_stock = total_stock - reserved_stock;
        Self {
            id,
            variant_id,
            total_stock,
            reserved_stock,
            available_stock,
            low_stock_threshold,
            warehouse,
            discontinued,
            status: StockStatus::derive(available_stock, low_stock_threshold, discontinued),
            created_at,
            updated_at,
        }
    }

    pub fn is_low_stock(&self) -> bool {
        !self.discontinued && self.available_stock < self.low_stock_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Stock received (restock, customer return, initial stock)
    In,
    /// Reserved stock shipped and removed from total
    Out,
    Reserved,
    Released,
    /// Manual correction
    Adjustment,
    /// Inter-warehouse move; not produced by this service
    Transfer,
}

text_enum!(TransactionKind, "transaction kind", {
    In => "IN",
    Out => "OUT",
    Reserved => "RESERVED",
    Released => "RELEASED",
    Adjustment => "ADJUSTMENT",
    Transfer => "TRANSFER",
});

/// Append-only ledger row.
///
/// `quantity` is the signed change applied to the counter the kind acts on
/// (total for IN/OUT/ADJUSTMENT, reserved for RESERVED/RELEASED).
/// `stock_before`/`stock_after` always snapshot total stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: TransactionId,
    pub inventory_id: InventoryId,
    pub variant_id: VariantId,
    pub kind: TransactionKind,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,

    /// Order number, return id, or free-text reason
    pub reference: Option<String>,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// API REQUEST/RESPONSE STRUCTURES
// =============================================================================

/// Values chosen for one attribute type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSelection {
    pub attribute_type_id: AttributeTypeId,
    pub attribute_value_ids: Vec<AttributeValueId>,
}

/// Product-level inputs for generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseProductData {
    /// Prefix for every generated SKU, e.g. "IPH15"
    pub base_sku: String,

    pub base_price: Decimal,

    /// Seed stock for each newly created variant (default 0)
    #[serde(default)]
    pub initial_stock: Option<i64>,

    #[serde(default)]
    pub low_stock_threshold: Option<i64>,
}

// -----------------------------------------------------------------------------
// GENERATE VARIANTS REQUEST
// -----------------------------------------------------------------------------
/// Request body for variant generation
///
/// # Example JSON
/// ```json
/// {
///   "selections": [
///     { "attribute_type_id": "…", "attribute_value_ids": ["…", "…"] }
///   ],
///   "base_product_data": { "base_sku": "IPH15", "base_price": 1000 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateVariantsRequest {
    pub selections: Vec<AttributeSelection>,
    pub base_product_data: BaseProductData,
}

/// Response after a generation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateVariantsResponse {
    /// Variants actually created by this call
    pub total_generated: usize,

    /// Combinations already present for the product
    pub skipped_duplicates: usize,

    pub variants: Vec<VariantConfiguration>,
}

/// Explicit admin edit of a variant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateVariantRequest {
    pub price: Option<Decimal>,
    pub status: Option<VariantStatus>,
}

/// Body for reserve / commit / release / restock
///
/// ```json
/// { "quantity": 2, "reference": "ORD-12345" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockQuantityRequest {
    pub quantity: i64,

    #[serde(default)]
    pub reference: Option<String>,
}

/// Body for manual stock adjustments
///
/// ```json
/// { "delta": -3, "reason": "cycle count correction" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustStockRequest {
    /// Amount to adjust (positive to add, negative to remove)
    pub delta: i64,

    /// Reason for adjustment (for audit trail)
    pub reason: String,
}

/// Represents a low stock alert for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub variant_id: VariantId,
    pub available: i64,
    pub threshold: i64,
    pub warehouse: String,
}

impl From<&InventoryRecord> for LowStockAlert {
    fn from(record: &InventoryRecord) -> Self {
        Self {
            variant_id: record.variant_id,
            available: record.available_stock,
            threshold: record.low_stock_threshold,
            warehouse: record.warehouse.clone(),
        }
    }
}

// =============================================================================
// HEALTH CHECK RESPONSES
// =============================================================================

/// Simple health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Detailed readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

/// Individual dependency health checks
#[derive(Debug, Serialize)]
pub struct ReadinessChecks {
    pub storage: bool,

    /// `None` when no cache is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<bool>,
}

// =============================================================================
// ERROR RESPONSES
// =============================================================================

/// API error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type/code
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }
}
