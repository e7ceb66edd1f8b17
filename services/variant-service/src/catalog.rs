// =============================================================================
// CATALOG LOOKUPS
// =============================================================================
// Read-only catalog lookups consumed by the generator. The catalog itself
// (type/value CRUD, rule editing) belongs to the admin panel; this service
// only reads it through these two traits. Both the Postgres `Database` and
// the in-process `MemoryStore` implement them.
// =============================================================================

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::AppResult;
use crate::ids::{AttributeTypeId, AttributeValueId, CompatibilityRuleId};
use crate::models::{
    AttributeInputType, AttributeType, AttributeValue, CompatibilityRule, PriceModifier,
    ValueStatus,
};

#[async_trait]
pub trait AttributeCatalog: Send + Sync {
    /// Types with the given ids. Unknown ids are simply absent from the result.
    async fn get_types(&self, ids: &[AttributeTypeId]) -> AppResult<Vec<AttributeType>>;

    /// Every *active* value owned by one of the given types.
    async fn get_active_values(
        &self,
        type_ids: &[AttributeTypeId],
    ) -> AppResult<Vec<AttributeValue>>;
}

#[async_trait]
pub trait CompatibilityRules: Send + Sync {
    /// Rules whose parent is exactly `(parent_type_id, parent_value_id)`.
    ///
    /// `parent_value_id = None` asks for the wildcard rules that apply to any
    /// value of the parent type.
    async fn rules_for(
        &self,
        parent_type_id: AttributeTypeId,
        parent_value_id: Option<AttributeValueId>,
    ) -> AppResult<Vec<CompatibilityRule>>;
}

// =============================================================================
// SAMPLE CATALOG
// =============================================================================
// A small phone catalog loaded into empty stores so that a fresh dev
// environment can generate variants right away. Ids are fixed so they can
// be used directly in requests.
// =============================================================================

pub const SAMPLE_COLOR_TYPE: Uuid = Uuid::from_u128(0x5a3c_0001_0000_4000_8000_0000_0000_0001);
pub const SAMPLE_STORAGE_TYPE: Uuid = Uuid::from_u128(0x5a3c_0001_0000_4000_8000_0000_0000_0002);

#[derive(Debug, Clone)]
pub struct SampleCatalog {
    pub types: Vec<AttributeType>,
    pub values: Vec<AttributeValue>,
    pub rules: Vec<CompatibilityRule>,
}

fn sample_value(
    n: u128,
    attribute_type_id: AttributeTypeId,
    name: &str,
    fragment: &str,
    sort_order: i32,
    price_modifiers: Vec<PriceModifier>,
) -> AttributeValue {
    AttributeValue {
        id: AttributeValueId::from(Uuid::from_u128(0x5a3c_0002_0000_4000_8000_0000_0000_0000 + n)),
        attribute_type_id,
        value: name.to_string(),
        display_name: name.to_string(),
        price_modifiers,
        sku_fragment: fragment.to_string(),
        sort_order,
        status: ValueStatus::Active,
    }
}

pub fn sample_catalog() -> SampleCatalog {
    let color = AttributeType {
        id: AttributeTypeId::from(SAMPLE_COLOR_TYPE),
        name: "color".to_string(),
        display_name: "Color".to_string(),
        input_type: AttributeInputType::Color,
        participates_in_variants: true,
        variant_priority: 20,
    };
    let storage = AttributeType {
        id: AttributeTypeId::from(SAMPLE_STORAGE_TYPE),
        name: "storage".to_string(),
        display_name: "Storage".to_string(),
        input_type: AttributeInputType::Button,
        participates_in_variants: true,
        variant_priority: 10,
    };

    let fixed = |amount: i64| PriceModifier::Fixed {
        amount: Decimal::from(amount),
    };
    let pct = |amount: i64| PriceModifier::Percentage {
        amount: Decimal::from(amount),
    };

    let values = vec![
        sample_value(1, color.id, "Black", "BLK", 0, vec![]),
        sample_value(2, color.id, "Red", "RED", 1, vec![]),
        sample_value(3, color.id, "Blue", "BLU", 2, vec![]),
        sample_value(4, storage.id, "128GB", "128", 0, vec![]),
        sample_value(5, storage.id, "256GB", "256", 1, vec![fixed(100)]),
        sample_value(6, storage.id, "512GB", "512", 2, vec![fixed(200), pct(5)]),
    ];

    // Blue ships in 256GB and 512GB only.
    let rules = vec![CompatibilityRule {
        id: CompatibilityRuleId::from(Uuid::from_u128(0x5a3c_0003_0000_4000_8000_0000_0000_0001)),
        parent_type_id: color.id,
        parent_value_id: Some(values[2].id),
        child_type_id: storage.id,
        allowed_child_value_ids: vec![values[4].id, values[5].id],
        is_required: true,
        is_forbidden: false,
    }];

    SampleCatalog {
        types: vec![color, storage],
        values,
        rules,
    }
}
