// =============================================================================
// IDENTIFIERS
// =============================================================================
// Strongly typed ids for every stored entity. Each id is a UUID underneath,
// but a `VariantId` can never be passed where an `AttributeValueId` is
// expected, and every string coming in from a path or a row is parsed
// through `FromStr` before it reaches the core.
// =============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Parse a raw identifier, reporting `kind` on failure.
///
/// Rejects anything that is not a canonical UUID, including serialized
/// objects such as `"[object Object]"` that upstream callers sometimes leak
/// into id fields.
pub fn parse_id(kind: &'static str, raw: &str) -> Result<Uuid, AppError> {
    let trimmed = raw.trim();
    Uuid::parse_str(trimmed).map_err(|_| AppError::InvalidIdentifier {
        kind,
        value: trimmed.chars().take(64).collect(),
    })
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
            sqlx::Type,
        )]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_id($kind, s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Product owning a set of variants
    ProductId,
    "product"
);
entity_id!(
    /// Variant dimension such as Color or Storage
    AttributeTypeId,
    "attribute type"
);
entity_id!(
    /// One option within an attribute type
    AttributeValueId,
    "attribute value"
);
entity_id!(CompatibilityRuleId, "compatibility rule");
entity_id!(
    /// Generated variant configuration
    VariantId,
    "variant"
);
entity_id!(InventoryId, "inventory record");
entity_id!(
    /// Ledger row
    TransactionId,
    "inventory transaction"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_canonical_uuid() {
        let raw = "6f1c2a4e-3b7d-4f0a-9c1e-2d5b8a7e9f10";
        let id: VariantId = raw.parse().expect("valid id");
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn test_rejects_serialized_object() {
        let err = "[object Object]".parse::<AttributeValueId>().unwrap_err();
        match err {
            AppError::InvalidIdentifier { kind, value } => {
                assert_eq!(kind, "attribute value");
                assert_eq!(value, "[object Object]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_rejects_non_uuid_ids() {
        let parsed: Result<ProductId, _> = serde_json::from_str("\"not-a-uuid\"");
        assert!(parsed.is_err());
    }
}
