// =============================================================================
// COMBINATION GENERATOR
// =============================================================================
// Turns a product's attribute selections into the list of valid value
// combinations.
//
// ALGORITHM:
// 1. Validate the selections against the catalog (types participate in
//    variants, values are active and owned by the stated type)
// 2. Order dimensions by variant_priority DESC, then declaration order
// 3. Prefetch every compatibility rule that can apply and build a RuleSet
// 4. Extend a frontier of partial combinations one dimension at a time,
//    dropping a partial path as soon as a rule rejects it
// =============================================================================

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::catalog::{AttributeCatalog, CompatibilityRules};
use crate::compatibility::{RuleSet, Verdict};
use crate::error::{AppError, AppResult};
use crate::ids::{AttributeTypeId, AttributeValueId, CompatibilityRuleId, ProductId};
use crate::models::{AttributeSelection, AttributeType, AttributeValue, VariantAttribute};

/// One valid assignment of exactly one value per selected type
#[derive(Debug, Clone)]
pub struct CandidateCombination {
    /// Pairs in canonical dimension order
    pub pairs: Vec<VariantAttribute>,

    /// Value records, index-aligned with `pairs`
    pub values: Vec<AttributeValue>,
}

/// A validated, ordered attribute dimension
#[derive(Debug, Clone)]
pub struct Dimension {
    pub attribute_type: AttributeType,
    pub values: Vec<AttributeValue>,
}

/// Result of the pruned enumeration
#[derive(Debug, Default)]
pub struct Enumeration {
    pub combinations: Vec<CandidateCombination>,

    /// Partial paths dropped by a rule
    pub pruned_paths: usize,

    /// First required rule found impossible to satisfy, if any
    pub unsatisfiable_rule: Option<CompatibilityRuleId>,
}

#[derive(Clone)]
pub struct CombinationGenerator {
    catalog: Arc<dyn AttributeCatalog>,
    rules: Arc<dyn CompatibilityRules>,
}

impl CombinationGenerator {
    pub fn new(catalog: Arc<dyn AttributeCatalog>, rules: Arc<dyn CompatibilityRules>) -> Self {
        Self { catalog, rules }
    }

    /// Enumerate every valid combination for `selections`.
    ///
    /// # Errors
    /// - `NoVariantAttributesSelected` when `selections` is empty
    /// - `InvalidAttributeSelection` for unknown, inactive, misowned or
    ///   non-variant attributes
    /// - `UnsatisfiableConstraint` when the rules leave nothing to generate
    #[instrument(skip(self, selections), fields(product_id = %product_id))]
    pub async fn generate(
        &self,
        product_id: ProductId,
        selections: &[AttributeSelection],
    ) -> AppResult<Vec<CandidateCombination>> {
        let dimensions = self.resolve_dimensions(selections).await?;
        let rules = self.load_rules(&dimensions).await?;

        let result = enumerate(&dimensions, &rules);

        debug!(
            dimensions = dimensions.len(),
            rules = rules.len(),
            combinations = result.combinations.len(),
            pruned_paths = result.pruned_paths,
            "Enumerated variant combinations"
        );

        if result.combinations.is_empty() {
            let reason = match result.unsatisfiable_rule {
                Some(rule_id) => format!(
                    "required rule {rule_id} has no allowed value among the selected attributes"
                ),
                None => "every combination is excluded by compatibility rules".to_string(),
            };
            return Err(AppError::UnsatisfiableConstraint(reason));
        }

        Ok(result.combinations)
    }

    /// Validate selections against the catalog and return them in canonical
    /// enumeration order.
    pub async fn resolve_dimensions(
        &self,
        selections: &[AttributeSelection],
    ) -> AppResult<Vec<Dimension>> {
        if selections.is_empty() {
            return Err(AppError::NoVariantAttributesSelected);
        }

        let mut seen_types = HashSet::new();
        for selection in selections {
            if !seen_types.insert(selection.attribute_type_id) {
                return Err(AppError::InvalidAttributeSelection(format!(
                    "attribute type {} is selected more than once",
                    selection.attribute_type_id
                )));
            }
            if selection.attribute_value_ids.is_empty() {
                return Err(AppError::InvalidAttributeSelection(format!(
                    "no values selected for attribute type {}",
                    selection.attribute_type_id
                )));
            }
        }

        let type_ids: Vec<AttributeTypeId> =
            selections.iter().map(|s| s.attribute_type_id).collect();

        let types: HashMap<AttributeTypeId, AttributeType> = self
            .catalog
            .get_types(&type_ids)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let values: HashMap<AttributeValueId, AttributeValue> = self
            .catalog
            .get_active_values(&type_ids)
            .await?
            .into_iter()
            .filter(|v| v.is_active())
            .map(|v| (v.id, v))
            .collect();

        let mut dimensions = Vec::with_capacity(selections.len());
        for selection in selections {
            let attribute_type = types
                .get(&selection.attribute_type_id)
                .cloned()
                .ok_or_else(|| {
                    AppError::InvalidAttributeSelection(format!(
                        "unknown attribute type {}",
                        selection.attribute_type_id
                    ))
                })?;

            if !attribute_type.participates_in_variants {
                return Err(AppError::InvalidAttributeSelection(format!(
                    "attribute type {} ({}) does not participate in variants",
                    attribute_type.id, attribute_type.name
                )));
            }

            let mut picked = Vec::with_capacity(selection.attribute_value_ids.len());
            let mut seen_values = HashSet::new();
            for value_id in &selection.attribute_value_ids {
                if !seen_values.insert(*value_id) {
                    continue;
                }
                let value = values.get(value_id).ok_or_else(|| {
                    AppError::InvalidAttributeSelection(format!(
                        "attribute value {value_id} is unknown or not active"
                    ))
                })?;
                if value.attribute_type_id != attribute_type.id {
                    return Err(AppError::InvalidAttributeSelection(format!(
                        "attribute value {value_id} does not belong to attribute type {}",
                        attribute_type.id
                    )));
                }
                picked.push(value.clone());
            }

            // Stable: request order breaks sort_order ties.
            picked.sort_by_key(|v| v.sort_order);

            dimensions.push(Dimension {
                attribute_type,
                values: picked,
            });
        }

        // Stable: declaration order breaks priority ties.
        dimensions.sort_by_key(|d| Reverse(d.attribute_type.variant_priority));

        Ok(dimensions)
    }

    /// Fetch every rule whose parent is one of the selected values (or a
    /// wildcard on a selected type).
    async fn load_rules(&self, dimensions: &[Dimension]) -> AppResult<RuleSet> {
        let mut rules = Vec::new();
        let mut selected: HashMap<AttributeTypeId, HashSet<AttributeValueId>> = HashMap::new();

        for dimension in dimensions {
            let type_id = dimension.attribute_type.id;
            rules.extend(self.rules.rules_for(type_id, None).await?);
            for value in &dimension.values {
                rules.extend(self.rules.rules_for(type_id, Some(value.id)).await?);
                selected.entry(type_id).or_default().insert(value.id);
            }
        }

        Ok(RuleSet::new(rules, selected))
    }
}

/// Pruned Cartesian product over `dimensions`, in order.
pub fn enumerate(dimensions: &[Dimension], rules: &RuleSet) -> Enumeration {
    let mut result = Enumeration::default();
    if dimensions.is_empty() {
        return result;
    }

    let mut frontier = vec![CandidateCombination {
        pairs: Vec::with_capacity(dimensions.len()),
        values: Vec::with_capacity(dimensions.len()),
    }];

    for dimension in dimensions {
        let mut next = Vec::with_capacity(frontier.len() * dimension.values.len());

        for partial in &frontier {
            for value in &dimension.values {
                let pair = VariantAttribute {
                    attribute_type_id: dimension.attribute_type.id,
                    attribute_value_id: value.id,
                };

                match rules.evaluate(&partial.pairs, pair) {
                    Verdict::Admit => {
                        let mut extended = partial.clone();
                        extended.pairs.push(pair);
                        extended.values.push(value.clone());
                        next.push(extended);
                    }
                    Verdict::Unsatisfiable(rule_id) => {
                        result.pruned_paths += 1;
                        result.unsatisfiable_rule.get_or_insert(rule_id);
                    }
                    Verdict::Forbidden(_) | Verdict::RequirementUnmet(_) => {
                        result.pruned_paths += 1;
                    }
                }
            }
        }

        frontier = next;
        if frontier.is_empty() {
            break;
        }
    }

    result.combinations = frontier;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::{AttributeInputType, CompatibilityRule, ValueStatus};

    fn attribute_type(name: &str, priority: i32) -> AttributeType {
        AttributeType {
            id: AttributeTypeId::new(),
            name: name.to_lowercase(),
            display_name: name.to_string(),
            input_type: AttributeInputType::Select,
            participates_in_variants: true,
            variant_priority: priority,
        }
    }

    fn value(ty: &AttributeType, name: &str, sort_order: i32) -> AttributeValue {
        AttributeValue {
            id: AttributeValueId::new(),
            attribute_type_id: ty.id,
            value: name.to_string(),
            display_name: name.to_string(),
            price_modifiers: vec![],
            sku_fragment: name.to_string(),
            sort_order,
            status: ValueStatus::Active,
        }
    }

    fn rule(
        parent: &AttributeValue,
        child_type: &AttributeType,
        listed: Vec<AttributeValueId>,
        required: bool,
        forbidden: bool,
    ) -> CompatibilityRule {
        CompatibilityRule {
            id: CompatibilityRuleId::new(),
            parent_type_id: parent.attribute_type_id,
            parent_value_id: Some(parent.id),
            child_type_id: child_type.id,
            allowed_child_value_ids: listed,
            is_required: required,
            is_forbidden: forbidden,
        }
    }

    fn select(ty: &AttributeType, values: &[&AttributeValue]) -> AttributeSelection {
        AttributeSelection {
            attribute_type_id: ty.id,
            attribute_value_ids: values.iter().map(|v| v.id).collect(),
        }
    }

    fn generator(store: &MemoryStore) -> CombinationGenerator {
        let store = Arc::new(store.clone());
        CombinationGenerator::new(store.clone(), store)
    }

    /// Full-combination rule check, independent of the pruning enumerator.
    fn satisfies_all(pairs: &[VariantAttribute], rules: &[CompatibilityRule]) -> bool {
        rules.iter().all(|rule| {
            let parent_present = pairs.iter().any(|p| {
                p.attribute_type_id == rule.parent_type_id
                    && rule.parent_value_id.map_or(true, |v| v == p.attribute_value_id)
            });
            if !parent_present {
                return true;
            }
            let child = pairs
                .iter()
                .find(|p| p.attribute_type_id == rule.child_type_id)
                .map(|p| p.attribute_value_id);
            if rule.is_forbidden {
                match child {
                    Some(v) => {
                        !(rule.allowed_child_value_ids.is_empty()
                            || rule.allowed_child_value_ids.contains(&v))
                    }
                    None => true,
                }
            } else if rule.is_required {
                child.map_or(false, |v| rule.allowed_child_value_ids.contains(&v))
            } else {
                true
            }
        })
    }

    /// Plain nested-loop product of every selected value.
    fn reference_product(selections: &[(AttributeTypeId, Vec<AttributeValueId>)]) -> Vec<Vec<VariantAttribute>> {
        let mut out: Vec<Vec<VariantAttribute>> = vec![vec![]];
        for (type_id, values) in selections {
            let mut next = Vec::new();
            for combo in &out {
                for value in values {
                    let mut c = combo.clone();
                    c.push(VariantAttribute {
                        attribute_type_id: *type_id,
                        attribute_value_id: *value,
                    });
                    next.push(c);
                }
            }
            out = next;
        }
        out
    }

    #[tokio::test]
    async fn test_forbidden_pair_yields_three_of_four() {
        let store = MemoryStore::new();
        let color = attribute_type("Color", 0);
        let storage = attribute_type("Storage", 0);
        let red = value(&color, "Red", 0);
        let blue = value(&color, "Blue", 1);
        let gb128 = value(&storage, "128GB", 0);
        let gb512 = value(&storage, "512GB", 1);
        store.add_type(color.clone());
        store.add_type(storage.clone());
        for v in [&red, &blue, &gb128, &gb512] {
            store.add_value(v.clone());
        }
        store
            .add_rule(rule(&gb512, &color, vec![red.id], false, true))
            .await;

        let combos = generator(&store)
            .generate(
                ProductId::new(),
                &[select(&color, &[&red, &blue]), select(&storage, &[&gb128, &gb512])],
            )
            .await
            .expect("generation succeeds");

        assert_eq!(combos.len(), 3);
        assert!(!combos.iter().any(|c| {
            c.pairs.iter().any(|p| p.attribute_value_id == red.id)
                && c.pairs.iter().any(|p| p.attribute_value_id == gb512.id)
        }));
    }

    #[tokio::test]
    async fn test_count_matches_reference_enumeration() {
        let store = MemoryStore::new();
        let color = attribute_type("Color", 1);
        let storage = attribute_type("Storage", 3);
        let ram = attribute_type("RAM", 2);
        let colors: Vec<_> = ["Black", "White", "Gold"]
            .iter()
            .enumerate()
            .map(|(i, n)| value(&color, n, i as i32))
            .collect();
        let storages: Vec<_> = ["128", "256", "512", "1TB"]
            .iter()
            .enumerate()
            .map(|(i, n)| value(&storage, n, i as i32))
            .collect();
        let rams: Vec<_> = ["8", "12", "16"]
            .iter()
            .enumerate()
            .map(|(i, n)| value(&ram, n, i as i32))
            .collect();

        for t in [&color, &storage, &ram] {
            store.add_type(t.clone());
        }
        for v in colors.iter().chain(&storages).chain(&rams) {
            store.add_value(v.clone());
        }

        let rules = vec![
            // 1TB only ships with 16GB RAM.
            rule(&storages[3], &ram, vec![rams[2].id], true, false),
            // Gold is not sold with 8GB or 12GB RAM.
            rule(&colors[2], &ram, vec![rams[0].id, rams[1].id], false, true),
            // 16GB RAM is never paired with 128.
            rule(&rams[2], &storage, vec![storages[0].id], false, true),
        ];
        for r in &rules {
            store.add_rule(r.clone()).await;
        }

        let selections = vec![
            select(&color, &colors.iter().collect::<Vec<_>>()),
            select(&storage, &storages.iter().collect::<Vec<_>>()),
            select(&ram, &rams.iter().collect::<Vec<_>>()),
        ];

        let combos = generator(&store)
            .generate(ProductId::new(), &selections)
            .await
            .expect("generation succeeds");

        let reference: Vec<_> = reference_product(&[
            (color.id, colors.iter().map(|v| v.id).collect()),
            (storage.id, storages.iter().map(|v| v.id).collect()),
            (ram.id, rams.iter().map(|v| v.id).collect()),
        ])
        .into_iter()
        .filter(|pairs| satisfies_all(pairs, &rules))
        .collect();

        assert_eq!(combos.len(), reference.len());
        for combo in &combos {
            assert!(satisfies_all(&combo.pairs, &rules));
        }

        // Storage (priority 3) first, then RAM (2), then Color (1).
        let order: Vec<_> = combos[0].pairs.iter().map(|p| p.attribute_type_id).collect();
        assert_eq!(order, vec![storage.id, ram.id, color.id]);
    }

    #[tokio::test]
    async fn test_requirement_on_unselected_type_is_unsatisfiable() {
        let store = MemoryStore::new();
        let color = attribute_type("Color", 0);
        let ram = attribute_type("RAM", 0);
        let red = value(&color, "Red", 0);
        let gb16 = value(&ram, "16", 0);
        store.add_type(color.clone());
        store.add_type(ram.clone());
        store.add_value(red.clone());
        store.add_value(gb16.clone());
        store
            .add_rule(rule(&red, &ram, vec![gb16.id], true, false))
            .await;

        // RAM is required by Red but not selected at all.
        let err = generator(&store)
            .generate(ProductId::new(), &[select(&color, &[&red])])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsatisfiableConstraint(_)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_selections() {
        let store = MemoryStore::new();
        let color = attribute_type("Color", 0);
        let mut material = attribute_type("Material", 0);
        material.participates_in_variants = false;
        let red = value(&color, "Red", 0);
        let mut green = value(&color, "Green", 1);
        green.status = ValueStatus::Inactive;
        let cotton = value(&material, "Cotton", 0);
        store.add_type(color.clone());
        store.add_type(material.clone());
        for v in [&red, &green, &cotton] {
            store.add_value(v.clone());
        }
        let generator = generator(&store);
        let product = ProductId::new();

        let empty = generator.generate(product, &[]).await.unwrap_err();
        assert!(matches!(empty, AppError::NoVariantAttributesSelected));

        let inactive = generator
            .generate(product, &[select(&color, &[&red, &green])])
            .await
            .unwrap_err();
        assert!(matches!(inactive, AppError::InvalidAttributeSelection(_)));

        let non_variant = generator
            .generate(product, &[select(&material, &[&cotton])])
            .await
            .unwrap_err();
        assert!(matches!(non_variant, AppError::InvalidAttributeSelection(_)));

        let misowned = generator
            .generate(
                product,
                &[AttributeSelection {
                    attribute_type_id: color.id,
                    attribute_value_ids: vec![cotton.id],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(misowned, AppError::InvalidAttributeSelection(_)));

        let unknown_type = generator
            .generate(
                product,
                &[AttributeSelection {
                    attribute_type_id: AttributeTypeId::new(),
                    attribute_value_ids: vec![red.id],
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(unknown_type, AppError::InvalidAttributeSelection(_)));
    }

    #[test]
    fn test_values_follow_sort_order_then_request_order() {
        let color = attribute_type("Color", 0);
        let a = value(&color, "A", 1);
        let b = value(&color, "B", 0);
        let c = value(&color, "C", 1);
        let dims = vec![Dimension {
            attribute_type: color,
            values: {
                let mut v = vec![a.clone(), b.clone(), c.clone()];
                v.sort_by_key(|x| x.sort_order);
                v
            },
        }];

        let result = enumerate(&dims, &RuleSet::default());
        let names: Vec<_> = result
            .combinations
            .iter()
            .map(|c| c.values[0].value.as_str())
            .collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }
}
