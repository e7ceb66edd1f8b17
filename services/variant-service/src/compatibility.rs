// =============================================================================
// COMPATIBILITY RULE EVALUATION
// =============================================================================
// A `RuleSet` is built once per generation from the rules prefetched for the
// selected values. Evaluation is a pure function of
// (partial combination, candidate pair), so the same enumeration order
// always prunes the same paths.
// =============================================================================

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::ids::{AttributeTypeId, AttributeValueId, CompatibilityRuleId};
use crate::models::{CompatibilityRule, VariantAttribute};

/// Outcome of checking one candidate pair against a partial combination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Admit,
    /// A forbidden rule matches the candidate
    Forbidden(CompatibilityRuleId),
    /// A required rule is contradicted by a value already chosen
    RequirementUnmet(CompatibilityRuleId),
    /// A required rule names a type not chosen yet, and none of its
    /// selected values are allowed
    Unsatisfiable(CompatibilityRuleId),
}

impl Verdict {
    pub fn is_admit(&self) -> bool {
        matches!(self, Verdict::Admit)
    }
}

/// Rules keyed by (parent type, parent value, child type), one per key.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompatibilityRule>,
    selected: HashMap<AttributeTypeId, HashSet<AttributeValueId>>,
}

impl RuleSet {
    /// Build a rule set for one generation.
    ///
    /// `selected` holds every value chosen per type; it is needed to decide
    /// whether a requirement on a not-yet-enumerated type can still be met.
    /// When several rules share a key the first one wins.
    pub fn new(
        rules: impl IntoIterator<Item = CompatibilityRule>,
        selected: HashMap<AttributeTypeId, HashSet<AttributeValueId>>,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::new();

        for rule in rules {
            if rule.parent_type_id == rule.child_type_id {
                warn!(rule_id = %rule.id, "Ignoring compatibility rule targeting its own type");
                continue;
            }
            if !rule.is_required && !rule.is_forbidden {
                continue;
            }
            let key = (rule.parent_type_id, rule.parent_value_id, rule.child_type_id);
            if !seen.insert(key) {
                warn!(
                    rule_id = %rule.id,
                    parent_type_id = %rule.parent_type_id,
                    child_type_id = %rule.child_type_id,
                    "Duplicate compatibility rule for the same key, keeping the first"
                );
                continue;
            }
            kept.push(rule);
        }

        Self {
            rules: kept,
            selected,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Check `candidate` against every value already in `partial`.
    pub fn evaluate(&self, partial: &[VariantAttribute], candidate: VariantAttribute) -> Verdict {
        // Rules where the candidate is the parent.
        for rule in self.rules.iter().filter(|r| parent_matches(r, &candidate)) {
            match partial
                .iter()
                .find(|p| p.attribute_type_id == rule.child_type_id)
            {
                Some(chosen) => {
                    if let Some(verdict) = check_child(rule, chosen.attribute_value_id) {
                        return verdict;
                    }
                }
                None => {
                    if rule.is_required && !rule.is_forbidden && !self.can_satisfy(rule) {
                        return Verdict::Unsatisfiable(rule.id);
                    }
                }
            }
        }

        // Rules where the candidate is the child of something already chosen.
        for rule in self
            .rules
            .iter()
            .filter(|r| r.child_type_id == candidate.attribute_type_id)
        {
            if partial.iter().any(|p| parent_matches(rule, p)) {
                if let Some(verdict) = check_child(rule, candidate.attribute_value_id) {
                    return verdict;
                }
            }
        }

        Verdict::Admit
    }

    /// Whether any selected value of the rule's child type is allowed by it.
    fn can_satisfy(&self, rule: &CompatibilityRule) -> bool {
        self.selected
            .get(&rule.child_type_id)
            .map(|values| {
                rule.allowed_child_value_ids
                    .iter()
                    .any(|allowed| values.contains(allowed))
            })
            .unwrap_or(false)
    }
}

fn parent_matches(rule: &CompatibilityRule, pair: &VariantAttribute) -> bool {
    rule.parent_type_id == pair.attribute_type_id
        && rule
            .parent_value_id
            .map_or(true, |value| value == pair.attribute_value_id)
}

fn check_child(rule: &CompatibilityRule, child_value: AttributeValueId) -> Option<Verdict> {
    let listed = rule.allowed_child_value_ids.contains(&child_value);
    if rule.is_forbidden {
        // An empty list forbids every value of the child type.
        if rule.allowed_child_value_ids.is_empty() || listed {
            return Some(Verdict::Forbidden(rule.id));
        }
    } else if rule.is_required && !listed {
        return Some(Verdict::RequirementUnmet(rule.id));
    }
    None
}
