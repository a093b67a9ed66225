//! Matching evaluator: scores an ordered rule list against one context.

use hp_model::{AttributeValue, Rule};
use serde::Serialize;
use tracing::{trace, warn};

use crate::comparator::ComparatorRegistry;
use crate::error::MatchError;
use crate::ranking::RankKey;
use crate::resolver::{AttributeResolver, MatchContext, MetadataProvider};

/// How a single rule fared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "reason")]
pub enum RuleOutcome {
    Passed,
    Failed,
    /// The attribute had no value and the comparator does not handle absence.
    Unresolved,
    /// The constraint names a comparator that is not registered.
    UnknownComparator,
    InvalidOperand(String),
}

impl RuleOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Per-rule evaluation record, kept for authoring feedback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResult {
    pub index: usize,
    pub attribute: String,
    pub required: bool,
    pub weight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<AttributeValue>,
    pub outcome: RuleOutcome,
}

/// Aggregate result of evaluating a rule list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutcome {
    /// Sum of the weights of satisfied rules.
    pub score: u32,
    pub all_required_satisfied: bool,
    /// Number of satisfied `required` rules (second tie-break key).
    pub required_satisfied: usize,
    pub details: Vec<RuleResult>,
}

impl MatchOutcome {
    /// Outcome of an empty rule list.
    pub fn empty() -> Self {
        Self {
            score: 0,
            all_required_satisfied: true,
            required_satisfied: 0,
            details: Vec::new(),
        }
    }

    pub fn rank_key(&self) -> RankKey {
        RankKey {
            score: self.score,
            required_satisfied: self.required_satisfied,
        }
    }
}

/// Evaluates rules through a comparator registry and attribute resolver.
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    registry: ComparatorRegistry,
    resolver: AttributeResolver,
}

impl Matcher {
    pub fn new(registry: ComparatorRegistry, resolver: AttributeResolver) -> Self {
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &ComparatorRegistry {
        &self.registry
    }

    pub fn resolver(&self) -> &AttributeResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut AttributeResolver {
        &mut self.resolver
    }

    /// Evaluate every rule; never stops at the first failure.
    ///
    /// Unknown comparators and invalid operands are logged and recorded as
    /// non-matching rules.
    pub fn evaluate(
        &self,
        rules: &[Rule],
        context: &MatchContext<'_>,
        provider: &dyn MetadataProvider,
    ) -> MatchOutcome {
        let mut outcome = MatchOutcome::empty();

        for (index, rule) in rules.iter().enumerate() {
            let actual = self.resolver.resolve(&rule.attribute, context, provider);
            let rule_outcome = match self.registry.resolve_constraint(&rule.constraint) {
                Err(error) => {
                    warn!(attribute = %rule.attribute, %error, "rule references unknown comparator");
                    RuleOutcome::UnknownComparator
                }
                Ok(comparator) => match comparator.kind.evaluate(actual.as_ref(), &rule.constraint.operand) {
                    Ok(true) => RuleOutcome::Passed,
                    Ok(false) if actual.is_none() => RuleOutcome::Unresolved,
                    Ok(false) => RuleOutcome::Failed,
                    Err(MatchError::InvalidOperand { reason, .. }) => {
                        warn!(
                            attribute = %rule.attribute,
                            comparator = %comparator.id,
                            %reason,
                            "rule has an invalid operand"
                        );
                        RuleOutcome::InvalidOperand(reason)
                    }
                    Err(error) => RuleOutcome::InvalidOperand(error.to_string()),
                },
            };

            let passed = rule_outcome.is_passed();
            trace!(
                index,
                attribute = %rule.attribute,
                required = rule.required,
                passed,
                "rule evaluated"
            );
            if passed {
                outcome.score += rule.weight;
                if rule.required {
                    outcome.required_satisfied += 1;
                }
            } else if rule.required {
                outcome.all_required_satisfied = false;
            }

            outcome.details.push(RuleResult {
                index,
                attribute: rule.attribute.clone(),
                required: rule.required,
                weight: rule.weight,
                actual,
                outcome: rule_outcome,
            });
        }

        outcome
    }
}
