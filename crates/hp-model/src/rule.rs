//! Matching rules and their constraints.
//!
//! A rule pairs a metadata attribute with a constraint. On the wire the
//! constraint keeps the `{ validator: { option: operand } }` shape used by
//! protocol documents:
//!
//! ```json
//! { "attribute": "Modality", "constraint": { "equals": { "value": "CT" } }, "required": true }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::value::AttributeValue;

/// Synthetic study attribute holding the chronological prior index
/// (0 = current study, 1 = most recent prior, -1 = oldest prior).
pub const ABSTRACT_PRIOR_VALUE: &str = "abstractPriorValue";

/// The level of the metadata hierarchy a viewport rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleLevel {
    Study,
    Series,
    Image,
}

impl RuleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Study => "study",
            Self::Series => "series",
            Self::Image => "image",
        }
    }
}

/// The operand a comparator checks the actual value against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    /// A scalar or list value.
    Value(AttributeValue),
    /// An inclusive numeric range; either bound may be omitted.
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
}

impl Operand {
    pub fn as_value(&self) -> Option<&AttributeValue> {
        match self {
            Self::Value(value) => Some(value),
            Self::Range { .. } => None,
        }
    }

    pub fn as_range(&self) -> Option<(Option<f64>, Option<f64>)> {
        match self {
            Self::Range { min, max } => Some((*min, *max)),
            Self::Value(_) => None,
        }
    }
}

impl From<AttributeValue> for Operand {
    fn from(value: AttributeValue) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::Value(value.into())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Self::Value(value.into())
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Self::Value(value.into())
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Self::Value(value.into())
    }
}

/// Names one comparator (validator + option) and its operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConstraintRepr", into = "ConstraintRepr")]
pub struct Constraint {
    pub validator: String,
    pub option: String,
    pub operand: Operand,
}

impl Constraint {
    pub fn new(validator: impl Into<String>, option: impl Into<String>, operand: Operand) -> Self {
        Self {
            validator: validator.into(),
            option: option.into(),
            operand,
        }
    }

    pub fn equals(value: impl Into<AttributeValue>) -> Self {
        Self::new("equals", "value", Operand::Value(value.into()))
    }

    pub fn does_not_equal(value: impl Into<AttributeValue>) -> Self {
        Self::new("doesNotEqual", "value", Operand::Value(value.into()))
    }

    pub fn contains(value: impl Into<String>) -> Self {
        Self::new("contains", "value", Operand::from(value.into()))
    }

    pub fn contains_ignore_case(value: impl Into<String>) -> Self {
        Self::new("containsI", "value", Operand::from(value.into()))
    }

    pub fn greater_than(value: f64) -> Self {
        Self::new("numericality", "greaterThan", Operand::from(value))
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Self::new("range", "value", Operand::Range { min, max })
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::new("format", "pattern", Operand::from(pattern.into()))
    }

    pub fn one_of<T: Into<AttributeValue>>(values: Vec<T>) -> Self {
        Self::new("inclusion", "within", Operand::Value(AttributeValue::from(values)))
    }

    pub fn exists(present: bool) -> Self {
        Self::new("presence", "value", Operand::from(present))
    }
}

/// Wire shape of a constraint: `{ validator: { option: operand } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
struct ConstraintRepr(BTreeMap<String, BTreeMap<String, Operand>>);

impl TryFrom<ConstraintRepr> for Constraint {
    type Error = ModelError;

    fn try_from(repr: ConstraintRepr) -> Result<Self, Self::Error> {
        let mut validators = repr.0.into_iter();
        let (validator, options) = match (validators.next(), validators.next()) {
            (Some(entry), None) => entry,
            (None, _) => {
                return Err(ModelError::InvalidConstraint {
                    reason: "no validator named".to_string(),
                });
            }
            (Some(_), Some(_)) => {
                return Err(ModelError::InvalidConstraint {
                    reason: "more than one validator named".to_string(),
                });
            }
        };
        let mut options = options.into_iter();
        match (options.next(), options.next()) {
            (Some((option, operand)), None) => Ok(Self {
                validator,
                option,
                operand,
            }),
            _ => Err(ModelError::InvalidConstraint {
                reason: format!("validator '{validator}' must name exactly one option"),
            }),
        }
    }
}

impl From<Constraint> for ConstraintRepr {
    fn from(constraint: Constraint) -> Self {
        let mut options = BTreeMap::new();
        options.insert(constraint.option, constraint.operand);
        let mut validators = BTreeMap::new();
        validators.insert(constraint.validator, options);
        Self(validators)
    }
}

fn default_weight() -> u32 {
    1
}

fn is_default_weight(weight: &u32) -> bool {
    *weight == 1
}

/// An attribute + comparator + operand triple.
///
/// A satisfied rule adds its `weight` to the match score. A `required` rule
/// that is not satisfied disqualifies the candidate it was evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub attribute: String,
    pub constraint: Constraint,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_weight", skip_serializing_if = "is_default_weight")]
    pub weight: u32,
}

impl Rule {
    pub fn new(attribute: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            id: None,
            attribute: attribute.into(),
            constraint,
            required: false,
            weight: default_weight(),
        }
    }

    /// Mark the rule as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Convenience for `abstractPriorValue == index` study rules.
    pub fn abstract_prior(index: i64) -> Self {
        Self::new(ABSTRACT_PRIOR_VALUE, Constraint::equals(index))
    }

    /// The prior index this rule targets, if it is an integer
    /// `abstractPriorValue` rule.
    pub fn abstract_prior_index(&self) -> Option<i64> {
        if self.attribute != ABSTRACT_PRIOR_VALUE {
            return None;
        }
        self.constraint.operand.as_value()?.as_integer()
    }
}
