//! Comparator registry.
//!
//! Every constraint names a `validator` and a `validatorOption`; the registry
//! maps that pair to one [`ComparatorKind`]. The kinds form a closed set so
//! evaluation is an exhaustive match rather than a string lookup.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};

use hp_model::{AttributeValue, Constraint, Operand};
use regex::Regex;
use serde::Serialize;

use crate::error::{MatchError, Result};

/// Compiled `regex` operands, keyed by pattern.
static REGEX_CACHE: LazyLock<Mutex<HashMap<String, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Patterns kept before the cache is cleared.
const REGEX_CACHE_CAPACITY: usize = 256;

fn compiled_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let mut cache = REGEX_CACHE.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(regex) = cache.get(pattern) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(pattern)?;
    if cache.len() >= REGEX_CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(pattern.to_string(), regex.clone());
    Ok(regex)
}

/// The evaluation function of a comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparatorKind {
    Equals,
    DoesNotEqual,
    Contains,
    ContainsIgnoreCase,
    DoesNotContain,
    StartsWith,
    EndsWith,
    NumericEquals,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    Range,
    Regex,
    OneOf,
    NoneOf,
    Exists,
}

impl ComparatorKind {
    /// Apply the comparator to an actual value.
    ///
    /// An absent value never matches, except for [`ComparatorKind::Exists`].
    /// Operands the comparator cannot use yield [`MatchError::InvalidOperand`].
    pub fn evaluate(self, actual: Option<&AttributeValue>, operand: &Operand) -> Result<bool> {
        // Operands are validated before the absence check so a malformed
        // rule is reported even when the attribute is missing.
        let check = self.prepare(operand)?;
        match (check, actual) {
            (Check::Exists(expected), actual) => {
                let present = actual.is_some_and(|value| !value.is_empty());
                Ok(present == expected)
            }
            (_, None) => Ok(false),
            (check, Some(actual)) => Ok(check.test(actual)),
        }
    }

    /// Check that `operand` is usable by this comparator without evaluating it.
    pub fn validate_operand(self, operand: &Operand) -> Result<()> {
        self.prepare(operand).map(|_| ())
    }

    fn prepare(self, operand: &Operand) -> Result<Check> {
        let value = || {
            operand
                .as_value()
                .ok_or_else(|| self.invalid("expected a value, found a range"))
        };
        let number = || {
            value()?
                .as_number()
                .ok_or_else(|| self.invalid("expected a number"))
        };
        let text = || value().map(AttributeValue::to_text);

        Ok(match self {
            Self::Equals => Check::Equals(value()?.clone(), false),
            Self::DoesNotEqual => Check::Equals(value()?.clone(), true),
            Self::Contains => Check::Contains(text()?, false, false),
            Self::ContainsIgnoreCase => Check::Contains(text()?.to_lowercase(), true, false),
            Self::DoesNotContain => Check::Contains(text()?, false, true),
            Self::StartsWith => Check::StartsWith(text()?),
            Self::EndsWith => Check::EndsWith(text()?),
            Self::NumericEquals => Check::Numeric(number()?, |a, b| a == b),
            Self::GreaterThan => Check::Numeric(number()?, |a, b| a > b),
            Self::GreaterThanOrEqualTo => Check::Numeric(number()?, |a, b| a >= b),
            Self::LessThan => Check::Numeric(number()?, |a, b| a < b),
            Self::LessThanOrEqualTo => Check::Numeric(number()?, |a, b| a <= b),
            Self::Range => {
                let (min, max) = operand
                    .as_range()
                    .ok_or_else(|| self.invalid("expected {min, max}"))?;
                if let (Some(min), Some(max)) = (min, max)
                    && min > max
                {
                    return Err(self.invalid(format!("min {min} exceeds max {max}")));
                }
                Check::Range(min, max)
            }
            Self::Regex => {
                let pattern = text()?;
                let regex = compiled_regex(&pattern).map_err(|e| self.invalid(e.to_string()))?;
                Check::Regex(regex)
            }
            Self::OneOf => Check::Within(value()?.clone(), false),
            Self::NoneOf => Check::Within(value()?.clone(), true),
            Self::Exists => Check::Exists(value()?.as_bool().unwrap_or(true)),
        })
    }

    fn invalid(self, reason: impl Into<String>) -> MatchError {
        MatchError::InvalidOperand {
            comparator: format!("{self:?}"),
            reason: reason.into(),
        }
    }
}

/// A comparator with its operand already validated.
enum Check {
    Equals(AttributeValue, bool),
    Contains(String, bool, bool),
    StartsWith(String),
    EndsWith(String),
    Numeric(f64, fn(f64, f64) -> bool),
    Range(Option<f64>, Option<f64>),
    Regex(Regex),
    Within(AttributeValue, bool),
    Exists(bool),
}

impl Check {
    fn test(&self, actual: &AttributeValue) -> bool {
        match self {
            Self::Equals(expected, negate) => {
                let equal = values_equal(actual, expected)
                    || actual.elements().iter().any(|item| values_equal(item, expected));
                equal != *negate
            }
            Self::Contains(needle, ignore_case, negate) => {
                let found = any_text(actual, |text| {
                    if *ignore_case {
                        text.to_lowercase().contains(needle.as_str())
                    } else {
                        text.contains(needle.as_str())
                    }
                });
                found != *negate
            }
            Self::StartsWith(prefix) => any_text(actual, |text| text.starts_with(prefix.as_str())),
            Self::EndsWith(suffix) => any_text(actual, |text| text.ends_with(suffix.as_str())),
            Self::Numeric(operand, op) => any_number(actual, |n| op(n, *operand)),
            Self::Range(min, max) => any_number(actual, |n| {
                min.is_none_or(|min| n >= min) && max.is_none_or(|max| n <= max)
            }),
            Self::Regex(regex) => any_text(actual, |text| regex.is_match(text)),
            Self::Within(set, negate) => {
                let options = set.elements();
                let found = actual
                    .elements()
                    .iter()
                    .any(|item| options.iter().any(|option| values_equal(item, option)));
                found != *negate
            }
            Self::Exists(expected) => *expected,
        }
    }
}

/// Equality on text, or on numbers when both sides are numeric.
fn values_equal(actual: &AttributeValue, expected: &AttributeValue) -> bool {
    let numeric = |value: &AttributeValue| match value {
        AttributeValue::Bool(_) => None,
        other => other.as_number(),
    };
    match (numeric(actual), numeric(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => actual.to_text() == expected.to_text(),
    }
}

/// True when the joined text or any single element satisfies `pred`.
fn any_text(actual: &AttributeValue, pred: impl Fn(&str) -> bool) -> bool {
    if pred(&actual.to_text()) {
        return true;
    }
    match actual {
        AttributeValue::List(items) => items.iter().any(|item| pred(&item.to_text())),
        _ => false,
    }
}

fn any_number(actual: &AttributeValue, pred: impl Fn(f64) -> bool) -> bool {
    actual
        .elements()
        .into_iter()
        .filter_map(AttributeValue::as_number)
        .any(pred)
}

/// A registered comparator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparator {
    pub id: String,
    pub validator: String,
    pub validator_option: String,
    pub kind: ComparatorKind,
}

/// Maps `(validator, validatorOption)` pairs to comparators.
///
/// Populated at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ComparatorRegistry {
    comparators: Vec<Comparator>,
    by_pair: HashMap<(String, String), usize>,
}

const BUILTINS: &[(&str, &str, &str, ComparatorKind)] = &[
    ("equals", "equals", "value", ComparatorKind::Equals),
    ("doesNotEqual", "doesNotEqual", "value", ComparatorKind::DoesNotEqual),
    ("contains", "contains", "value", ComparatorKind::Contains),
    ("containsI", "containsI", "value", ComparatorKind::ContainsIgnoreCase),
    ("doesNotContain", "doesNotContain", "value", ComparatorKind::DoesNotContain),
    ("startsWith", "startsWith", "value", ComparatorKind::StartsWith),
    ("endsWith", "endsWith", "value", ComparatorKind::EndsWith),
    ("numericEquals", "numericality", "equalTo", ComparatorKind::NumericEquals),
    ("greaterThan", "numericality", "greaterThan", ComparatorKind::GreaterThan),
    (
        "greaterThanOrEqualTo",
        "numericality",
        "greaterThanOrEqualTo",
        ComparatorKind::GreaterThanOrEqualTo,
    ),
    ("lessThan", "numericality", "lessThan", ComparatorKind::LessThan),
    (
        "lessThanOrEqualTo",
        "numericality",
        "lessThanOrEqualTo",
        ComparatorKind::LessThanOrEqualTo,
    ),
    ("range", "range", "value", ComparatorKind::Range),
    ("regex", "format", "pattern", ComparatorKind::Regex),
    ("oneOf", "inclusion", "within", ComparatorKind::OneOf),
    ("noneOf", "exclusion", "within", ComparatorKind::NoneOf),
    ("exists", "presence", "value", ComparatorKind::Exists),
];

impl ComparatorRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            comparators: Vec::new(),
            by_pair: HashMap::new(),
        }
    }

    /// A registry holding every built-in comparator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for (id, validator, option, kind) in BUILTINS {
            // Built-in ids and pairs are distinct.
            let _ = registry.register(*id, *validator, *option, *kind);
        }
        registry
    }

    /// Register a comparator. Ids and validator/option pairs must be unique.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        validator: impl Into<String>,
        validator_option: impl Into<String>,
        kind: ComparatorKind,
    ) -> Result<()> {
        let id = id.into();
        let key = (validator.into(), validator_option.into());
        if self.by_pair.contains_key(&key) || self.comparators.iter().any(|c| c.id == id) {
            return Err(MatchError::DuplicateComparator { id });
        }
        self.by_pair.insert(key.clone(), self.comparators.len());
        self.comparators.push(Comparator {
            id,
            validator: key.0,
            validator_option: key.1,
            kind,
        });
        Ok(())
    }

    pub fn resolve(&self, validator: &str, validator_option: &str) -> Result<&Comparator> {
        self.by_pair
            .get(&(validator.to_string(), validator_option.to_string()))
            .map(|&index| &self.comparators[index])
            .ok_or_else(|| MatchError::UnknownComparator {
                validator: validator.to_string(),
                option: validator_option.to_string(),
            })
    }

    pub fn resolve_constraint(&self, constraint: &Constraint) -> Result<&Comparator> {
        self.resolve(&constraint.validator, &constraint.option)
    }

    pub fn get(&self, id: &str) -> Option<&Comparator> {
        self.comparators.iter().find(|c| c.id == id)
    }

    /// Comparators in registration order.
    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(kind: ComparatorKind, actual: Option<AttributeValue>, operand: Operand) -> bool {
        kind.evaluate(actual.as_ref(), &operand).unwrap()
    }

    fn text(s: &str) -> Option<AttributeValue> {
        Some(AttributeValue::from(s))
    }

    #[test]
    fn builtins_resolve_by_pair() {
        let registry = ComparatorRegistry::with_builtins();
        assert_eq!(registry.comparators().len(), BUILTINS.len());
        let comparator = registry.resolve("numericality", "greaterThan").unwrap();
        assert_eq!(comparator.kind, ComparatorKind::GreaterThan);
        assert!(matches!(
            registry.resolve("numericality", "odd"),
            Err(MatchError::UnknownComparator { .. })
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ComparatorRegistry::with_builtins();
        let result = registry.register("myEquals", "equals", "value", ComparatorKind::Equals);
        assert!(matches!(result, Err(MatchError::DuplicateComparator { .. })));
        registry
            .register("iEquals", "equalsI", "value", ComparatorKind::ContainsIgnoreCase)
            .unwrap();
        assert_eq!(registry.get("iEquals").unwrap().validator, "equalsI");
    }

    #[test]
    fn equality_is_numeric_when_both_sides_are_numbers() {
        assert!(eval(ComparatorKind::Equals, text("CT"), "CT".into()));
        assert!(!eval(ComparatorKind::Equals, text("ct"), "CT".into()));
        assert!(eval(ComparatorKind::Equals, text("5.0"), 5i64.into()));
        assert!(eval(ComparatorKind::DoesNotEqual, text("MR"), "CT".into()));
        assert!(!eval(ComparatorKind::DoesNotEqual, None, "CT".into()));
    }

    #[test]
    fn multi_valued_attributes_match_any_element() {
        let image_type = Some(AttributeValue::from(vec!["ORIGINAL", "PRIMARY", "AXIAL"]));
        assert!(eval(ComparatorKind::Equals, image_type.clone(), "AXIAL".into()));
        assert!(eval(
            ComparatorKind::Equals,
            image_type.clone(),
            "ORIGINAL\\PRIMARY\\AXIAL".into()
        ));
        assert!(eval(ComparatorKind::StartsWith, image_type.clone(), "PRIM".into()));
        assert!(eval(ComparatorKind::OneOf, image_type, AttributeValue::from(vec!["LOCALIZER", "AXIAL"]).into()));
    }

    #[test]
    fn contains_variants() {
        assert!(eval(ComparatorKind::Contains, text("CT CHEST"), "CHEST".into()));
        assert!(!eval(ComparatorKind::Contains, text("CT CHEST"), "chest".into()));
        assert!(eval(ComparatorKind::ContainsIgnoreCase, text("CT CHEST"), "chest".into()));
        assert!(eval(ComparatorKind::DoesNotContain, text("CT HEAD"), "CHEST".into()));
        assert!(eval(ComparatorKind::EndsWith, text("T1 SAG"), "SAG".into()));
    }

    #[test]
    fn numeric_comparators() {
        let thickness = Some(AttributeValue::from(2.5));
        assert!(eval(ComparatorKind::GreaterThan, thickness.clone(), 2.0.into()));
        assert!(eval(ComparatorKind::LessThanOrEqualTo, thickness.clone(), 2.5.into()));
        assert!(!eval(ComparatorKind::LessThan, thickness.clone(), 2.5.into()));
        assert!(eval(ComparatorKind::NumericEquals, text("2.5"), 2.5.into()));
        assert!(!eval(ComparatorKind::GreaterThan, text("thick"), 1.0.into()));
    }

    #[test]
    fn range_is_inclusive_and_open_ended() {
        let range = |min, max| Operand::Range { min, max };
        let five = Some(AttributeValue::from(5));
        assert!(eval(ComparatorKind::Range, five.clone(), range(Some(5.0), Some(10.0))));
        assert!(eval(ComparatorKind::Range, five.clone(), range(Some(1.0), Some(5.0))));
        assert!(!eval(ComparatorKind::Range, five.clone(), range(Some(6.0), None)));
        assert!(eval(ComparatorKind::Range, five, range(None, Some(5.0))));
    }

    #[test]
    fn regex_searches_text() {
        assert!(eval(ComparatorKind::Regex, text("AX T2 FLAIR"), "(?i)flair".into()));
        assert!(!eval(ComparatorKind::Regex, text("AX T1"), "^T1".into()));
    }

    #[test]
    fn regex_patterns_are_compiled_once() {
        let pattern = "^SAG (T1|T2)$";
        for description in ["SAG T1", "SAG T2", "AX T1"] {
            eval(ComparatorKind::Regex, text(description), pattern.into());
        }
        let cache = REGEX_CACHE.lock().unwrap();
        assert!(cache.contains_key(pattern));
        assert!(!cache.contains_key("("));
    }

    #[test]
    fn exists_handles_absent_values() {
        assert!(eval(ComparatorKind::Exists, text("x"), true.into()));
        assert!(!eval(ComparatorKind::Exists, None, true.into()));
        assert!(eval(ComparatorKind::Exists, None, false.into()));
        assert!(!eval(ComparatorKind::Exists, text("  "), true.into()));
    }

    #[test]
    fn absent_values_never_match() {
        assert!(!eval(ComparatorKind::Equals, None, "CT".into()));
        assert!(!eval(ComparatorKind::NoneOf, None, AttributeValue::from(vec!["CT"]).into()));
    }

    #[test]
    fn invalid_operands_are_errors() {
        let bad_regex = ComparatorKind::Regex.evaluate(text("x").as_ref(), &"(".into());
        assert!(matches!(bad_regex, Err(MatchError::InvalidOperand { .. })));
        let bad_number = ComparatorKind::GreaterThan.evaluate(None, &"tall".into());
        assert!(matches!(bad_number, Err(MatchError::InvalidOperand { .. })));
        let inverted = ComparatorKind::Range.evaluate(
            None,
            &Operand::Range {
                min: Some(3.0),
                max: Some(1.0),
            },
        );
        assert!(inverted.is_err());
    }

    #[test]
    fn operands_validate_without_a_value() {
        assert!(ComparatorKind::Regex.validate_operand(&"^AX".into()).is_ok());
        assert!(matches!(
            ComparatorKind::Regex.validate_operand(&"[".into()),
            Err(MatchError::InvalidOperand { .. })
        ));
        assert!(ComparatorKind::LessThanOrEqualTo.validate_operand(&"wide".into()).is_err());
        assert!(ComparatorKind::Range.validate_operand(&"5".into()).is_err());
        assert!(
            ComparatorKind::Range
                .validate_operand(&Operand::Range {
                    min: Some(1.0),
                    max: None
                })
                .is_ok()
        );
    }
}
