//! Attribute values resolved from study, series and instance metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator used when a multi-valued attribute is rendered as text.
pub const MULTI_VALUE_SEPARATOR: &str = "\\";

/// A metadata attribute value.
///
/// DICOM attributes are either text, numbers or multi-valued lists of those.
/// Booleans appear for synthetic attributes computed by the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Interpret the value as a number.
    ///
    /// Text is parsed after trimming; a single-element list is unwrapped.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::List(items) if items.len() == 1 => items[0].as_number(),
            _ => None,
        }
    }

    /// Interpret the value as an integer, rejecting fractional numbers.
    pub fn as_integer(&self) -> Option<i64> {
        let n = self.as_number()?;
        if n.fract() == 0.0 && n.is_finite() {
            Some(n as i64)
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Render the value as text. Lists are joined with `\`.
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
            Self::List(items) => items
                .iter()
                .map(Self::to_text)
                .collect::<Vec<_>>()
                .join(MULTI_VALUE_SEPARATOR),
        }
    }

    /// The individual values: list elements, or the value itself.
    pub fn elements(&self) -> Vec<&AttributeValue> {
        match self {
            Self::List(items) => items.iter().collect(),
            other => vec![other],
        }
    }

    /// True for empty text and empty lists.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_without_trailing_zero() {
        assert_eq!(AttributeValue::from(3).to_text(), "3");
        assert_eq!(AttributeValue::from(2.5).to_text(), "2.5");
    }

    #[test]
    fn text_parses_as_number() {
        assert_eq!(AttributeValue::from(" 12 ").as_number(), Some(12.0));
        assert_eq!(AttributeValue::from("CT").as_number(), None);
        assert_eq!(AttributeValue::from("1.5").as_integer(), None);
    }

    #[test]
    fn lists_join_with_backslash() {
        let value = AttributeValue::from(vec!["ORIGINAL", "PRIMARY", "AXIAL"]);
        assert_eq!(value.to_text(), "ORIGINAL\\PRIMARY\\AXIAL");
        assert_eq!(value.elements().len(), 3);
    }

    #[test]
    fn untagged_json_shapes() {
        let value: AttributeValue = serde_json::from_str(r#"["CT", 2]"#).unwrap();
        assert_eq!(
            value,
            AttributeValue::List(vec![
                AttributeValue::Text("CT".into()),
                AttributeValue::Number(2.0)
            ])
        );
        let value: AttributeValue = serde_json::from_str("true").unwrap();
        assert_eq!(value, AttributeValue::Bool(true));
    }
}
