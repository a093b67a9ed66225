//! Error types for comparator configuration and evaluation.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// A rule names a validator/option pair that is not registered.
    #[error("Unknown comparator '{validator}.{option}'")]
    UnknownComparator { validator: String, option: String },

    #[error("Comparator '{id}' is already registered")]
    DuplicateComparator { id: String },

    /// The operand cannot be used by the comparator (bad regex, non-numeric bound).
    #[error("Invalid operand for '{comparator}': {reason}")]
    InvalidOperand { comparator: String, reason: String },
}

pub type Result<T> = std::result::Result<T, MatchError>;
