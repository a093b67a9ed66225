//! Error types for model construction and validation.

use thiserror::Error;

/// Errors raised when a model value violates one of its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// A constraint must name exactly one validator/option pair.
    #[error("Invalid constraint: {reason}")]
    InvalidConstraint { reason: String },

    /// Protocol identifiers must be non-empty.
    #[error("Protocol id must not be empty")]
    EmptyProtocolId,

    /// A protocol without stages cannot be displayed.
    #[error("Protocol '{protocol_id}' has no stages")]
    NoStages { protocol_id: String },

    /// Grid layouts need at least one row and one column.
    #[error("Invalid layout {rows} x {columns}")]
    InvalidLayout { rows: u32, columns: u32 },

    /// A layout may declare at most [`crate::layout::MAX_VIEWPORTS`] slots.
    #[error("Layout needs {count} viewports, at most {max} are supported")]
    LayoutTooLarge { count: usize, max: usize },
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
