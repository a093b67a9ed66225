//! Persistence error types.
//!
//! Errors carry enough context for a user-facing message and, where one
//! exists, a remediation hint.

use std::path::PathBuf;

use hp_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// File I/O error.
    #[error("Failed to {operation} file: {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid protocol document.
    #[error("Invalid protocol document: {path}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize protocols")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },

    #[error("Protocol document version {found} is not supported")]
    UnsupportedVersion { found: String, path: PathBuf },

    #[error("A protocol with id '{id}' already exists")]
    DuplicateId { id: String },

    #[error("Protocol '{id}' not found")]
    NotFound { id: String },

    /// Locked protocols are read-only; use "Save As".
    #[error("Protocol '{id}' is locked")]
    Locked { id: String },

    /// The backing file changed since it was loaded.
    #[error("Protocol file was modified by another process: {path}")]
    ModifiedExternally { path: PathBuf },

    #[error("Protocol '{id}' is invalid")]
    Invalid {
        id: String,
        #[source]
        source: ModelError,
    },
}

impl StoreError {
    /// Get a user-friendly message for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Io {
                operation, path, ..
            } => format!("Could not {} the file at {}", operation, path.display()),
            Self::Json { path, source } => format!(
                "The file at {} is not a valid protocol document: {}",
                path.display(),
                source
            ),
            Self::Serialization { .. } => {
                "An error occurred while writing the protocol data.".to_string()
            }
            Self::UnsupportedVersion { found, .. } => format!(
                "This protocol document uses format version {found}, which this version cannot read."
            ),
            Self::DuplicateId { id } => format!("A protocol with id '{id}' is already stored."),
            Self::NotFound { id } => format!("No protocol with id '{id}' is stored."),
            Self::Locked { id } => format!("Protocol '{id}' is locked and cannot be changed."),
            Self::ModifiedExternally { path } => format!(
                "The protocol file '{}' was changed outside this session.",
                path.display()
            ),
            Self::Invalid { id, source } => format!("Protocol '{id}' is invalid: {source}"),
        }
    }

    /// Get a suggestion for how to resolve this error.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Io { operation, .. } => {
                if *operation == "read" {
                    Some("Check that the file exists and you have permission to read it.".into())
                } else {
                    Some("Check that you have permission to write to this location.".into())
                }
            }
            Self::Json { .. } => Some("Make sure you selected a protocol JSON export.".into()),
            Self::Locked { .. } => {
                Some("Save a copy of the protocol under a new name and edit the copy.".into())
            }
            Self::ModifiedExternally { .. } => {
                Some("Reload the protocol file before saving again.".into())
            }
            Self::DuplicateId { .. } => Some("Clone the protocol to give it a new id.".into()),
            Self::Serialization { .. }
            | Self::UnsupportedVersion { .. }
            | Self::NotFound { .. }
            | Self::Invalid { .. } => None,
        }
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, StoreError>;
