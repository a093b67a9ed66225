//! Engine error types.

use std::path::PathBuf;

use hp_model::ModelError;
use hp_store::StoreError;
use thiserror::Error;

/// Errors surfaced to engine callers.
///
/// Rule-level problems never appear here; they are downgraded to
/// non-matching rules during evaluation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The protocol or layout violates a model invariant.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Failure reported by the persistence collaborator, unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No hanging protocol is active")]
    NoActiveProtocol,

    #[error("Protocol '{id}' is locked; clone it before editing")]
    ProtocolLocked { id: String },

    #[error("Failed to read engine config: {path}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid engine config: {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write engine config")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
