//! Hanging protocol engine.
//!
//! The pipeline run on every trigger is:
//!
//! 1. [`select_best_protocol`] ranks protocols against the current study
//! 2. [`reconcile`] sizes the active stage's viewport array to its layout
//! 3. [`assign`] binds a study, series and instance to each viewport
//!
//! [`ProtocolEngine`] owns the state between runs (active protocol, stage and
//! focused viewport) and publishes bindings to a [`RenderSurface`].

pub mod assignment;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod selector;
pub mod surface;

pub use assignment::{
    Assignment, AssignmentOptions, BindingStatus, ViewportBinding, ViewportMatchDetails, assign,
};
pub use config::EngineConfig;
pub use engine::{EngineState, EngineStatus, ProtocolEngine};
pub use error::{EngineError, Result};
pub use layout::{ReconcileChange, derive_viewport_count, reconcile};
pub use selector::{ProtocolRank, Selection, rank_protocols, select_best_protocol};
pub use surface::RenderSurface;
