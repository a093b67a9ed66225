//! Data model for the hanging protocol engine.
//!
//! A [`Protocol`] is a named document made of [`Stage`]s. Each stage declares a
//! [`ViewportStructure`] (the layout) and one [`Viewport`] slot per layout cell.
//! Protocols and viewports carry ordered lists of [`Rule`]s that the matching
//! engine evaluates against study, series and instance metadata.
//!
//! All types serialize to the camelCase JSON layout used by protocol documents,
//! and a round trip preserves rule and stage order (order affects tie-breaks).

pub mod error;
pub mod layout;
pub mod protocol;
pub mod rule;
pub mod study;
pub mod value;

pub use error::{ModelError, Result};
pub use layout::{LayoutProperties, LayoutRegion, LayoutType, MAX_VIEWPORTS, ViewportStructure};
pub use protocol::{DEFAULT_PROTOCOL_ID, Protocol, Stage, Viewport};
pub use rule::{ABSTRACT_PRIOR_VALUE, Constraint, Operand, Rule, RuleLevel};
pub use study::{AttributeMap, Instance, Series, Study, StudySet};
pub use value::AttributeValue;
