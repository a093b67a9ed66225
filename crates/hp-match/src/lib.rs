//! Rule matching for hanging protocols.
//!
//! - [`ComparatorRegistry`]: the closed set of validator/option comparators
//! - [`AttributeResolver`]: resolves attribute names against a [`MatchContext`]
//!   through a [`MetadataProvider`] and registered custom attributes
//! - [`Matcher`]: evaluates ordered rule lists into a [`MatchOutcome`]
//! - [`rank`]: the shared tie-break policy for protocols, studies, series and
//!   instances

pub mod comparator;
pub mod error;
pub mod evaluator;
pub mod ranking;
pub mod resolver;

pub use comparator::{Comparator, ComparatorKind, ComparatorRegistry};
pub use error::{MatchError, Result};
pub use evaluator::{MatchOutcome, Matcher, RuleOutcome, RuleResult};
pub use ranking::{RankKey, Ranked, best, order, rank};
pub use resolver::{
    AttributeCallback, AttributeResolver, CustomAttribute, MatchContext, MetadataProvider,
    StudyMetadataProvider,
};
