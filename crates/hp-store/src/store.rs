//! The persistence contract consumed by the engine.

use hp_model::Protocol;

use crate::error::Result;
use crate::query::{ProtocolPatch, ProtocolQuery};

/// CRUD access to stored protocols.
///
/// Implementations return protocols in insertion order, since ranking ties
/// are broken by input order. `id` lookups are exact matches.
pub trait ProtocolStore {
    fn find(&self, query: &ProtocolQuery) -> Result<Vec<Protocol>>;

    fn find_one(&self, id: &str) -> Result<Option<Protocol>>;

    /// Store a new protocol. Fails on an invalid protocol or a duplicate id.
    fn insert(&mut self, protocol: Protocol) -> Result<()>;

    /// Patch a stored protocol and return the updated copy.
    ///
    /// Locked protocols are refused. The id never changes.
    fn update(&mut self, id: &str, patch: ProtocolPatch) -> Result<Protocol>;

    fn remove(&mut self, id: &str) -> Result<Protocol>;

    fn all(&self) -> Result<Vec<Protocol>> {
        self.find(&ProtocolQuery::all())
    }
}
