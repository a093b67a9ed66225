//! In-memory protocol store.

use hp_model::Protocol;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::query::{ProtocolPatch, ProtocolQuery};
use crate::store::ProtocolStore;

/// Protocols held in a vector, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryProtocolStore {
    protocols: Vec<Protocol>,
}

impl MemoryProtocolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing protocols, rejecting duplicates and
    /// invalid documents.
    pub fn with_protocols(protocols: Vec<Protocol>) -> Result<Self> {
        let mut store = Self::new();
        for protocol in protocols {
            store.insert(protocol)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }

    pub fn protocols(&self) -> &[Protocol] {
        &self.protocols
    }

    pub(crate) fn into_protocols(self) -> Vec<Protocol> {
        self.protocols
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.protocols.iter().position(|p| p.id() == id)
    }
}

impl ProtocolStore for MemoryProtocolStore {
    fn find(&self, query: &ProtocolQuery) -> Result<Vec<Protocol>> {
        Ok(self
            .protocols
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect())
    }

    fn find_one(&self, id: &str) -> Result<Option<Protocol>> {
        Ok(self.position(id).map(|index| self.protocols[index].clone()))
    }

    fn insert(&mut self, protocol: Protocol) -> Result<()> {
        protocol.validate().map_err(|source| StoreError::Invalid {
            id: protocol.id().to_string(),
            source,
        })?;
        if self.position(protocol.id()).is_some() {
            return Err(StoreError::DuplicateId {
                id: protocol.id().to_string(),
            });
        }
        debug!(protocol_id = protocol.id(), name = %protocol.name, "protocol inserted");
        self.protocols.push(protocol);
        Ok(())
    }

    fn update(&mut self, id: &str, patch: ProtocolPatch) -> Result<Protocol> {
        let index = self.position(id).ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })?;
        let current = &self.protocols[index];
        if current.locked {
            return Err(StoreError::Locked { id: id.to_string() });
        }
        let mut updated = current.clone();
        patch.apply(&mut updated);
        updated.validate().map_err(|source| StoreError::Invalid {
            id: id.to_string(),
            source,
        })?;
        debug!(protocol_id = id, "protocol updated");
        self.protocols[index] = updated.clone();
        Ok(updated)
    }

    fn remove(&mut self, id: &str) -> Result<Protocol> {
        let index = self.position(id).ok_or_else(|| StoreError::NotFound {
            id: id.to_string(),
        })?;
        debug!(protocol_id = id, "protocol removed");
        Ok(self.protocols.remove(index))
    }
}
