//! Protocol store persisted to a single JSON document.

use std::path::{Path, PathBuf};

use hp_model::Protocol;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::io::{compute_hash, parse_document, read_bytes, serialize_document, write_atomic};
use crate::memory::MemoryProtocolStore;
use crate::query::{ProtocolPatch, ProtocolQuery};
use crate::store::ProtocolStore;

/// A [`MemoryProtocolStore`] written back to disk after every mutation.
///
/// The SHA-256 of the file as last read or written is kept; a save is refused
/// with [`StoreError::ModifiedExternally`] when the file on disk no longer
/// matches it. A failed save leaves the in-memory state unchanged.
#[derive(Debug)]
pub struct JsonProtocolStore {
    path: PathBuf,
    inner: MemoryProtocolStore,
    fingerprint: Option<String>,
}

impl JsonProtocolStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (inner, fingerprint) = Self::load(&path)?;
        info!(
            count = inner.len(),
            "Opened protocol store at {}",
            path.display()
        );
        Ok(Self {
            path,
            inner,
            fingerprint,
        })
    }

    fn load(path: &Path) -> Result<(MemoryProtocolStore, Option<String>)> {
        if !path.exists() {
            return Ok((MemoryProtocolStore::new(), None));
        }
        let bytes = read_bytes(path)?;
        let document = parse_document(&bytes, path)?;
        let inner = MemoryProtocolStore::with_protocols(document.protocols)?;
        Ok((inner, Some(compute_hash(&bytes))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discard in-memory state and read the file again.
    pub fn reload(&mut self) -> Result<()> {
        let (inner, fingerprint) = Self::load(&self.path)?;
        self.inner = inner;
        self.fingerprint = fingerprint;
        debug!("Reloaded protocol store from {}", self.path.display());
        Ok(())
    }

    /// Whether the file changed since it was last read or written here.
    pub fn is_modified_externally(&self) -> Result<bool> {
        let on_disk = if self.path.exists() {
            Some(compute_hash(&read_bytes(&self.path)?))
        } else {
            None
        };
        Ok(match (&self.fingerprint, on_disk) {
            (Some(expected), Some(actual)) => *expected != actual,
            (None, Some(_)) => true,
            (_, None) => false,
        })
    }

    fn save(&mut self) -> Result<()> {
        if self.is_modified_externally()? {
            warn!("Protocol file changed on disk: {}", self.path.display());
            return Err(StoreError::ModifiedExternally {
                path: self.path.clone(),
            });
        }
        let bytes = serialize_document(self.inner.protocols())?;
        write_atomic(&self.path, &bytes)?;
        self.fingerprint = Some(compute_hash(&bytes));
        debug!(count = self.inner.len(), "Saved protocol store to {}", self.path.display());
        Ok(())
    }

    /// Run a mutation and persist it, rolling back on failure.
    fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut MemoryProtocolStore) -> Result<T>,
    ) -> Result<T> {
        let snapshot = self.inner.clone();
        let result = op(&mut self.inner).and_then(|value| self.save().map(|()| value));
        if result.is_err() {
            self.inner = snapshot;
        }
        result
    }

    /// The stored protocols, consuming the store.
    pub fn into_protocols(self) -> Vec<Protocol> {
        self.inner.into_protocols()
    }
}

impl ProtocolStore for JsonProtocolStore {
    fn find(&self, query: &ProtocolQuery) -> Result<Vec<Protocol>> {
        self.inner.find(query)
    }

    fn find_one(&self, id: &str) -> Result<Option<Protocol>> {
        self.inner.find_one(id)
    }

    fn insert(&mut self, protocol: Protocol) -> Result<()> {
        self.mutate(|inner| inner.insert(protocol))
    }

    fn update(&mut self, id: &str, patch: ProtocolPatch) -> Result<Protocol> {
        self.mutate(|inner| inner.update(id, patch))
    }

    fn remove(&mut self, id: &str) -> Result<Protocol> {
        self.mutate(|inner| inner.remove(id))
    }
}
