//! Protocol persistence.
//!
//! The engine only depends on the [`ProtocolStore`] contract: query, exact id
//! lookup, insert, patch and remove. Two implementations are provided:
//!
//! - [`MemoryProtocolStore`]: a vector kept in insertion order
//! - [`JsonProtocolStore`]: the same, persisted to one JSON document with
//!   atomic writes and detection of edits made by other processes
//!
//! [`export_protocols`] / [`import_protocols`] move protocol documents in and
//! out of the viewer without reordering rules or stages.

pub mod error;
pub mod io;
pub mod json;
pub mod memory;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use io::{DOCUMENT_VERSION, ProtocolDocument, compute_hash, export_protocols, import_protocols};
pub use json::JsonProtocolStore;
pub use memory::MemoryProtocolStore;
pub use query::{ProtocolPatch, ProtocolQuery};
pub use store::ProtocolStore;
