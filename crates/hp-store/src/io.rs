//! Protocol document files: hashing, atomic writes, import and export.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use hp_model::Protocol;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Result, StoreError};

/// Current protocol document format version.
pub const DOCUMENT_VERSION: &str = "1.0";

/// On-disk form of a protocol collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDocument {
    pub version: String,
    pub protocols: Vec<Protocol>,
}

impl ProtocolDocument {
    pub fn new(protocols: Vec<Protocol>) -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            protocols,
        }
    }
}

/// Exports from older viewers are a bare JSON array of protocols.
#[derive(Deserialize)]
#[serde(untagged)]
enum DocumentRepr {
    Document(ProtocolDocument),
    Bare(Vec<Protocol>),
}

/// SHA-256 of `bytes`, hex encoded.
pub fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub(crate) fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| StoreError::Io {
        operation: "read",
        path: path.to_path_buf(),
        source: e,
    })
}

pub(crate) fn parse_document(bytes: &[u8], path: &Path) -> Result<ProtocolDocument> {
    let repr: DocumentRepr = serde_json::from_slice(bytes).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    let document = match repr {
        DocumentRepr::Document(document) => document,
        DocumentRepr::Bare(protocols) => ProtocolDocument::new(protocols),
    };
    if !document.version.starts_with("1.") && document.version != "1" {
        return Err(StoreError::UnsupportedVersion {
            found: document.version,
            path: path.to_path_buf(),
        });
    }
    Ok(document)
}

pub(crate) fn serialize_document(protocols: &[Protocol]) -> Result<Vec<u8>> {
    let document = ProtocolDocument::new(protocols.to_vec());
    serde_json::to_vec_pretty(&document).map_err(|source| StoreError::Serialization { source })
}

/// Write `bytes` to `path` through a temp file and rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::Io {
            operation: "create directory",
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension("json.tmp");
    let mut file = File::create(&temp_path).map_err(|e| StoreError::Io {
        operation: "create",
        path: temp_path.clone(),
        source: e,
    })?;
    file.write_all(bytes).map_err(|e| StoreError::Io {
        operation: "write",
        path: temp_path.clone(),
        source: e,
    })?;
    file.sync_all().map_err(|e| StoreError::Io {
        operation: "sync",
        path: temp_path.clone(),
        source: e,
    })?;
    fs::rename(&temp_path, path).map_err(|e| StoreError::Io {
        operation: "rename",
        path: path.to_path_buf(),
        source: e,
    })
}

/// Export protocols as a JSON document.
pub fn export_protocols(path: &Path, protocols: &[Protocol]) -> Result<()> {
    let bytes = serialize_document(protocols)?;
    write_atomic(path, &bytes)?;
    info!(count = protocols.len(), "Exported protocols to {}", path.display());
    Ok(())
}

/// Import protocols from a JSON document or a bare JSON array.
pub fn import_protocols(path: &Path) -> Result<Vec<Protocol>> {
    let bytes = read_bytes(path)?;
    let document = parse_document(&bytes, path)?;
    info!(
        count = document.protocols.len(),
        "Imported protocols from {}",
        path.display()
    );
    Ok(document.protocols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            compute_hash(b"Hello, World!"),
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn import_accepts_bare_arrays() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        fs::write(&path, r#"[{ "id": "x", "name": "Legacy", "stages": [] }]"#).unwrap();
        let protocols = import_protocols(&path).unwrap();
        assert_eq!(protocols.len(), 1);
        assert_eq!(protocols[0].id(), "x");
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.json");
        fs::write(&path, r#"{ "version": "2.0", "protocols": [] }"#).unwrap();
        assert!(matches!(
            import_protocols(&path),
            Err(StoreError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn malformed_json_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = import_protocols(&path).unwrap_err();
        assert!(err.user_message().contains("broken.json"));
    }
}
