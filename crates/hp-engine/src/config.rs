//! Engine configuration.

use std::fs;
use std::path::Path;

use hp_model::DEFAULT_PROTOCOL_ID;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Tunables of the selection and assignment pipeline.
///
/// ```toml
/// default_protocol_id = "defaultProtocol"
/// require_available_priors = true
/// distinct_series = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Protocol used when nothing matches. Falls back to the built-in
    /// default protocol when no protocol with this id is supplied.
    pub default_protocol_id: String,
    /// Skip protocols referencing more priors than the patient has.
    pub require_available_priors: bool,
    /// Avoid binding the same series to two viewports of one stage.
    pub distinct_series: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_protocol_id: DEFAULT_PROTOCOL_ID.to_string(),
            require_available_priors: true,
            distinct_series: false,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                let config = toml::from_str(&content).map_err(|e| EngineError::ConfigParse {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                tracing::info!("Loaded engine config from {:?}", path);
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No engine config at {:?}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(EngineError::ConfigIo {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
