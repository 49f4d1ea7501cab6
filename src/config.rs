use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Device configuration, usually read from a small JSON file:
///
/// ```json
/// { "threads": 4, "max_group_lanes": 256 }
/// ```
///
/// Missing fields fall back to the defaults; 0 means "detect".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Worker threads running groups in parallel (0 = one per hardware thread)
    pub threads: usize,

    /// Maximum lanes per cooperative group (0 = device default)
    pub max_group_lanes: usize,
}

impl DeviceConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid device config: {0}")]
    Json(#[from] serde_json::Error),
}
