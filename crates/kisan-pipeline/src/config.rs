//! Start-up configuration, read from a JSON file.
//!
//! Every field has a default, so `{}` is a valid config.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kisan_model::{CropCatalog, CropId};
use kisan_remedy::{BannedSubstanceRegistry, RegistryError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ~3 frames per second.
pub const DEFAULT_MIN_FRAME_INTERVAL_MS: u64 = 333;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the `<Crop>_model_unquant.onnx` artifacts
    pub model_dir: PathBuf,
    /// Optional crop catalog overriding the built-in profiles
    pub catalog_path: Option<PathBuf>,
    /// Optional banned-substance registry replacing CIBRC 2025
    pub registry_path: Option<PathBuf>,
    pub min_frame_interval_ms: u64,
    pub default_crop: CropId,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            catalog_path: None,
            registry_path: None,
            min_frame_interval_ms: DEFAULT_MIN_FRAME_INTERVAL_MS,
            default_crop: CropId::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = read(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn min_frame_interval(&self) -> Duration {
        Duration::from_millis(self.min_frame_interval_ms)
    }

    /// The catalog file if one is configured, the built-in one otherwise.
    pub fn load_catalog(&self) -> Result<CropCatalog, ConfigError> {
        match &self.catalog_path {
            Some(path) => Ok(CropCatalog::from_json_str(&read(path)?)?),
            None => Ok(CropCatalog::builtin()),
        }
    }

    pub fn load_registry(&self) -> Result<BannedSubstanceRegistry, ConfigError> {
        match &self.registry_path {
            Some(path) => Ok(BannedSubstanceRegistry::from_path(path)?),
            None => Ok(BannedSubstanceRegistry::cibrc_2025()),
        }
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })
}
