use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageLocation {
    File(PathBuf),
    Memory,
}

impl Default for StorageLocation {
    fn default() -> Self {
        StorageLocation::File(default_data_dir().join("survey.db"))
    }
}

/// Target box and JPEG quality used when preparing photos for the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhotoDimensions {
    pub width: u32,
    pub height: u32,
    pub quality: f32,
}

impl Default for PhotoDimensions {
    fn default() -> Self {
        Self {
            width: 360,
            height: 480,
            quality: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub location: StorageLocation,
    #[serde(default = "default_progress_chunk")]
    pub progress_chunk: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub photo: PhotoDimensions,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StorageLocation::default(),
            progress_chunk: default_progress_chunk(),
            page_size: default_page_size(),
            photo: PhotoDimensions::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_progress_chunk() -> usize {
    1000
}

fn default_page_size() -> usize {
    20
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_data_dir() -> PathBuf {
    env::var_os("SURVEY_STORE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data"))
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            location: StorageLocation::Memory,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: StoreConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `SURVEY_STORE_DB` taking precedence over the data directory.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(db) = env::var_os("SURVEY_STORE_DB") {
            let db = PathBuf::from(db);
            config.location = if db.as_os_str() == ":memory:" {
                StorageLocation::Memory
            } else {
                StorageLocation::File(db)
            };
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.progress_chunk == 0 {
            return Err(Error::InvalidArgument("progress_chunk must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(Error::InvalidArgument("page_size must be positive".into()));
        }
        let quality = self.photo.quality;
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "photo quality must be in (0, 1], got {quality}"
            )));
        }
        if self.photo.width == 0 || self.photo.height == 0 {
            return Err(Error::InvalidArgument("photo dimensions must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{ "location": "memory", "page_size": 50 }"#).unwrap();
        assert_eq!(config.location, StorageLocation::Memory);
        assert_eq!(config.page_size, 50);
        assert_eq!(config.progress_chunk, 1000);
        assert_eq!(config.photo, PhotoDimensions::default());
    }

    #[test]
    fn file_location_round_trips_through_json() {
        let config: StoreConfig =
            serde_json::from_str(r#"{ "location": { "file": "/tmp/x.db" } }"#).unwrap();
        assert_eq!(config.location, StorageLocation::File(PathBuf::from("/tmp/x.db")));
    }

    #[test]
    fn rejects_out_of_range_quality() {
        let mut config = StoreConfig::in_memory();
        config.photo.quality = 0.0;
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
        config.photo.quality = 1.0;
        assert!(config.validate().is_ok());
    }
}
