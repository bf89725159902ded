//! Pipeline configuration.
//!
//! Settings are read from `config.json` in the user's config directory:
//! - Linux: ~/.config/raw-gallery/config.json
//! - macOS: ~/Library/Application Support/raw-gallery/config.json
//! - Windows: %APPDATA%\raw-gallery\config.json
//!
//! Every field has a default, so a partial (or missing) file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::viewport::GridGeometry;

/// Application name used for config and data directories
pub const APP_NAME: &str = "raw-gallery";

/// Default edge length of generated thumbnails (square bound)
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 256;

/// Settings for caches, decoding and concurrency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Thumbnails are downscaled to fit inside this square
    pub thumbnail_size: u32,

    /// Maximum number of bitmaps kept in memory
    pub memory_max_items: usize,

    /// Maximum estimated bytes of bitmaps kept in memory
    pub memory_max_bytes: usize,

    /// Disk store budget in bytes; a sweep trims usage to 80% of this
    pub disk_max_bytes: u64,

    /// Entries not accessed for this many days are expired
    pub disk_expiry_days: u32,

    /// Concurrent standard-format decodes (default: CPU cores)
    pub standard_concurrency: Option<usize>,

    /// Concurrent raw-format decodes (default: 2x CPU cores)
    pub raw_concurrency: Option<usize>,

    /// JPEG quality for stored thumbnail blobs (1-100)
    pub blob_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            memory_max_items: 1000,
            memory_max_bytes: 512 * 1024 * 1024,
            disk_max_bytes: 5 * 1024 * 1024 * 1024,
            disk_expiry_days: 60,
            standard_concurrency: None,
            raw_concurrency: None,
            blob_quality: 85,
        }
    }
}

impl PipelineConfig {
    /// Permits for the standard-format decode semaphore
    pub fn standard_slots(&self) -> usize {
        self.standard_concurrency.unwrap_or_else(core_count)
    }

    /// Permits for the raw-format decode semaphore
    pub fn raw_slots(&self) -> usize {
        self.raw_concurrency.unwrap_or_else(|| core_count() * 2)
    }

    /// Expiry horizon as a duration
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(u64::from(self.disk_expiry_days) * 24 * 60 * 60)
    }
}

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub viewport: GridGeometry,
}

impl Config {
    /// Load the configuration from the default location.
    ///
    /// Missing or unreadable files fall back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.thumbnail_size == 0 {
            return Err(ConfigError::Invalid("thumbnail_size must be positive".into()));
        }
        if p.memory_max_items == 0 || p.memory_max_bytes == 0 {
            return Err(ConfigError::Invalid("memory budgets must be positive".into()));
        }
        if p.disk_max_bytes == 0 {
            return Err(ConfigError::Invalid("disk_max_bytes must be positive".into()));
        }
        if p.standard_slots() == 0 || p.raw_slots() == 0 {
            return Err(ConfigError::Invalid("decode concurrency must be positive".into()));
        }
        if !(1..=100).contains(&p.blob_quality) {
            return Err(ConfigError::Invalid("blob_quality must be within 1..=100".into()));
        }

        let v = &self.viewport;
        if !(v.item_width > 0.0 && v.item_height > 0.0) {
            return Err(ConfigError::Invalid("item size must be positive".into()));
        }
        Ok(())
    }

    /// Platform config path, if a config directory exists
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
    }
}

/// Get the path where the thumbnail database should be stored
///
/// - Linux: ~/.local/share/raw-gallery/thumbnails.db
/// - macOS: ~/Library/Application Support/raw-gallery/thumbnails.db
/// - Windows: %APPDATA%\raw-gallery\thumbnails.db
pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join(APP_NAME).join("thumbnails.db"))
}

/// Number of logical CPU cores, at least one
pub fn core_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}
