//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Default cap on records read from a single archive.
pub const DEFAULT_MAX_RECORDS: usize = 5_000_000;

/// Default event count at which an archive is flagged as high volume.
pub const DEFAULT_HIGH_VOLUME_THRESHOLD: u64 = 2000;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the report files are written to.
    pub output_dir: PathBuf,
    /// Records read from one archive before the rest is ignored.
    pub max_records_per_archive: usize,
    /// Archives with at least this many events go to the high-volume report.
    pub high_volume_threshold: u64,
    /// Archives scanned concurrently. 1 scans sequentially.
    pub jobs: usize,
    /// File extension identifying archives during discovery.
    pub archive_extension: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            max_records_per_archive: DEFAULT_MAX_RECORDS,
            high_volume_threshold: DEFAULT_HIGH_VOLUME_THRESHOLD,
            jobs: 1,
            archive_extension: "zip".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (EA_*)
        figment = figment.merge(Env::prefixed("EA_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for ea.
///
/// On Linux: `~/.config/ea`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ea"))
}
