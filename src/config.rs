//! Per-machine application settings.
//!
//! Stored as JSON at `<config_dir>/gearbox/settings.json`. A missing file
//! yields the defaults; CLI flags override whatever is loaded here.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "gearbox";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Root directory of the local object store
    pub storage_root: PathBuf,
    /// Root directory of the table catalog (`<root>/<database>/<table>.csv`)
    pub catalog_root: PathBuf,
    /// Where rotating log files go; the platform data directory when unset
    pub log_dir: Option<PathBuf>,
    /// Worker threads for transform and write; 0 picks one per core
    pub threads: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        let base = data_dir();
        Self {
            storage_root: base.join("storage"),
            catalog_root: base.join("catalog"),
            log_dir: None,
            threads: 0,
        }
    }
}

impl AppSettings {
    /// Path of the settings file.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(config_dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load settings from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load settings from `path`, or the defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings JSON in {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }
}

/// Platform data directory for gearbox, or the working directory if the
/// platform has none.
pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}
