//! Tiquet configuration.
//!
//! One TOML file covering storage locations, the optional catalog seed
//! directory and logging. Absent file or absent keys fall back to
//! defaults, so a bare `tiquetctl init` works with no config at all.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "tiquet.toml";

/// Storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Root of the attachment tree (`tickets/{id}/attachments/...`).
    #[serde(default = "default_upload_root")]
    pub upload_root: PathBuf,
}

fn default_db_path() -> PathBuf {
    data_dir().join("tiquet.db")
}

fn default_upload_root() -> PathBuf {
    data_dir().join("uploads")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            upload_root: default_upload_root(),
        }
    }
}

/// Reference catalog seeding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// Directory of JSON seed files (statuses.json, crits.json,
    /// centers.json, tools.json). When unset, built-in seeds apply.
    #[serde(default)]
    pub seed_dir: Option<PathBuf>,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Default tracing filter, overridable via RUST_LOG.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TiquetConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl TiquetConfig {
    /// Load config from the default location, falling back to defaults
    /// when the file is missing or unreadable.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Load config from a specific file.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                if let Ok(config) = toml::from_str(&content) {
                    return config;
                }
            }
        }
        Self::default()
    }

    /// Save config in canonical form.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }
}

/// Default config file path (working directory).
pub fn config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE)
}

/// Default data directory: platform-local app data, or ./data as a
/// last resort.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("tiquet"))
        .unwrap_or_else(|| PathBuf::from("data"))
}
