//! TOML configuration for the import pipeline.
//!
//! Every provider section defaults to "disabled": an empty server/URL string
//! is the sentinel that makes the matching source a no-op.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub import: ImportConfig,
    pub eurosport: EurosportConfig,
    pub global_listings: GlobalListingsConfig,
    pub venetsia: VenetsiaConfig,
    pub pawa_discovery: PawaDiscoveryConfig,
    pub clipsource: ClipsourceConfig,
    pub viacom: ViacomConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./epg.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Staging directory for downloaded files and unpacked archives
    pub temp_path: PathBuf,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            temp_path: PathBuf::from("./data/import"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EurosportConfig {
    pub ftp_server: String,
    pub ftp_username: String,
    pub ftp_password: String,
    pub delete_source_files: bool,
    /// Channel id -> remote filename
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalListingsConfig {
    pub ftp_server: String,
    pub ftp_username: String,
    pub ftp_password: String,
    pub delete_source_files: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VenetsiaConfig {
    pub ftp_server: String,
    pub ftp_username: String,
    pub ftp_password: String,
    pub delete_source_files: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PawaDiscoveryConfig {
    pub api_url: String,
    /// File paths appended to `api_url`, one document per channel
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipsourceConfig {
    pub api_url: String,
    pub api_key: String,
    /// Channel id -> display name
    pub channels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViacomConfig {
    pub api_url: String,
    /// Channel id -> feed language
    pub channels: BTreeMap<String, String>,
}

impl Config {
    /// Load from `path`, writing out a default config on first run.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, contents)?;
            Ok(default_config)
        }
    }
}
