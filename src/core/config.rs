use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

/// Where collections are kept.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    Disk {
        /// Defaults to the platform data directory.
        #[serde(default)]
        path: Option<String>,
    },
}

/// Client options. Every field falls back to its default when missing.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ClientOptions {
    pub make_cache: bool,
    pub use_files: bool,
    pub schema_folder_path: Option<String>,
    pub ignored_files: Vec<String>,
    pub storage: StorageConfig,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            make_cache: true,
            use_files: false,
            schema_folder_path: None,
            ignored_files: Vec::new(),
            storage: StorageConfig::Memory,
        }
    }
}

impl ClientOptions {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("io", "easiermongo", "easiermongo")
            .context("Could not determine project directories")
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.yaml"))
    }

    /// Directory of the on-disk store, `None` for in-memory storage.
    pub fn data_path(&self) -> Result<Option<PathBuf>> {
        match &self.storage {
            StorageConfig::Memory => Ok(None),
            StorageConfig::Disk {
                path: Some(custom_path),
            } => Ok(Some(PathBuf::from(custom_path))),
            StorageConfig::Disk { path: None } => {
                Ok(Some(Self::project_dirs()?.data_dir().join("store")))
            }
        }
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
