//! Configuration for snapvol
//!
//! Settings are read from an optional TOML file (`SNAPVOL_CONFIG`, default
//! `snapvol.toml`) and overridden by `SNAPVOL_*` environment variables.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "SNAPVOL_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "snapvol.toml";
const ENV_PREFIX: &str = "SNAPVOL";

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory for the catalog and provider storage
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Where catalog metadata is kept
    #[serde(default)]
    pub backend: BackendKind,

    /// Which snapshot provider performs the data copies
    #[serde(default)]
    pub provider: ProviderKind,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./snapvol-data")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    Rocksdb,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Noop,
    #[default]
    Local,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: BackendKind::default(),
            provider: ProviderKind::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from the file named by `SNAPVOL_CONFIG` plus the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::from_sources(Path::new(&path), true)
    }

    /// Load config from a specific TOML file, ignoring the environment
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_sources(path.as_ref(), false)
    }

    fn from_sources(path: &Path, with_env: bool) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml).required(false));
        if with_env {
            builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("data_dir cannot be empty".into()));
        }
        if self.log_level.trim().is_empty() {
            return Err(Error::InvalidConfig("log_level cannot be empty".into()));
        }
        Ok(())
    }

    /// RocksDB directory holding the catalog
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog")
    }

    /// Root directory handed to the local provider
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("storage")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempdir().unwrap();
        let config = Config::from_file(dir.path().join("missing.toml")).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("./snapvol-data"));
        assert_eq!(config.backend, BackendKind::Rocksdb);
        assert_eq!(config.provider, ProviderKind::Local);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapvol.toml");
        std::fs::write(
            &path,
            "data_dir = '/var/lib/snapvol'\nbackend = 'memory'\nprovider = 'noop'\nlog_level = 'debug'\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/snapvol"));
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.provider, ProviderKind::Noop);
        assert_eq!(config.log_level, "debug");
        assert_eq!(
            config.catalog_path(),
            PathBuf::from("/var/lib/snapvol/catalog")
        );
        assert_eq!(
            config.storage_path(),
            PathBuf::from("/var/lib/snapvol/storage")
        );
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapvol.toml");
        std::fs::write(&path, "backend = 'etcd'\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_validate() {
        let config = Config {
            log_level: " ".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            data_dir: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }
}
