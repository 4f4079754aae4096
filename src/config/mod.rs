//! Configuration for the copilot session core.
//!
//! Settings are loaded with priority: env var > TOML config file > default.
//! `./.env` is loaded via dotenvy first, which never overwrites variables
//! that are already set.

mod backend;
mod file;
pub(crate) mod helpers;
mod network;
mod tracker;

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::logging::LoggingConfig;

pub use self::backend::BackendConfig;
pub use self::file::ConfigFile;
pub use self::network::{
    AddressBook, AptosAddresses, AptosNetwork, EthereumAddresses, NetworkConfig,
};
pub use self::tracker::TrackerConfig;

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub tracker: TrackerConfig,
    pub network: NetworkConfig,
    pub contracts: AddressBook,
    pub logging: LoggingConfig,
}

pub(crate) fn normalize_variant(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

impl Config {
    /// Load configuration from env vars and the default config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load from env with an optional TOML config file overlay.
    ///
    /// If `explicit_path` is `Some`, that file must exist and parse. If
    /// `None`, `~/.aptos-copilot/config.toml` is tried and a missing file is
    /// silently ignored.
    pub fn from_env_with_toml(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let file = Self::load_overlay(explicit_path)?;
        Self::build(&file)
    }

    fn load_overlay(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(ConfigFile::default_path);

        match ConfigFile::load(&path) {
            Ok(Some(file)) => {
                tracing::debug!("Loaded TOML config from {}", path.display());
                Ok(file)
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Ok(ConfigFile::default())
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
                Ok(ConfigFile::default())
            }
        }
    }

    fn build(file: &ConfigFile) -> Result<Self, ConfigError> {
        let logging_defaults = LoggingConfig::default();
        Ok(Self {
            backend: BackendConfig::resolve(&file.backend)?,
            tracker: TrackerConfig::resolve(&file.tracker)?,
            network: NetworkConfig::resolve(&file.network)?,
            contracts: AddressBook::resolve(&file.contracts),
            logging: LoggingConfig {
                filter: helpers::optional_env("COPILOT_LOG")?
                    .or_else(|| file.logging.filter.clone())
                    .unwrap_or(logging_defaults.filter),
                json: helpers::parse_bool_env(
                    "COPILOT_LOG_JSON",
                    file.logging.json.unwrap_or(logging_defaults.json),
                )?,
            },
        })
    }
}
