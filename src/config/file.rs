//! TOML overlay file.
//!
//! Every field is optional; anything left out falls through to the
//! built-in default. Env vars still win over whatever the file says.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub backend: BackendSection,
    pub tracker: TrackerSection,
    pub network: NetworkSection,
    pub contracts: ContractsSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendSection {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerSection {
    pub confirmation_timeout_secs: Option<u64>,
    pub block_lookup_attempts: Option<u32>,
    pub block_lookup_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    pub name: Option<String>,
    pub aptos_rpc_url: Option<String>,
    pub aptos_explorer_url: Option<String>,
    pub ethereum_explorer_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContractsSection {
    pub ethereum: EthereumContracts,
    pub aptos: AptosContracts,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EthereumContracts {
    pub cross_chain_swap: Option<String>,
    pub cross_chain_bridge: Option<String>,
    pub token_manager: Option<String>,
    pub mock_usdc: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AptosContracts {
    pub cross_chain_swap: Option<String>,
    pub cross_chain_bridge: Option<String>,
    pub token_registry: Option<String>,
    pub name_service: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub filter: Option<String>,
    pub json: Option<bool>,
}

impl ConfigFile {
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".aptos-copilot")
            .join("config.toml")
    }

    /// Load a config file.
    ///
    /// Returns `None` if the file doesn't exist. Returns an error only
    /// if the file exists but can't be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>, String> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {}", path.display(), e)),
        };

        toml::from_str(&data)
            .map(Some)
            .map_err(|e| format!("invalid TOML in {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ConfigFile::load(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn partial_file_leaves_other_sections_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[tracker]\nblock_lookup_attempts = 5\n\n[contracts.aptos]\nname_service = \"0xabc\""
        )
        .unwrap();

        let loaded = ConfigFile::load(file.path()).unwrap().unwrap();
        assert_eq!(loaded.tracker.block_lookup_attempts, Some(5));
        assert_eq!(loaded.contracts.aptos.name_service.as_deref(), Some("0xabc"));
        assert!(loaded.backend.url.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nendpoint = \"http://x\"").unwrap();
        let err = ConfigFile::load(file.path()).unwrap_err();
        assert!(err.contains("invalid TOML"));
    }

    #[test]
    fn default_path_under_app_dir() {
        let path = ConfigFile::default_path();
        assert!(path.to_string_lossy().contains(".aptos-copilot"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }
}
