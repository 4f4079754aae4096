//! Network endpoints and the contract address book.
//!
//! Aptos is the signing chain for every tool transaction. Ethereum entries
//! are carried so bridge and swap calls can name their destination.

use super::file::{ContractsSection, NetworkSection};
use super::helpers::optional_env;
use super::normalize_variant;
use crate::conversation::{CoinDescriptor, Parameter};
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AptosNetwork {
    Mainnet,
    Testnet,
    Devnet,
}

impl AptosNetwork {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match normalize_variant(value).as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'mainnet', 'testnet', or 'devnet', got '{value}'"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        }
    }

    fn default_rpc_url(self) -> &'static str {
        match self {
            Self::Mainnet => "https://fullnode.mainnet.aptoslabs.com/v1",
            Self::Testnet => "https://fullnode.testnet.aptoslabs.com/v1",
            Self::Devnet => "https://fullnode.devnet.aptoslabs.com/v1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub aptos: AptosNetwork,
    pub aptos_rpc_url: String,
    pub aptos_explorer_url: String,
    pub ethereum_chain_id: u64,
    pub ethereum_explorer_url: String,
    pub native_coin: CoinDescriptor,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::for_network(AptosNetwork::Testnet)
    }
}

impl NetworkConfig {
    pub fn for_network(aptos: AptosNetwork) -> Self {
        Self {
            aptos,
            aptos_rpc_url: aptos.default_rpc_url().to_string(),
            aptos_explorer_url: "https://explorer.aptoslabs.com".to_string(),
            ethereum_chain_id: 11_155_111,
            ethereum_explorer_url: "https://sepolia.etherscan.io".to_string(),
            native_coin: CoinDescriptor::apt(),
        }
    }

    pub(crate) fn resolve(file: &NetworkSection) -> Result<Self, ConfigError> {
        let aptos = match optional_env("COPILOT_NETWORK")?.or_else(|| file.name.clone()) {
            Some(raw) => AptosNetwork::parse(&raw, "COPILOT_NETWORK")?,
            None => AptosNetwork::Testnet,
        };
        let mut config = Self::for_network(aptos);
        if let Some(ref url) = file.aptos_rpc_url {
            config.aptos_rpc_url = url.clone();
        }
        if let Some(ref url) = file.aptos_explorer_url {
            config.aptos_explorer_url = url.clone();
        }
        if let Some(ref url) = file.ethereum_explorer_url {
            config.ethereum_explorer_url = url.clone();
        }
        Ok(config)
    }

    /// Explorer page for an Aptos transaction.
    pub fn transaction_url(&self, hash: &str) -> String {
        format!(
            "{}/txn/{}?network={}",
            self.aptos_explorer_url.trim_end_matches('/'),
            hash,
            self.aptos.as_str()
        )
    }

    /// Display form of a parameter; hashes become explorer links.
    pub fn render(&self, parameter: &Parameter) -> String {
        match parameter {
            Parameter::Hash { value } => self.transaction_url(value),
            other => other.display(),
        }
    }
}

const APTOS_COPILOT_MODULES: &str =
    "0x5ac6a79cde1c926bf2021727adf74f7eedcca438be6a5be0d4629ef638ba9a98";

/// Deployed contract addresses, read-only to the tool executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBook {
    pub ethereum: EthereumAddresses,
    pub aptos: AptosAddresses,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthereumAddresses {
    pub cross_chain_swap: String,
    pub cross_chain_bridge: String,
    pub token_manager: String,
    pub mock_usdc: String,
}

/// Aptos module locations as `address::module`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptosAddresses {
    pub cross_chain_swap: String,
    pub cross_chain_bridge: String,
    pub token_registry: String,
    pub name_service: String,
}

impl Default for AddressBook {
    fn default() -> Self {
        Self {
            ethereum: EthereumAddresses {
                cross_chain_swap: "0x1B361EEEf61b67e66cF7e8C0309cb03EDc34F4F8".to_string(),
                cross_chain_bridge: "0x4f1e1b041A9Fc9347731E893d1c06e6c8FbceDb0".to_string(),
                token_manager: "0x2A809295cc916E85cF998eA8f8559cfeB85f2e28".to_string(),
                mock_usdc: "0x7a265Db61E004f4242fB322fa72F8a52D2B06664".to_string(),
            },
            aptos: AptosAddresses {
                cross_chain_swap: format!("{APTOS_COPILOT_MODULES}::cross_chain_swap"),
                cross_chain_bridge: format!("{APTOS_COPILOT_MODULES}::cross_chain_bridge"),
                token_registry: format!("{APTOS_COPILOT_MODULES}::token_registry"),
                name_service:
                    "0x867ed1f6bf916171b1de3ee92849b8978b7d1b9e0a8cc982a3d19d535dfd9c0c::router"
                        .to_string(),
            },
        }
    }
}

impl AddressBook {
    pub(crate) fn resolve(file: &ContractsSection) -> Self {
        let mut book = Self::default();
        let eth = &file.ethereum;
        let apt = &file.aptos;
        for (slot, value) in [
            (&mut book.ethereum.cross_chain_swap, &eth.cross_chain_swap),
            (&mut book.ethereum.cross_chain_bridge, &eth.cross_chain_bridge),
            (&mut book.ethereum.token_manager, &eth.token_manager),
            (&mut book.ethereum.mock_usdc, &eth.mock_usdc),
            (&mut book.aptos.cross_chain_swap, &apt.cross_chain_swap),
            (&mut book.aptos.cross_chain_bridge, &apt.cross_chain_bridge),
            (&mut book.aptos.token_registry, &apt.token_registry),
            (&mut book.aptos.name_service, &apt.name_service),
        ] {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::AptosContracts;

    #[test]
    fn transaction_links_carry_network() {
        let network = NetworkConfig::default();
        assert_eq!(
            network.transaction_url("0xabc"),
            "https://explorer.aptoslabs.com/txn/0xabc?network=testnet"
        );
        assert_eq!(
            network.render(&Parameter::hash("0xabc")),
            network.transaction_url("0xabc")
        );
        assert_eq!(network.render(&Parameter::text("Pending")), "Pending");
    }

    #[test]
    fn network_names_are_normalized() {
        assert_eq!(
            AptosNetwork::parse(" MainNet ", "K").unwrap(),
            AptosNetwork::Mainnet
        );
        assert!(AptosNetwork::parse("localnet", "K").is_err());
    }

    #[test]
    fn file_overrides_single_contract() {
        let file = ContractsSection {
            aptos: AptosContracts {
                name_service: Some("0x42::router".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let book = AddressBook::resolve(&file);
        assert_eq!(book.aptos.name_service, "0x42::router");
        assert_eq!(
            book.aptos.cross_chain_bridge,
            AddressBook::default().aptos.cross_chain_bridge
        );
    }
}
