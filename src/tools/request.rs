//! Argument parsing and transaction building per tool kind.

use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};

use super::ToolKind;
use crate::chain::{EntryFunction, UnsignedTransaction};
use crate::config::{AddressBook, NetworkConfig, normalize_variant};
use crate::conversation::{CoinDescriptor, Parameter, ParameterPatch};
use crate::error::ToolError;
use crate::stream::ToolCall;

const NAME_SUFFIX: &str = ".apt";
const MAX_REGISTRATION_YEARS: u8 = 10;
const SECONDS_PER_YEAR: u64 = 31_536_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetChain {
    Aptos,
    Ethereum,
}

impl TargetChain {
    fn parse(raw: &str) -> Option<Self> {
        match normalize_variant(raw).as_str() {
            "aptos" | "apt" => Some(Self::Aptos),
            "ethereum" | "eth" | "sepolia" => Some(Self::Ethereum),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aptos => "aptos",
            Self::Ethereum => "ethereum",
        }
    }
}

/// A tool call with validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    RegisterName {
        /// Label without the `.apt` suffix.
        domain: String,
        years: u8,
    },
    Bridge {
        amount: u128,
        to_chain: TargetChain,
        recipient: Option<String>,
    },
    Swap {
        amount: u128,
        from: CoinDescriptor,
        to: CoinDescriptor,
    },
}

/// Coins the bridge and swap modules know about.
fn known_coin(symbol: &str, book: &AddressBook) -> Option<CoinDescriptor> {
    match symbol.trim().to_ascii_lowercase().as_str() {
        "apt" => Some(CoinDescriptor::apt()),
        "musdc" | "usdc" => Some(mock_usdc(book)),
        _ => None,
    }
}

pub(crate) fn mock_usdc(book: &AddressBook) -> CoinDescriptor {
    CoinDescriptor {
        name: "Mock USDC".to_string(),
        symbol: "mUSDC".to_string(),
        decimals: 6,
        coin_type: format!("{}::MockUSDC", book.aptos.token_registry),
    }
}

struct Args<'a> {
    tool: ToolKind,
    map: &'a serde_json::Map<String, Value>,
}

impl<'a> Args<'a> {
    fn new(tool: ToolKind, arguments: &'a Value) -> Result<Self, ToolError> {
        match arguments.as_object() {
            Some(map) => Ok(Self { tool, map }),
            None => Err(invalid(tool, "arguments must be a JSON object")),
        }
    }

    fn optional_str(&self, key: &str) -> Result<Option<&'a str>, ToolError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.trim())),
            Some(other) => Err(invalid(
                self.tool,
                format!("'{}' must be a string, got {}", key, other),
            )),
        }
    }

    fn required_str(&self, key: &str) -> Result<&'a str, ToolError> {
        self.optional_str(key)?
            .ok_or_else(|| invalid(self.tool, format!("missing '{}'", key)))
    }

    /// Decimal amount given as a string or a JSON number.
    fn amount(&self, key: &str) -> Result<Decimal, ToolError> {
        let raw = match self.map.get(key) {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(invalid(
                    self.tool,
                    format!("'{}' must be a number, got {}", key, other),
                ));
            }
            None => return Err(invalid(self.tool, format!("missing '{}'", key))),
        };
        let amount = Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map_err(|e| invalid(self.tool, format!("invalid {} '{}': {}", key, raw, e)))?;
        if amount <= Decimal::ZERO {
            return Err(invalid(
                self.tool,
                format!("{} must be greater than zero", key),
            ));
        }
        Ok(amount)
    }
}

fn invalid(tool: ToolKind, reason: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments {
        name: tool.as_str().to_string(),
        reason: reason.into(),
    }
}

/// Convert a human amount into base units, refusing excess precision.
fn to_base_units(
    tool: ToolKind,
    amount: Decimal,
    coin: &CoinDescriptor,
) -> Result<u128, ToolError> {
    let scaled = Decimal::from(10u64.pow(u32::from(coin.decimals)))
        .checked_mul(amount)
        .ok_or_else(|| invalid(tool, format!("amount {} is too large", amount)))?;
    if scaled.fract() != Decimal::ZERO {
        return Err(invalid(
            tool,
            format!(
                "amount {} has more than {} decimal places for {}",
                amount, coin.decimals, coin.symbol
            ),
        ));
    }
    scaled
        .to_u128()
        .ok_or_else(|| invalid(tool, format!("amount {} is out of range", amount)))
}

fn parse_domain(tool: ToolKind, raw: &str) -> Result<String, ToolError> {
    let lowered = raw.trim().to_ascii_lowercase();
    let domain = lowered.strip_suffix(NAME_SUFFIX).unwrap_or(&lowered);
    if domain.is_empty() {
        return Err(invalid(tool, "name cannot be empty"));
    }
    if !domain
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(invalid(
            tool,
            format!("invalid name '{}': only [a-z0-9-] are allowed", raw),
        ));
    }
    if domain.starts_with('-') || domain.ends_with('-') {
        return Err(invalid(
            tool,
            format!("invalid name '{}': cannot start or end with '-'", raw),
        ));
    }
    Ok(domain.to_string())
}

fn parse_years(tool: ToolKind, value: Option<&Value>) -> Result<u8, ToolError> {
    let years = match value {
        None | Some(Value::Null) => return Ok(1),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    match years {
        Some(y) if (1..=u64::from(MAX_REGISTRATION_YEARS)).contains(&y) => Ok(y as u8),
        _ => Err(invalid(
            tool,
            format!("years must be between 1 and {}", MAX_REGISTRATION_YEARS),
        )),
    }
}

impl ToolRequest {
    /// Resolve and validate a decoded tool call.
    pub fn parse(call: &ToolCall, book: &AddressBook) -> Result<Self, ToolError> {
        let kind = ToolKind::resolve(&call.name).ok_or_else(|| ToolError::UnknownTool {
            name: call.name.clone(),
        })?;
        let args = Args::new(kind, &call.arguments)?;

        match kind {
            ToolKind::RegisterName => {
                let raw = match args.optional_str("name")? {
                    Some(name) => name,
                    None => args.required_str("domain")?,
                };
                Ok(Self::RegisterName {
                    domain: parse_domain(kind, raw)?,
                    years: parse_years(kind, args.map.get("years"))?,
                })
            }
            ToolKind::Bridge => {
                let coin = mock_usdc(book);
                let amount = to_base_units(kind, args.amount("amount")?, &coin)?;
                let raw_chain = args.required_str("to_chain")?;
                let to_chain = TargetChain::parse(raw_chain).ok_or_else(|| {
                    invalid(
                        kind,
                        format!(
                            "invalid to_chain '{}': expected 'ethereum' or 'aptos'",
                            raw_chain
                        ),
                    )
                })?;
                Ok(Self::Bridge {
                    amount,
                    to_chain,
                    recipient: args.optional_str("recipient")?.map(str::to_string),
                })
            }
            ToolKind::Swap => {
                let coin = |key: &str| -> Result<CoinDescriptor, ToolError> {
                    let symbol = args.required_str(key)?;
                    known_coin(symbol, book).ok_or_else(|| {
                        invalid(kind, format!("unsupported {} '{}'", key, symbol))
                    })
                };
                let from = coin("from_token")?;
                let to = coin("to_token")?;
                if from == to {
                    return Err(invalid(kind, "from_token and to_token must differ"));
                }
                let amount = to_base_units(kind, args.amount("amount")?, &from)?;
                Ok(Self::Swap { amount, from, to })
            }
        }
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            Self::RegisterName { .. } => ToolKind::RegisterName,
            Self::Bridge { .. } => ToolKind::Bridge,
            Self::Swap { .. } => ToolKind::Swap,
        }
    }

    /// Parameters shown on the tool message before submission.
    pub fn parameters(&self, book: &AddressBook, network: &NetworkConfig) -> ParameterPatch {
        match self {
            Self::RegisterName { domain, years } => ParameterPatch::new()
                .with("name", Parameter::text(format!("{}{}", domain, NAME_SUFFIX)))
                .with("years", Parameter::integer(i64::from(*years))),
            Self::Bridge {
                amount,
                to_chain,
                recipient,
            } => {
                let mut patch = ParameterPatch::new()
                    .with("amount", Parameter::coin(*amount, mock_usdc(book)))
                    .with("destination", Parameter::text(to_chain.as_str()));
                if *to_chain == TargetChain::Ethereum {
                    patch.set(
                        "chainId",
                        Parameter::integer(
                            i64::try_from(network.ethereum_chain_id).unwrap_or(i64::MAX),
                        ),
                    );
                }
                if let Some(recipient) = recipient {
                    patch.set("recipient", Parameter::text(recipient.clone()));
                }
                patch
            }
            Self::Swap { amount, from, to } => ParameterPatch::new()
                .with("amount", Parameter::coin(*amount, from.clone()))
                .with("from", Parameter::text(from.symbol.clone()))
                .with("to", Parameter::text(to.symbol.clone())),
        }
    }

    /// Entry-function transaction for this request, sent by `sender`.
    pub fn to_transaction(
        &self,
        sender: &str,
        book: &AddressBook,
        network: &NetworkConfig,
    ) -> UnsignedTransaction {
        let payload = match self {
            Self::RegisterName { domain, years } => EntryFunction {
                function: format!("{}::register_domain", book.aptos.name_service),
                type_arguments: vec![],
                arguments: vec![
                    json!(domain),
                    json!((u64::from(*years) * SECONDS_PER_YEAR).to_string()),
                    Value::Null,
                    Value::Null,
                ],
            },
            Self::Bridge {
                amount,
                to_chain,
                recipient,
            } => {
                let destination_chain_id = match to_chain {
                    TargetChain::Ethereum => network.ethereum_chain_id.to_string(),
                    TargetChain::Aptos => "0".to_string(),
                };
                EntryFunction {
                    function: format!("{}::bridge_out", book.aptos.cross_chain_bridge),
                    type_arguments: vec![mock_usdc(book).coin_type],
                    arguments: vec![
                        json!(amount.to_string()),
                        json!(destination_chain_id),
                        json!(recipient.as_deref().unwrap_or(sender)),
                    ],
                }
            }
            Self::Swap { amount, from, to } => EntryFunction {
                function: format!("{}::swap_exact_in", book.aptos.cross_chain_swap),
                type_arguments: vec![from.coin_type.clone(), to.coin_type.clone()],
                arguments: vec![json!(amount.to_string()), json!("0")],
            },
        };

        UnsignedTransaction {
            sender: sender.to_string(),
            payload,
        }
    }
}
