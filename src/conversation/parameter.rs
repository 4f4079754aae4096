//! Typed parameters attached to tool messages and their merge semantics.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Well-known parameter keys written by the transaction tracker.
pub mod keys {
    pub const STATUS: &str = "status";
    pub const TRANSACTION: &str = "transaction";
    pub const GAS: &str = "gas";
    pub const GAS_UNIT_PRICE: &str = "gasUnitPrice";
    pub const BLOCK: &str = "block";

    /// Keys only the tracker of a tool message may write.
    pub const TRACKER_OWNED: [&str; 5] = [STATUS, TRANSACTION, GAS, GAS_UNIT_PRICE, BLOCK];
}

/// Currency descriptor for coin amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinDescriptor {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// On-chain type identifier, e.g. `0x1::aptos_coin::AptosCoin`.
    pub coin_type: String,
}

impl CoinDescriptor {
    /// Native Aptos coin.
    pub fn apt() -> Self {
        Self {
            name: "APT".to_string(),
            symbol: "APT".to_string(),
            decimals: 8,
            coin_type: "0x1::aptos_coin::AptosCoin".to_string(),
        }
    }

    /// Render a base-unit magnitude with this coin's precision.
    pub fn format_amount(&self, base_units: u128) -> String {
        match i128::try_from(base_units)
            .ok()
            .and_then(|v| Decimal::try_from_i128_with_scale(v, u32::from(self.decimals)).ok())
        {
            Some(amount) => format!("{} {}", amount.normalize(), self.symbol),
            None => format!("{} (base units) {}", base_units, self.symbol),
        }
    }
}

/// A tagged value attached to a tool message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Parameter {
    String { value: String },
    Integer { value: i64 },
    Coin { value: u128, coin: CoinDescriptor },
    Hash { value: String },
    Block { value: u64 },
}

impl Parameter {
    pub fn text(value: impl Into<String>) -> Self {
        Self::String {
            value: value.into(),
        }
    }

    pub fn integer(value: i64) -> Self {
        Self::Integer { value }
    }

    pub fn coin(value: u128, coin: CoinDescriptor) -> Self {
        Self::Coin { value, coin }
    }

    pub fn hash(value: impl Into<String>) -> Self {
        Self::Hash {
            value: value.into(),
        }
    }

    pub fn block(value: u64) -> Self {
        Self::Block { value }
    }

    /// Plain string value, if this is a string parameter.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String { value } => Some(value),
            _ => None,
        }
    }

    /// Convert a JSON value from a tool result into a parameter.
    ///
    /// Strings become `String`, integers that fit `i64` become `Integer`;
    /// anything else is kept as its compact JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::text(s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::integer(i),
                None => Self::text(n.to_string()),
            },
            other => Self::text(other.to_string()),
        }
    }

    /// Human-readable rendering.
    pub fn display(&self) -> String {
        match self {
            Self::String { value } | Self::Hash { value } => value.clone(),
            Self::Integer { value } => value.to_string(),
            Self::Coin { value, coin } => coin.format_amount(*value),
            Self::Block { value } => format!("#{}", value),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Ordered parameter mapping owned by a tool message.
pub type Parameters = BTreeMap<String, Parameter>;

/// Status values written under [`keys::STATUS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Success => "Success",
            Self::Failed => "Failed",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Pending" => Some(Self::Pending),
            "Success" => Some(Self::Success),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    fn of(params: &Parameters) -> Option<Self> {
        params
            .get(keys::STATUS)
            .and_then(Parameter::as_text)
            .and_then(Self::from_label)
    }
}

impl From<TransactionStatus> for Parameter {
    fn from(status: TransactionStatus) -> Self {
        Parameter::text(status.label())
    }
}

/// A partial parameter mapping.
///
/// Merge semantics: a key present in the patch overwrites the stored value,
/// a key absent from the patch leaves the stored value untouched. A patch
/// that would move a terminal `status` to a different value is refused as a
/// whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterPatch {
    entries: Parameters,
}

impl ParameterPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Parameter>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Parameter>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Parameter> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Build a patch from a JSON object; non-object values yield `{result: ..}`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let mut patch = Self::new();
        match value.as_object() {
            Some(obj) => {
                for (key, value) in obj {
                    patch.set(key.clone(), Parameter::from_json(value));
                }
            }
            None => patch.set("result", Parameter::from_json(value)),
        }
        patch
    }

    /// Remove the tracker-owned keys, returning the ones that were present.
    pub fn strip_tracker_keys(&mut self) -> Vec<String> {
        let mut removed = Vec::new();
        for key in keys::TRACKER_OWNED {
            if self.entries.remove(key).is_some() {
                removed.push(key.to_string());
            }
        }
        removed
    }

    /// Merge into `target`. `index` is only used for error reporting.
    pub(crate) fn apply_to(&self, target: &mut Parameters, index: usize) -> Result<(), LogError> {
        if let Some(next) = self.entries.get(keys::STATUS)
            && let Some(current) = TransactionStatus::of(target)
            && current.is_terminal()
            && next.as_text() != Some(current.label())
        {
            return Err(LogError::StatusRegression {
                index,
                from: current.label().to_string(),
                to: next.display(),
            });
        }

        for (key, value) in &self.entries {
            target.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

impl FromIterator<(String, Parameter)> for ParameterPatch {
    fn from_iter<I: IntoIterator<Item = (String, Parameter)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
