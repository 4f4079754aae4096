//! Tool calls raised by the assistant and the transactions they become.
//!
//! The set of tools is closed: a name resolves to a [`ToolKind`] or the call
//! fails with `UnknownTool`. Every known tool submits one Aptos
//! entry-function transaction.

mod executor;
mod request;

pub use self::executor::{ToolExecutor, ToolOutcome};
pub use self::request::{TargetChain, ToolRequest};

use crate::config::normalize_variant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    RegisterName,
    Bridge,
    Swap,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [Self::RegisterName, Self::Bridge, Self::Swap];

    /// Resolve a tool name as the assistant spells it.
    pub fn resolve(name: &str) -> Option<Self> {
        match normalize_variant(name).as_str() {
            "register" | "register_name" => Some(Self::RegisterName),
            "bridge" | "bridge_token" => Some(Self::Bridge),
            "swap" | "swap_token" => Some(Self::Swap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RegisterName => "register_name",
            Self::Bridge => "bridge_token",
            Self::Swap => "swap_token",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
