//! Chain capabilities supplied by the host: a signer and a query client.
//!
//! The session core never owns keys or RPC clients. Hosts pass an explicit
//! [`Signer`] per turn (so several accounts can be driven side by side) and
//! one [`ChainQuery`] for block lookups.

mod paper;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::paper::{PaperChain, PaperChainConfig};
use crate::error::ChainError;

/// Entry-function call, e.g. `0x1::coin::transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFunction {
    /// Fully qualified `address::module::function`.
    pub function: String,
    #[serde(default)]
    pub type_arguments: Vec<String>,
    #[serde(default)]
    pub arguments: Vec<serde_json::Value>,
}

/// Transaction built from a tool call, ready for signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub sender: String,
    pub payload: EntryFunction,
}

/// What the chain returns on successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: String,
    pub gas_unit_price: u64,
}

/// Authoritative outcome of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedTransaction {
    pub success: bool,
    pub gas_used: u64,
    pub ledger_version: u64,
    pub vm_status: String,
}

/// Reference to a submitted transaction, handed to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHandle {
    pub hash: String,
    pub gas_unit_price: u64,
    pub submitted_at: DateTime<Utc>,
}

impl From<PendingTransaction> for TransactionHandle {
    fn from(pending: PendingTransaction) -> Self {
        Self {
            hash: pending.hash,
            gas_unit_price: pending.gas_unit_price,
            submitted_at: Utc::now(),
        }
    }
}

/// Signing capability for one account.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Account address, if the signer is bound to one.
    fn address(&self) -> Option<String>;

    /// Sign and submit. Simulation failures are reported here.
    async fn sign_and_submit(
        &self,
        transaction: &UnsignedTransaction,
    ) -> Result<PendingTransaction, ChainError>;

    /// Suspend until the transaction is final.
    async fn wait_for_finality(&self, hash: &str) -> Result<FinalizedTransaction, ChainError>;
}

/// Read-only chain queries.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    async fn block_for_ledger_version(&self, version: u64) -> Result<u64, ChainError>;
}
