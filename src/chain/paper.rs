//! Deterministic in-memory chain for demos and tests.
//!
//! Submissions get a blake3-derived hash and a monotonically increasing
//! ledger version; finality, rejections and block lookup failures are all
//! driven by [`PaperChainConfig`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use super::{ChainQuery, FinalizedTransaction, PendingTransaction, Signer, UnsignedTransaction};
use crate::error::ChainError;

#[derive(Debug, Clone)]
pub struct PaperChainConfig {
    pub address: Option<String>,
    pub gas_unit_price: u64,
    pub gas_used: u64,
    pub first_ledger_version: u64,
    /// Ledger versions per block; block height is `version / versions_per_block`.
    pub versions_per_block: u64,
    pub finality_delay: Duration,
    /// Entry functions whose simulation fails at submission.
    pub reject_on_submit: HashSet<String>,
    /// Entry functions that execute but abort on chain.
    pub abort_on_chain: HashSet<String>,
    /// Number of block lookups that fail before lookups start succeeding.
    pub block_lookup_failures: u32,
    /// Never report finality (for timeout scenarios).
    pub stall_finality: bool,
}

impl Default for PaperChainConfig {
    fn default() -> Self {
        Self {
            address: Some(
                "0x5ac6a79cde1c926bf2021727adf74f7eedcca438be6a5be0d4629ef638ba9a98".to_string(),
            ),
            gas_unit_price: 100,
            gas_used: 10,
            first_ledger_version: 4_200,
            versions_per_block: 100,
            finality_delay: Duration::from_millis(5),
            reject_on_submit: HashSet::new(),
            abort_on_chain: HashSet::new(),
            block_lookup_failures: 0,
            stall_finality: false,
        }
    }
}

#[derive(Serialize)]
struct HashSeed<'a> {
    nonce: u64,
    transaction: &'a UnsignedTransaction,
}

struct Submitted {
    function: String,
    ledger_version: u64,
}

pub struct PaperChain {
    config: PaperChainConfig,
    next_version: AtomicU64,
    block_failures_left: AtomicU32,
    submitted: Mutex<HashMap<String, Submitted>>,
}

impl PaperChain {
    pub fn new(config: PaperChainConfig) -> Self {
        Self {
            next_version: AtomicU64::new(config.first_ledger_version),
            block_failures_left: AtomicU32::new(config.block_lookup_failures),
            submitted: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Number of transactions accepted so far.
    pub async fn submitted_count(&self) -> usize {
        self.submitted.lock().await.len()
    }
}

impl Default for PaperChain {
    fn default() -> Self {
        Self::new(PaperChainConfig::default())
    }
}

#[async_trait]
impl Signer for PaperChain {
    fn address(&self) -> Option<String> {
        self.config.address.clone()
    }

    async fn sign_and_submit(
        &self,
        transaction: &UnsignedTransaction,
    ) -> Result<PendingTransaction, ChainError> {
        let function = transaction.payload.function.clone();
        if self.config.reject_on_submit.contains(&function) {
            return Err(ChainError::Submission {
                reason: format!("simulation of {} failed: EINSUFFICIENT_BALANCE", function),
            });
        }

        let ledger_version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let seed = HashSeed {
            nonce: ledger_version,
            transaction,
        };
        let payload = serde_json::to_vec(&seed).map_err(|e| ChainError::Submission {
            reason: format!("failed to encode transaction: {}", e),
        })?;
        let hash = format!("0x{}", blake3::hash(&payload).to_hex());

        self.submitted.lock().await.insert(
            hash.clone(),
            Submitted {
                function,
                ledger_version,
            },
        );
        tracing::debug!("Paper chain accepted {} at version {}", hash, ledger_version);

        Ok(PendingTransaction {
            hash,
            gas_unit_price: self.config.gas_unit_price,
        })
    }

    async fn wait_for_finality(&self, hash: &str) -> Result<FinalizedTransaction, ChainError> {
        if self.config.stall_finality {
            futures::future::pending::<()>().await;
        }
        tokio::time::sleep(self.config.finality_delay).await;

        let submitted = self.submitted.lock().await;
        let entry = submitted.get(hash).ok_or_else(|| ChainError::Finality {
            hash: hash.to_string(),
            reason: "transaction not found".to_string(),
        })?;
        let aborted = self.config.abort_on_chain.contains(&entry.function);

        Ok(FinalizedTransaction {
            success: !aborted,
            gas_used: self.config.gas_used,
            ledger_version: entry.ledger_version,
            vm_status: if aborted {
                "Move abort: ECROSS_CHAIN_UNAVAILABLE".to_string()
            } else {
                "Executed successfully".to_string()
            },
        })
    }
}

#[async_trait]
impl ChainQuery for PaperChain {
    async fn block_for_ledger_version(&self, version: u64) -> Result<u64, ChainError> {
        let failing = self
            .block_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ChainError::BlockLookup {
                version,
                reason: "ledger version pruned on this node".to_string(),
            });
        }
        Ok(version / self.config.versions_per_block.max(1))
    }
}
