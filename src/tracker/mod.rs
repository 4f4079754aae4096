//! Drives a submitted transaction to finality and reports each stage.
//!
//! Every stage lands as a [`ParameterPatch`] on the originating tool
//! message, addressed by index, so updates keep arriving after the turn
//! that submitted the transaction has ended.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chain::{ChainQuery, FinalizedTransaction, Signer, TransactionHandle};
use crate::config::TrackerConfig;
use crate::conversation::{
    CoinDescriptor, MessageLog, Parameter, ParameterPatch, TransactionStatus, keys,
};
use crate::error::FailureReason;

/// Placeholder shown while the block height is being resolved.
pub const BLOCK_LOADING: &str = "Loading...";

/// Derived data known once a transaction is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedMetadata {
    pub gas_used: u64,
    pub gas_unit_price: u64,
    pub ledger_version: u64,
    /// `None` when every block lookup failed.
    pub block_height: Option<u64>,
}

impl ConfirmedMetadata {
    /// Fee in base units of the native coin.
    pub fn gas_cost(&self) -> u128 {
        u128::from(self.gas_used) * u128::from(self.gas_unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Submitted,
    Pending,
    Confirmed(ConfirmedMetadata),
    Failed(FailureReason),
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed(_) | Self::Failed(_))
    }
}

pub(crate) fn pending_patch(hash: &str) -> ParameterPatch {
    ParameterPatch::new()
        .with(keys::STATUS, TransactionStatus::Pending)
        .with(keys::TRANSACTION, Parameter::hash(hash))
}

pub(crate) fn confirmed_patch(
    finalized: &FinalizedTransaction,
    gas_unit_price: u64,
    coin: &CoinDescriptor,
) -> ParameterPatch {
    let gas = u128::from(finalized.gas_used) * u128::from(gas_unit_price);
    ParameterPatch::new()
        .with(keys::STATUS, TransactionStatus::Success)
        .with(keys::GAS, Parameter::coin(gas, coin.clone()))
        .with(keys::GAS_UNIT_PRICE, unit_price_parameter(gas_unit_price))
        .with(keys::BLOCK, Parameter::text(BLOCK_LOADING))
}

/// Integer when it fits, otherwise the exact decimal text.
fn unit_price_parameter(gas_unit_price: u64) -> Parameter {
    match i64::try_from(gas_unit_price) {
        Ok(price) => Parameter::integer(price),
        Err(_) => {
            tracing::debug!(gas_unit_price, "Gas unit price exceeds i64, reporting as text");
            Parameter::text(gas_unit_price.to_string())
        }
    }
}

pub(crate) fn failed_patch() -> ParameterPatch {
    ParameterPatch::new().with(keys::STATUS, TransactionStatus::Failed)
}

pub(crate) fn block_patch(height: u64) -> ParameterPatch {
    ParameterPatch::new().with(keys::BLOCK, Parameter::block(height))
}

/// Tracks one transaction on behalf of one tool message.
pub struct TransactionTracker {
    log: Arc<MessageLog>,
    signer: Arc<dyn Signer>,
    chain: Arc<dyn ChainQuery>,
    config: TrackerConfig,
    coin: CoinDescriptor,
    state: watch::Sender<TransactionState>,
}

impl TransactionTracker {
    pub fn new(
        log: Arc<MessageLog>,
        signer: Arc<dyn Signer>,
        chain: Arc<dyn ChainQuery>,
        config: TrackerConfig,
        coin: CoinDescriptor,
    ) -> Self {
        Self {
            log,
            signer,
            chain,
            config,
            coin,
            state: watch::Sender::new(TransactionState::Submitted),
        }
    }

    /// Observe lifecycle transitions as they happen.
    pub fn subscribe(&self) -> watch::Receiver<TransactionState> {
        self.state.subscribe()
    }

    /// Run on its own task; independent of any turn's cancellation.
    pub fn spawn(self, index: usize, handle: TransactionHandle) -> JoinHandle<TransactionState> {
        tokio::spawn(self.run(index, handle))
    }

    pub async fn run(self, index: usize, handle: TransactionHandle) -> TransactionState {
        tracing::debug!(index, hash = %handle.hash, "Tracking submitted transaction");
        self.emit(index, &pending_patch(&handle.hash)).await;
        self.state.send_replace(TransactionState::Pending);

        let finality = tokio::time::timeout(
            self.config.confirmation_timeout,
            self.signer.wait_for_finality(&handle.hash),
        )
        .await;

        let finalized = match finality {
            Ok(Ok(finalized)) if finalized.success => finalized,
            Ok(Ok(finalized)) => {
                return self
                    .fail(
                        index,
                        &handle,
                        FailureReason::Rejected {
                            vm_status: finalized.vm_status,
                        },
                    )
                    .await;
            }
            Ok(Err(e)) => {
                return self
                    .fail(
                        index,
                        &handle,
                        FailureReason::FinalityUnavailable {
                            reason: e.to_string(),
                        },
                    )
                    .await;
            }
            Err(_) => {
                return self
                    .fail(
                        index,
                        &handle,
                        FailureReason::ConfirmationTimeout {
                            waited: self.config.confirmation_timeout,
                        },
                    )
                    .await;
            }
        };

        self.emit(
            index,
            &confirmed_patch(&finalized, handle.gas_unit_price, &self.coin),
        )
        .await;
        let mut metadata = ConfirmedMetadata {
            gas_used: finalized.gas_used,
            gas_unit_price: handle.gas_unit_price,
            ledger_version: finalized.ledger_version,
            block_height: None,
        };
        tracing::info!(
            index,
            hash = %handle.hash,
            gas = metadata.gas_cost(),
            "Transaction confirmed at version {}",
            metadata.ledger_version
        );

        let confirmed = self.transition(TransactionState::Confirmed(metadata.clone()));

        metadata.block_height = self.lookup_block(finalized.ledger_version).await;
        match metadata.block_height {
            Some(height) => {
                self.emit(index, &block_patch(height)).await;
                self.transition(TransactionState::Confirmed(metadata))
            }
            None => confirmed,
        }
    }

    fn transition(&self, state: TransactionState) -> TransactionState {
        self.state.send_replace(state.clone());
        state
    }

    async fn fail(
        &self,
        index: usize,
        handle: &TransactionHandle,
        reason: FailureReason,
    ) -> TransactionState {
        tracing::warn!(
            index,
            hash = %handle.hash,
            code = reason.code(),
            "Transaction failed: {}",
            reason
        );
        self.emit(index, &failed_patch()).await;
        self.transition(TransactionState::Failed(reason))
    }

    /// Resolve the containing block with linear backoff between attempts.
    async fn lookup_block(&self, version: u64) -> Option<u64> {
        let attempts = self.config.block_lookup_attempts.max(1);
        for attempt in 1..=attempts {
            match self.chain.block_for_ledger_version(version).await {
                Ok(height) => return Some(height),
                Err(e) => {
                    tracing::warn!(
                        version,
                        attempt,
                        attempts,
                        code = e.code(),
                        "Block lookup failed: {}",
                        e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.backoff_for(attempt)).await;
                    }
                }
            }
        }
        None
    }

    async fn emit(&self, index: usize, patch: &ParameterPatch) {
        if let Err(e) = self.log.update_parameters(index, patch).await {
            tracing::warn!(index, code = e.code(), "Dropped tracker update: {}", e);
        }
    }
}
