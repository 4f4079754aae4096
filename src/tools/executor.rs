use crate::backend::ANONYMOUS_ACCOUNT;
use crate::chain::{Signer, TransactionHandle};
use crate::config::{AddressBook, NetworkConfig};
use crate::conversation::ParameterPatch;
use crate::error::ToolError;
use crate::stream::ToolCall;

use super::{ToolKind, ToolRequest};

/// A tool call that reached the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub kind: ToolKind,
    pub handle: TransactionHandle,
}

/// Turns tool calls into signed, submitted transactions.
///
/// Returns as soon as submission succeeds or fails; confirmation is the
/// tracker's job.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutor {
    contracts: AddressBook,
    network: NetworkConfig,
}

impl ToolExecutor {
    pub fn new(contracts: AddressBook, network: NetworkConfig) -> Self {
        Self { contracts, network }
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Validate a call and return the parameters describing it.
    pub fn describe(&self, call: &ToolCall) -> Result<ParameterPatch, ToolError> {
        let request = ToolRequest::parse(call, &self.contracts)?;
        Ok(request.parameters(&self.contracts, &self.network))
    }

    pub async fn execute(
        &self,
        call: &ToolCall,
        signer: &dyn Signer,
    ) -> Result<ToolOutcome, ToolError> {
        let request = ToolRequest::parse(call, &self.contracts)?;
        let kind = request.kind();
        let sender = signer
            .address()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS_ACCOUNT.to_string());
        let transaction = request.to_transaction(&sender, &self.contracts, &self.network);

        tracing::debug!(
            "Submitting {} as {} via {}",
            kind,
            sender,
            transaction.payload.function
        );
        let pending = signer
            .sign_and_submit(&transaction)
            .await
            .map_err(|source| ToolError::Submission {
                name: kind.as_str().to_string(),
                source,
            })?;
        tracing::info!("Submitted {} transaction {}", kind, pending.hash);

        Ok(ToolOutcome {
            kind,
            handle: pending.into(),
        })
    }
}
