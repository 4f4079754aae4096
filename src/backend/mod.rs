//! Assistant backend: the collaborator that streams a turn's response.

mod http;
mod replay;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

pub use self::http::HttpBackend;
pub use self::replay::{ReplayBackend, ReplayChunk};
use crate::conversation::Message;
use crate::error::BackendError;

/// Account sent when the signer has no address to report.
pub const ANONYMOUS_ACCOUNT: &str = "0x0";

/// Raw response body, chunked however the transport delivers it.
pub type ChunkStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Request body for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnRequest {
    /// Full history, ending with the user message that opened the turn.
    pub messages: Vec<Message>,
    /// Address of the account the assistant should act for.
    pub account: String,
}

impl TurnRequest {
    pub fn new(messages: Vec<Message>, account: Option<&str>) -> Self {
        Self {
            messages,
            account: account
                .filter(|a| !a.trim().is_empty())
                .unwrap_or(ANONYMOUS_ACCOUNT)
                .to_string(),
        }
    }
}

/// Opens the response stream for a turn.
///
/// The stream must preserve order and end exactly once. Dropping it must
/// release the underlying connection; that is how turns are cancelled.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn open(&self, request: &TurnRequest) -> Result<ChunkStream, BackendError>;
}
