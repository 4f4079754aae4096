//! Scripted backend that replays canned response bodies.
//!
//! Used for demos and tests: each `open` pops the next script and records
//! the request it was given.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::Mutex;

use super::{AssistantBackend, ChunkStream, TurnRequest};
use crate::error::BackendError;

/// One step of a scripted response body.
#[derive(Debug, Clone)]
pub enum ReplayChunk {
    Data(Bytes),
    Delay(Duration),
    /// Fail the transport with this reason.
    Fail(String),
    /// Never produce anything else; the stream stays open until dropped.
    Hang,
}

impl ReplayChunk {
    pub fn data(text: impl Into<String>) -> Self {
        Self::Data(Bytes::from(text.into()))
    }

    /// One complete SSE frame carrying `payload`.
    pub fn frame(payload: serde_json::Value) -> Self {
        Self::data(format!("data: {}\n\n", payload))
    }
}

#[derive(Default)]
pub struct ReplayBackend {
    scripts: Mutex<VecDeque<Vec<ReplayChunk>>>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ReplayBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response body for the next turn.
    pub async fn push_script(&self, script: Vec<ReplayChunk>) {
        self.scripts.lock().await.push_back(script);
    }

    /// Requests seen so far, oldest first.
    pub async fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl AssistantBackend for ReplayBackend {
    async fn open(&self, request: &TurnRequest) -> Result<ChunkStream, BackendError> {
        self.requests.lock().await.push(request.clone());
        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| BackendError::RequestFailed {
                reason: "no scripted response left".to_string(),
            })?;

        let steps: VecDeque<ReplayChunk> = script.into();
        Ok(futures::stream::unfold(steps, |mut steps| async move {
            loop {
                match steps.pop_front()? {
                    ReplayChunk::Data(bytes) => return Some((Ok(bytes), steps)),
                    ReplayChunk::Delay(duration) => tokio::time::sleep(duration).await,
                    ReplayChunk::Fail(reason) => {
                        steps.clear();
                        return Some((Err(BackendError::Interrupted { reason }), steps));
                    }
                    ReplayChunk::Hang => futures::future::pending::<()>().await,
                }
            }
        })
        .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;

    #[tokio::test]
    async fn replays_scripts_in_order_and_records_requests() {
        let backend = ReplayBackend::new();
        backend
            .push_script(vec![
                ReplayChunk::data("data: one\n\n"),
                ReplayChunk::Delay(Duration::from_millis(1)),
                ReplayChunk::data("data: two\n\n"),
            ])
            .await;

        let request = super::super::TurnRequest::new(vec![Message::user("hi")], Some("0x1"));
        let body: Vec<_> = backend.open(&request).await.unwrap().collect().await;
        assert_eq!(body.len(), 2);
        assert_eq!(body[1].as_ref().unwrap().as_ref(), b"data: two\n\n");

        assert_eq!(backend.requests().await.len(), 1);
        assert!(backend.open(&request).await.is_err());
    }

    #[tokio::test]
    async fn fail_step_ends_the_body_with_an_error() {
        let backend = ReplayBackend::new();
        backend
            .push_script(vec![
                ReplayChunk::Fail("reset".to_string()),
                ReplayChunk::data("never"),
            ])
            .await;
        let request = super::super::TurnRequest::new(vec![], None);
        let body: Vec<_> = backend.open(&request).await.unwrap().collect().await;
        assert_eq!(body.len(), 1);
        assert!(body[0].is_err());
    }
}
