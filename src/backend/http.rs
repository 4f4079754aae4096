//! HTTP transport for the assistant backend.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;

use super::{AssistantBackend, ChunkStream, TurnRequest};
use crate::config::BackendConfig;
use crate::error::BackendError;

const MAX_ERROR_BODY: usize = 512;

/// POSTs the turn request as JSON and streams the SSE response body.
pub struct HttpBackend {
    config: BackendConfig,
    client: Client,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl AssistantBackend for HttpBackend {
    async fn open(&self, request: &TurnRequest) -> Result<ChunkStream, BackendError> {
        let mut builder = self
            .client
            .post(self.config.endpoint.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request);
        if let Some(ref key) = self.config.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        tracing::debug!(
            "Opening assistant stream at {} ({} messages)",
            self.config.endpoint,
            request.messages.len()
        );
        let response = builder.send().await.map_err(|e| BackendError::RequestFailed {
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| BackendError::Interrupted {
                    reason: e.to_string(),
                })
            })
            .boxed())
    }
}
