//! Ordered, append-only conversation log.
//!
//! Writers are the active turn plus any transaction trackers still running
//! from earlier turns; they address messages by index, never by turn.
//! Every mutation is broadcast to subscribers while the write guard is still
//! held, so an event is never delivered before the change it describes is
//! visible through [`MessageLog::snapshot`].

use futures::Stream;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use super::{Message, ParameterPatch, Role};
use crate::error::LogError;

const EVENT_CAPACITY: usize = 256;

/// Change notification. `len` is the log length right after the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogEvent {
    Appended { index: usize, len: usize },
    ContentExtended { index: usize, len: usize },
    ParametersUpdated { index: usize, len: usize },
}

impl LogEvent {
    pub fn index(&self) -> usize {
        match *self {
            Self::Appended { index, .. }
            | Self::ContentExtended { index, .. }
            | Self::ParametersUpdated { index, .. } => index,
        }
    }

    pub fn log_len(&self) -> usize {
        match *self {
            Self::Appended { len, .. }
            | Self::ContentExtended { len, .. }
            | Self::ParametersUpdated { len, .. } => len,
        }
    }
}

pub struct MessageLog {
    messages: RwLock<Vec<Message>>,
    events: broadcast::Sender<LogEvent>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            messages: RwLock::new(Vec::new()),
            events,
        }
    }

    /// Append a message and return its index.
    pub async fn append(&self, message: Message) -> usize {
        let mut messages = self.messages.write().await;
        let index = messages.len();
        tracing::debug!(index, role = message.role.as_str(), "Appending message");
        messages.push(message);
        self.notify(LogEvent::Appended {
            index,
            len: messages.len(),
        });
        index
    }

    /// Append streamed text to an assistant message.
    pub async fn extend_content(&self, index: usize, delta: &str) -> Result<(), LogError> {
        let mut messages = self.messages.write().await;
        let len = messages.len();
        let message = target(&mut messages, index, Role::Assistant)?;
        message.content.push_str(delta);
        self.notify(LogEvent::ContentExtended { index, len });
        Ok(())
    }

    /// Merge a partial parameter mapping into the tool message at `index`.
    ///
    /// Fails with `InvalidTarget` for any other role; on failure the log is
    /// left unchanged and no event is emitted.
    pub async fn update_parameters(
        &self,
        index: usize,
        patch: &ParameterPatch,
    ) -> Result<(), LogError> {
        let mut messages = self.messages.write().await;
        let len = messages.len();
        let message = target(&mut messages, index, Role::Tool)?;
        patch.apply_to(&mut message.parameters, index)?;
        tracing::debug!(
            index,
            keys = ?patch.keys().collect::<Vec<_>>(),
            "Updated tool parameters"
        );
        self.notify(LogEvent::ParametersUpdated { index, len });
        Ok(())
    }

    /// Consistent point-in-time copy of the whole log.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.read().await.clone()
    }

    pub async fn get(&self, index: usize) -> Option<Message> {
        self.messages.read().await.get(index).cloned()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }

    /// Stream of change notifications from now on.
    ///
    /// A subscriber that falls more than the channel capacity behind skips
    /// the missed events; it can resynchronise with [`Self::snapshot`].
    pub fn subscribe(&self) -> impl Stream<Item = LogEvent> + Send + Unpin + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(|event| match event {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("Message log subscriber lagged: {}", e);
                None
            }
        })
    }

    /// Hold the log open for reading; writers wait until it is dropped.
    #[cfg(test)]
    pub(crate) async fn read_guard(&self) -> tokio::sync::RwLockReadGuard<'_, Vec<Message>> {
        self.messages.read().await
    }

    fn notify(&self, event: LogEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn target(
    messages: &mut [Message],
    index: usize,
    expected: Role,
) -> Result<&mut Message, LogError> {
    let len = messages.len();
    let message = messages
        .get_mut(index)
        .ok_or(LogError::IndexOutOfRange { index, len })?;
    if message.role != expected {
        return Err(LogError::InvalidTarget {
            index,
            role: message.role.as_str(),
            expected: expected.as_str(),
        });
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::conversation::{Parameter, TransactionStatus, keys};

    #[tokio::test]
    async fn append_returns_sequential_indices() {
        let log = MessageLog::new();
        assert_eq!(log.append(Message::user("hi")).await, 0);
        assert_eq!(log.append(Message::assistant("hello")).await, 1);
        assert_eq!(log.len().await, 2);

        let snapshot = log.snapshot().await;
        assert_eq!(snapshot[0].role, Role::User);
        assert_eq!(snapshot[1].content, "hello");
    }

    #[tokio::test]
    async fn update_parameters_rejects_non_tool_target() {
        let log = MessageLog::new();
        log.append(Message::user("register nexai")).await;
        let before = log.snapshot().await;

        let err = log
            .update_parameters(0, &ParameterPatch::new().with("x", Parameter::integer(1)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LogError::InvalidTarget {
                index: 0,
                role: "user",
                expected: "tool"
            }
        ));
        assert_eq!(log.snapshot().await, before);
    }

    #[tokio::test]
    async fn update_parameters_out_of_range() {
        let log = MessageLog::new();
        let err = log
            .update_parameters(4, &ParameterPatch::new())
            .await
            .unwrap_err();
        assert_eq!(err, LogError::IndexOutOfRange { index: 4, len: 0 });
    }

    #[tokio::test]
    async fn extend_content_only_targets_assistant() {
        let log = MessageLog::new();
        let idx = log.append(Message::assistant("Hel")).await;
        log.extend_content(idx, "lo").await.unwrap();
        assert_eq!(log.get(idx).await.unwrap().content, "Hello");

        let tool = log.append(Message::tool("register", ParameterPatch::new())).await;
        assert!(log.extend_content(tool, "x").await.is_err());
    }

    #[tokio::test]
    async fn subscribers_see_length_at_least_as_large_as_event() {
        let log = Arc::new(MessageLog::new());
        let mut events = log.subscribe();

        let idx = log
            .append(Message::tool(
                "register",
                ParameterPatch::new().with(keys::STATUS, TransactionStatus::Pending),
            ))
            .await;
        log.update_parameters(
            idx,
            &ParameterPatch::new().with(keys::STATUS, TransactionStatus::Success),
        )
        .await
        .unwrap();

        let first = events.next().await.unwrap();
        assert_eq!(first, LogEvent::Appended { index: 0, len: 1 });
        assert!(log.snapshot().await.len() >= 1);
        let second = events.next().await.unwrap();
        assert_eq!(second, LogEvent::ParametersUpdated { index: 0, len: 1 });
    }

    #[tokio::test]
    async fn refused_update_emits_no_event() {
        let log = MessageLog::new();
        log.append(Message::error("boom")).await;
        let mut events = log.subscribe();

        assert!(
            log.update_parameters(0, &ParameterPatch::new())
                .await
                .is_err()
        );
        log.append(Message::user("next")).await;

        assert_eq!(
            events.next().await,
            Some(LogEvent::Appended { index: 1, len: 2 })
        );
    }

    #[tokio::test]
    async fn concurrent_writers_never_lose_appends() {
        let log = Arc::new(MessageLog::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                log.append(Message::user(format!("m{i}"))).await
            }));
        }
        let mut indices = Vec::new();
        for handle in handles {
            indices.push(handle.await.unwrap());
        }
        indices.sort_unstable();
        assert_eq!(indices, (0..16).collect::<Vec<_>>());
        assert_eq!(log.len().await, 16);
    }
}
