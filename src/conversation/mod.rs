//! Conversation model: messages, typed parameters and the shared log.

mod log;
mod parameter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use self::log::{LogEvent, MessageLog};
pub use self::parameter::{
    CoinDescriptor, Parameter, ParameterPatch, Parameters, TransactionStatus, keys,
};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Tool,
    Error,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Error => "error",
        }
    }
}

/// One conversation entry.
///
/// For `tool` messages `content` is the tool name and `parameters` carries
/// the request arguments plus whatever transaction tracking has reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Parameters::is_empty")]
    pub parameters: Parameters,
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            parameters: Parameters::new(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(Role::Error, content)
    }

    pub fn tool(name: impl Into<String>, parameters: ParameterPatch) -> Self {
        let mut message = Self::new(Role::Tool, name);
        // A fresh mapping has no status to regress from.
        let _ = parameters.apply_to(&mut message.parameters, 0);
        message
    }

    /// Parameter lookup shortcut.
    pub fn parameter(&self, key: &str) -> Option<&Parameter> {
        self.parameters.get(key)
    }
}
