//! Error types for the copilot session core.
//!
//! Every failure kind a turn can hit is representable as data: the session
//! controller turns errors into `error`-role messages or parameter values,
//! so nothing here is allowed to unwind through the hosting process.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Message log error: {0}")]
    Log(#[from] LogError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Logging setup error: {0}")]
    Logging(#[from] LogSetupError),
}

impl Error {
    /// Stable dotted code for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config.invalid",
            Self::Log(e) => e.code(),
            Self::Stream(e) => e.code(),
            Self::Backend(e) => e.code(),
            Self::Chain(e) => e.code(),
            Self::Tool(e) => e.code(),
            Self::Session(e) => e.code(),
            Self::Logging(_) => "logging.invalid_filter",
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Subscriber installation failures.
#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },
}

/// Message log mutations that were refused. The log is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("Message {index} is a {role} message, expected {expected}")]
    InvalidTarget {
        index: usize,
        role: &'static str,
        expected: &'static str,
    },

    #[error("Message index {index} out of range (log has {len} messages)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Status of message {index} cannot move from {from} back to {to}")]
    StatusRegression {
        index: usize,
        from: String,
        to: String,
    },
}

impl LogError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTarget { .. } => "log.invalid_target",
            Self::IndexOutOfRange { .. } => "log.index_out_of_range",
            Self::StatusRegression { .. } => "log.status_regression",
        }
    }
}

/// Decoding failures on the assistant stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("Malformed stream frame: {reason}")]
    Protocol { reason: String },
}

impl StreamError {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol { .. } => "stream.protocol_error",
        }
    }
}

/// Assistant backend transport errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Backend request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend stream interrupted: {reason}")]
    Interrupted { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BackendError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::RequestFailed { .. } | Self::Http(_) => "backend.request_failed",
            Self::Status { .. } => "backend.bad_status",
            Self::Interrupted { .. } => "backend.interrupted",
        }
    }
}

/// Errors reported by the signer and chain-query capabilities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("Transaction submission rejected: {reason}")]
    Submission { reason: String },

    #[error("Waiting for finality of {hash} failed: {reason}")]
    Finality { hash: String, reason: String },

    #[error("Block lookup for ledger version {version} failed: {reason}")]
    BlockLookup { version: u64, reason: String },

    #[error("Chain endpoint unavailable: {reason}")]
    Unavailable { reason: String },
}

impl ChainError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Submission { .. } => "chain.submission_rejected",
            Self::Finality { .. } => "chain.finality_failed",
            Self::BlockLookup { .. } => "chain.block_lookup_failed",
            Self::Unavailable { .. } => "chain.unavailable",
        }
    }
}

/// Tool resolution and submission errors. Fatal to the tool call only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String },

    #[error("Invalid arguments for tool {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool {name} submission failed: {source}")]
    Submission {
        name: String,
        #[source]
        source: ChainError,
    },
}

impl ToolError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "tool.unknown",
            Self::InvalidArguments { .. } => "tool.invalid_arguments",
            Self::Submission { .. } => "tool.submission_failed",
        }
    }
}

/// Rejected session submissions. The log is never touched by a rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Turn {turn_id} in progress; cancel it or wait for it to finish")]
    TurnInProgress { turn_id: uuid::Uuid },

    #[error("Message is empty")]
    EmptyInput,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TurnInProgress { .. } => "session.turn_in_progress",
            Self::EmptyInput => "session.empty_input",
        }
    }
}

/// Why a submitted transaction ended in the `Failed` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The chain executed the transaction and reported failure.
    Rejected { vm_status: String },
    /// Finality was not observed within the configured bound.
    ConfirmationTimeout { waited: Duration },
    /// The finality query itself failed.
    FinalityUnavailable { reason: String },
}

impl FailureReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "tx.rejected",
            Self::ConfirmationTimeout { .. } => "tx.confirmation_timeout",
            Self::FinalityUnavailable { .. } => "tx.finality_unavailable",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected { vm_status } => write!(f, "rejected on chain: {}", vm_status),
            Self::ConfirmationTimeout { waited } => {
                write!(f, "not confirmed after {:?}", waited)
            }
            Self::FinalityUnavailable { reason } => write!(f, "finality unavailable: {}", reason),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
