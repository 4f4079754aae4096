//! Streaming assistant session core for Aptos tool transactions.
//!
//! A [`SessionController`] sends the conversation to an assistant backend,
//! decodes the streamed reply into typed events, records them in a
//! [`MessageLog`], and turns tool calls into signed transactions whose
//! lifecycle is tracked on the originating tool message.
//!
//! Keys and RPC access stay with the host: a [`chain::Signer`] is passed per
//! turn and a [`chain::ChainQuery`] per session.

pub mod backend;
pub mod chain;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod session;
pub mod stream;
pub mod tools;
pub mod tracker;

pub use config::Config;
pub use conversation::{Message, MessageLog, Parameter, ParameterPatch, Role};
pub use error::{Error, Result};
pub use session::{SessionController, TurnHandle, TurnOutcome, TurnReport};
