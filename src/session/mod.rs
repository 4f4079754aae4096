//! One conversational session: turns, cancellation and tool dispatch.

mod controller;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use self::controller::SessionController;
use crate::stream::ToolCall;

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The stream delivered `TurnEnd`.
    Completed,
    /// The backend, the transport or the stream protocol failed; the
    /// message is also in the log as an `error` entry.
    Failed { message: String },
    Cancelled,
}

/// Summary of a finished turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub outcome: TurnOutcome,
    pub assistant_text: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Handle to a running turn.
#[derive(Debug)]
pub struct TurnHandle {
    id: Uuid,
    task: JoinHandle<TurnReport>,
}

impl TurnHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the turn to reach a terminal state.
    pub async fn wait(self) -> TurnReport {
        let id = self.id;
        self.task.await.unwrap_or_else(|e| TurnReport {
            turn_id: id,
            outcome: TurnOutcome::Failed {
                message: format!("turn task aborted: {}", e),
            },
            assistant_text: String::new(),
            tool_calls: Vec::new(),
        })
    }
}

/// Where a tool call from this turn landed in the log.
#[derive(Debug, Clone)]
struct ToolSlot {
    call_id: Option<String>,
    name: String,
    index: usize,
}

/// Working state of the active turn.
#[derive(Debug)]
struct SessionTurn {
    id: Uuid,
    cancel: CancellationToken,
    assistant_index: Option<usize>,
    assistant_text: String,
    tool_calls: Vec<ToolCall>,
    tool_slots: Vec<ToolSlot>,
}

impl SessionTurn {
    fn new(id: Uuid, cancel: CancellationToken) -> Self {
        Self {
            id,
            cancel,
            assistant_index: None,
            assistant_text: String::new(),
            tool_calls: Vec::new(),
            tool_slots: Vec::new(),
        }
    }

    /// Tool message a result refers to: by call id, else the latest call
    /// with the same name.
    fn slot_for(&self, call_id: Option<&str>, name: &str) -> Option<usize> {
        if let Some(id) = call_id
            && let Some(slot) = self
                .tool_slots
                .iter()
                .find(|s| s.call_id.as_deref() == Some(id))
        {
            return Some(slot.index);
        }
        self.tool_slots
            .iter()
            .rev()
            .find(|s| s.name == name)
            .map(|s| s.index)
    }

    fn into_report(self, outcome: TurnOutcome) -> TurnReport {
        TurnReport {
            turn_id: self.id,
            outcome,
            assistant_text: self.assistant_text,
            tool_calls: self.tool_calls,
        }
    }
}
