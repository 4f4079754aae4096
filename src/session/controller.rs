use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{SessionTurn, ToolSlot, TurnHandle, TurnOutcome, TurnReport};
use crate::backend::{AssistantBackend, TurnRequest};
use crate::chain::{ChainQuery, Signer};
use crate::config::{Config, TrackerConfig};
use crate::conversation::{Message, MessageLog, ParameterPatch};
use crate::error::SessionError;
use crate::stream::{self, SessionEvent, ToolCall};
use crate::tools::ToolExecutor;
use crate::tracker::{TransactionState, TransactionTracker};

struct ActiveTurn {
    id: Uuid,
    cancel: CancellationToken,
}

/// Orchestrates turns against one message log.
///
/// At most one turn is open at a time. Transaction trackers spawned by a
/// turn outlive it and keep writing to the log by index.
pub struct SessionController {
    log: Arc<MessageLog>,
    backend: Arc<dyn AssistantBackend>,
    chain: Arc<dyn ChainQuery>,
    executor: ToolExecutor,
    tracker_config: TrackerConfig,
    active: Mutex<Option<ActiveTurn>>,
    trackers: Mutex<Vec<JoinHandle<TransactionState>>>,
}

/// Owns the active slot from the moment a turn is admitted.
///
/// Moved into the turn task once it is spawned, so the slot is cleared when
/// the task exits (panics included) or when `submit` is dropped before the
/// task exists.
struct ActiveGuard {
    controller: Arc<SessionController>,
    id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.controller.lock_active();
        if active.as_ref().is_some_and(|turn| turn.id == self.id) {
            *active = None;
        }
    }
}

impl SessionController {
    pub fn new(backend: Arc<dyn AssistantBackend>, chain: Arc<dyn ChainQuery>) -> Self {
        Self {
            log: Arc::new(MessageLog::new()),
            backend,
            chain,
            executor: ToolExecutor::default(),
            tracker_config: TrackerConfig::default(),
            active: Mutex::new(None),
            trackers: Mutex::new(Vec::new()),
        }
    }

    /// Controller wired with the configured contracts, network and bounds.
    pub fn from_config(
        config: &Config,
        backend: Arc<dyn AssistantBackend>,
        chain: Arc<dyn ChainQuery>,
    ) -> Self {
        Self::new(backend, chain)
            .with_executor(ToolExecutor::new(
                config.contracts.clone(),
                config.network.clone(),
            ))
            .with_tracker_config(config.tracker)
    }

    pub fn with_executor(mut self, executor: ToolExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_tracker_config(mut self, config: TrackerConfig) -> Self {
        self.tracker_config = config;
        self
    }

    /// Continue an existing conversation.
    pub fn with_log(mut self, log: Arc<MessageLog>) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> &Arc<MessageLog> {
        &self.log
    }

    /// Id of the open turn, if any.
    pub fn active_turn(&self) -> Option<Uuid> {
        self.lock_active().as_ref().map(|turn| turn.id)
    }

    /// Start a turn for `input`, acting as `signer`.
    ///
    /// The user message is in the log when this returns. A rejected call
    /// leaves the log untouched.
    pub async fn submit(
        self: &Arc<Self>,
        input: &str,
        signer: Arc<dyn Signer>,
    ) -> Result<TurnHandle, SessionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let (turn, guard) = {
            let mut active = self.lock_active();
            if let Some(ref current) = *active {
                tracing::debug!(turn_id = %current.id, "Rejected submission, turn is open");
                return Err(SessionError::TurnInProgress {
                    turn_id: current.id,
                });
            }
            let turn = SessionTurn::new(Uuid::new_v4(), CancellationToken::new());
            *active = Some(ActiveTurn {
                id: turn.id,
                cancel: turn.cancel.clone(),
            });
            let guard = ActiveGuard {
                controller: Arc::clone(self),
                id: turn.id,
            };
            (turn, guard)
        };

        self.log.append(Message::user(input)).await;
        let request = TurnRequest::new(self.log.snapshot().await, signer.address().as_deref());
        tracing::info!(
            turn_id = %turn.id,
            account = %request.account,
            history = request.messages.len(),
            "Turn started"
        );

        let id = turn.id;
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let _guard = guard;
            this.run_turn(turn, request, signer).await
        });
        Ok(TurnHandle { id, task })
    }

    /// Stop reading the open turn's stream.
    ///
    /// Transactions already submitted keep being tracked. Returns `false`
    /// when no turn is open.
    pub fn cancel(&self) -> bool {
        match self.lock_active().as_ref() {
            Some(turn) => {
                tracing::info!(turn_id = %turn.id, "Cancelling turn");
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for every transaction tracker spawned so far.
    pub async fn wait_for_trackers(&self) -> Vec<TransactionState> {
        let mut states = Vec::new();
        loop {
            let pending: Vec<_> = match self.trackers.lock() {
                Ok(mut trackers) => trackers.drain(..).collect(),
                Err(poisoned) => poisoned.into_inner().drain(..).collect(),
            };
            if pending.is_empty() {
                return states;
            }
            for task in pending {
                match task.await {
                    Ok(state) => states.push(state),
                    Err(e) => tracing::warn!("Transaction tracker task failed: {}", e),
                }
            }
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<ActiveTurn>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn run_turn(
        self: Arc<Self>,
        mut turn: SessionTurn,
        request: TurnRequest,
        signer: Arc<dyn Signer>,
    ) -> TurnReport {
        let cancel = turn.cancel.clone();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            opened = self.backend.open(&request) => Some(opened),
        };
        let chunks = match opened {
            None => return self.finish(turn, TurnOutcome::Cancelled),
            Some(Ok(chunks)) => chunks,
            Some(Err(e)) => {
                tracing::warn!(
                    turn_id = %turn.id,
                    code = e.code(),
                    "Backend request failed: {}",
                    e
                );
                let message = format!("Failed to reach the assistant: {}", e);
                self.log.append(Message::error(message.clone())).await;
                return self.finish(turn, TurnOutcome::Failed { message });
            }
        };

        let mut events = std::pin::pin!(stream::decode(chunks));
        let outcome = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break TurnOutcome::Cancelled,
                next = events.next() => next,
            };

            let event = match next {
                None => break TurnOutcome::Completed,
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    tracing::warn!(turn_id = %turn.id, code = e.code(), "{}", e);
                    let message = e.to_string();
                    self.log.append(Message::error(message.clone())).await;
                    break TurnOutcome::Failed { message };
                }
            };

            tracing::debug!(turn_id = %turn.id, kind = event.kind(), "Session event");
            match event {
                SessionEvent::TextDelta(delta) => self.on_text(&mut turn, &delta).await,
                SessionEvent::ToolCall(call) => self.on_tool_call(&mut turn, call, &signer).await,
                SessionEvent::ToolResult {
                    call_id,
                    name,
                    outcome,
                } => {
                    self.on_tool_result(&turn, call_id.as_deref(), &name, &outcome)
                        .await
                }
                SessionEvent::TurnError(message) => {
                    self.log.append(Message::error(message.clone())).await;
                    break TurnOutcome::Failed { message };
                }
                SessionEvent::TurnEnd => break TurnOutcome::Completed,
            }
        };

        self.finish(turn, outcome)
    }

    fn finish(&self, turn: SessionTurn, outcome: TurnOutcome) -> TurnReport {
        tracing::info!(
            turn_id = %turn.id,
            tool_calls = turn.tool_calls.len(),
            "Turn ended: {:?}",
            outcome
        );
        turn.into_report(outcome)
    }

    async fn on_text(&self, turn: &mut SessionTurn, delta: &str) {
        turn.assistant_text.push_str(delta);
        let index = match turn.assistant_index {
            Some(index) => index,
            None => {
                // Created with the first delta already in place.
                let index = self.log.append(Message::assistant(delta)).await;
                turn.assistant_index = Some(index);
                return;
            }
        };
        if let Err(e) = self.log.extend_content(index, delta).await {
            tracing::warn!(index, code = e.code(), "Dropped text delta: {}", e);
        }
    }

    async fn on_tool_call(
        &self,
        turn: &mut SessionTurn,
        call: ToolCall,
        signer: &Arc<dyn Signer>,
    ) {
        turn.tool_calls.push(call.clone());

        let parameters = match self.executor.describe(&call) {
            Ok(parameters) => parameters,
            Err(e) => {
                tracing::warn!(turn_id = %turn.id, code = e.code(), "Tool call rejected: {}", e);
                self.log.append(Message::error(e.to_string())).await;
                return;
            }
        };

        let index = self
            .log
            .append(Message::tool(call.name.clone(), parameters))
            .await;
        turn.tool_slots.push(ToolSlot {
            call_id: call.id.clone(),
            name: call.name.clone(),
            index,
        });

        match self.executor.execute(&call, signer.as_ref()).await {
            Ok(outcome) => {
                let tracker = TransactionTracker::new(
                    Arc::clone(&self.log),
                    Arc::clone(signer),
                    Arc::clone(&self.chain),
                    self.tracker_config,
                    self.executor.network().native_coin.clone(),
                );
                let task = tracker.spawn(index, outcome.handle);
                let mut trackers = match self.trackers.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                trackers.retain(|handle| !handle.is_finished());
                trackers.push(task);
            }
            Err(e) => {
                tracing::warn!(
                    turn_id = %turn.id,
                    code = e.code(),
                    "Tool submission failed: {}",
                    e
                );
                self.log.append(Message::error(e.to_string())).await;
            }
        }
    }

    async fn on_tool_result(
        &self,
        turn: &SessionTurn,
        call_id: Option<&str>,
        name: &str,
        outcome: &serde_json::Value,
    ) {
        let mut patch = ParameterPatch::from_json(outcome);
        match turn.slot_for(call_id, name) {
            Some(index) => {
                // Lifecycle keys on a tracked message come from the chain only.
                let ignored = patch.strip_tracker_keys();
                if !ignored.is_empty() {
                    tracing::warn!(
                        index,
                        keys = ?ignored,
                        "Ignoring lifecycle keys in tool result for {}",
                        name
                    );
                }
                if patch.is_empty() {
                    return;
                }
                if let Err(e) = self.log.update_parameters(index, &patch).await {
                    tracing::warn!(index, code = e.code(), "Dropped tool result: {}", e);
                }
            }
            None => {
                self.log.append(Message::tool(name, patch)).await;
            }
        }
    }
}
