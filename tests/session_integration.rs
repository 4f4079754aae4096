//! End-to-end turns against a scripted backend and the paper chain.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aptos_copilot::backend::{ANONYMOUS_ACCOUNT, ReplayBackend, ReplayChunk};
use aptos_copilot::chain::{PaperChain, PaperChainConfig, Signer};
use aptos_copilot::config::AddressBook;
use aptos_copilot::conversation::{CoinDescriptor, keys};
use aptos_copilot::error::SessionError;
use aptos_copilot::stream::CLOSED_EARLY;
use aptos_copilot::tracker::TransactionState;
use aptos_copilot::{Message, Parameter, Role, SessionController, TurnOutcome};
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

fn text(delta: &str) -> ReplayChunk {
    ReplayChunk::frame(json!({"type": "text_delta", "text": delta}))
}

fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ReplayChunk {
    ReplayChunk::frame(json!({"type": "tool_call", "id": id, "name": name, "arguments": arguments}))
}

fn end() -> ReplayChunk {
    ReplayChunk::frame(json!({"type": "end"}))
}

struct Harness {
    backend: Arc<ReplayBackend>,
    chain: Arc<PaperChain>,
    controller: Arc<SessionController>,
}

impl Harness {
    fn new(config: PaperChainConfig) -> Self {
        let backend = Arc::new(ReplayBackend::new());
        let chain = Arc::new(PaperChain::new(config));
        let controller = Arc::new(SessionController::new(backend.clone(), chain.clone()));
        Self {
            backend,
            chain,
            controller,
        }
    }

    fn signer(&self) -> Arc<dyn Signer> {
        self.chain.clone()
    }

    async fn snapshot(&self) -> Vec<Message> {
        self.controller.log().snapshot().await
    }
}

fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|m| m.role).collect()
}

#[tokio::test]
async fn register_name_is_tracked_to_block() {
    let harness = Harness::new(PaperChainConfig::default());
    harness
        .backend
        .push_script(vec![
            text("Registering "),
            text("nexai.apt for you."),
            tool_call("call-1", "register", json!({"name": "nexai.apt"})),
            end(),
        ])
        .await;

    let handle = harness
        .controller
        .submit("I want the Aptos Name 'nexai.apt'", harness.signer())
        .await
        .unwrap();
    let report = handle.wait().await;
    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(report.assistant_text, "Registering nexai.apt for you.");
    assert_eq!(report.tool_calls.len(), 1);

    let states = harness.controller.wait_for_trackers().await;
    assert_eq!(states.len(), 1);
    assert!(matches!(states[0], TransactionState::Confirmed(_)));

    let messages = harness.snapshot().await;
    assert_eq!(roles(&messages), vec![Role::User, Role::Assistant, Role::Tool]);
    assert_eq!(messages[1].content, "Registering nexai.apt for you.");

    let tool = &messages[2];
    assert_eq!(tool.content, "register");
    assert_eq!(tool.parameter("name"), Some(&Parameter::text("nexai.apt")));
    assert_eq!(
        tool.parameter(keys::STATUS),
        Some(&Parameter::text("Success"))
    );
    assert!(matches!(
        tool.parameter(keys::TRANSACTION),
        Some(Parameter::Hash { .. })
    ));
    assert_eq!(
        tool.parameter(keys::GAS),
        Some(&Parameter::coin(1_000, CoinDescriptor::apt()))
    );
    assert_eq!(
        tool.parameter(keys::GAS_UNIT_PRICE),
        Some(&Parameter::integer(100))
    );
    assert_eq!(tool.parameter(keys::BLOCK), Some(&Parameter::block(42)));

    let requests = harness.backend.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].account,
        harness.chain.address().unwrap_or_default()
    );
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[0].messages[0].role, Role::User);
}

#[tokio::test]
async fn malformed_frame_ends_turn_with_one_error() {
    let harness = Harness::new(PaperChainConfig::default());
    harness
        .backend
        .push_script(vec![
            text("Looking"),
            ReplayChunk::data("data: {\"type\": \"text_delta\", \"text\"\n\n"),
            text(" never shown"),
            tool_call("call-1", "register", json!({"name": "nexai"})),
            end(),
        ])
        .await;

    let report = harness
        .controller
        .submit("register nexai", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    assert!(matches!(report.outcome, TurnOutcome::Failed { .. }));
    assert_eq!(report.assistant_text, "Looking");
    assert!(report.tool_calls.is_empty());

    let messages = harness.snapshot().await;
    assert_eq!(roles(&messages), vec![Role::User, Role::Assistant, Role::Error]);
    assert!(messages[2].content.contains("Malformed stream frame"));
    assert_eq!(harness.chain.submitted_count().await, 0);
}

#[tokio::test]
async fn second_submit_is_rejected_while_turn_is_open() {
    let harness = Harness::new(PaperChainConfig::default());
    harness.backend.push_script(vec![ReplayChunk::Hang]).await;

    let first = harness
        .controller
        .submit("first", harness.signer())
        .await
        .unwrap();
    let before = harness.snapshot().await;

    let err = harness
        .controller
        .submit("second", harness.signer())
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::TurnInProgress { turn_id: first.id() });
    assert_eq!(harness.snapshot().await, before);
    assert_eq!(harness.controller.active_turn(), Some(first.id()));

    assert!(harness.controller.cancel());
    let report = first.wait().await;
    assert_eq!(report.outcome, TurnOutcome::Cancelled);
    assert_eq!(harness.controller.active_turn(), None);
    assert!(!harness.controller.cancel());
}

#[tokio::test]
async fn empty_input_leaves_log_untouched() {
    let harness = Harness::new(PaperChainConfig::default());
    let err = harness
        .controller
        .submit("   \n", harness.signer())
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::EmptyInput);
    assert!(harness.snapshot().await.is_empty());
    assert!(harness.backend.requests().await.is_empty());
}

#[tokio::test]
async fn cancelled_turn_still_reports_transaction_outcome() {
    let harness = Harness::new(PaperChainConfig {
        finality_delay: Duration::from_millis(200),
        ..PaperChainConfig::default()
    });
    harness
        .backend
        .push_script(vec![
            tool_call("call-1", "register", json!({"name": "nexai"})),
            ReplayChunk::Hang,
        ])
        .await;

    let handle = harness
        .controller
        .submit("register nexai", harness.signer())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.chain.submitted_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transaction was never submitted");

    assert!(harness.controller.cancel());
    assert_eq!(handle.wait().await.outcome, TurnOutcome::Cancelled);

    let states = harness.controller.wait_for_trackers().await;
    assert!(matches!(states.as_slice(), [TransactionState::Confirmed(_)]));

    let messages = harness.snapshot().await;
    let tool = messages
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool message");
    assert_eq!(
        tool.parameter(keys::STATUS),
        Some(&Parameter::text("Success"))
    );
    assert_eq!(tool.parameter(keys::BLOCK), Some(&Parameter::block(42)));
}

#[tokio::test]
async fn metadata_never_precedes_success_and_log_only_grows() {
    let harness = Harness::new(PaperChainConfig {
        finality_delay: Duration::from_millis(20),
        block_lookup_failures: 1,
        ..PaperChainConfig::default()
    });
    harness
        .backend
        .push_script(vec![
            text("On it."),
            tool_call("call-1", "register", json!({"name": "nexai"})),
            end(),
        ])
        .await;

    let log = harness.controller.log().clone();
    let mut events = log.subscribe();
    let watcher = tokio::spawn(async move {
        let mut last_len = 0;
        loop {
            let event = events.next().await.expect("log event stream ended");
            assert!(event.log_len() >= last_len, "log shrank at {event:?}");
            last_len = event.log_len();

            let snapshot = log.snapshot().await;
            assert!(snapshot.len() >= last_len);
            for tool in snapshot.iter().filter(|m| m.role == Role::Tool) {
                let has_metadata = tool.parameter(keys::GAS).is_some()
                    || tool.parameter(keys::GAS_UNIT_PRICE).is_some()
                    || tool.parameter(keys::BLOCK).is_some();
                if has_metadata {
                    assert_eq!(
                        tool.parameter(keys::STATUS),
                        Some(&Parameter::text("Success"))
                    );
                }
                if matches!(tool.parameter(keys::BLOCK), Some(Parameter::Block { .. })) {
                    return;
                }
            }
        }
    });

    harness
        .controller
        .submit("register nexai", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    harness.controller.wait_for_trackers().await;

    tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .expect("watcher never saw the block height")
        .unwrap();
}

#[tokio::test]
async fn unknown_tool_is_an_error_message_and_turn_continues() {
    let harness = Harness::new(PaperChainConfig::default());
    harness
        .backend
        .push_script(vec![
            tool_call("call-1", "stake", json!({"amount": "1"})),
            text("Staking is not supported yet."),
            end(),
        ])
        .await;

    let report = harness
        .controller
        .submit("stake 1 APT", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert_eq!(report.tool_calls.len(), 1);

    let messages = harness.snapshot().await;
    assert_eq!(roles(&messages), vec![Role::User, Role::Error, Role::Assistant]);
    assert!(messages[1].content.contains("Unknown tool 'stake'"));
    assert!(harness.controller.wait_for_trackers().await.is_empty());
}

#[tokio::test]
async fn submission_failure_starts_no_tracker() {
    let function = format!(
        "{}::register_domain",
        AddressBook::default().aptos.name_service
    );
    let harness = Harness::new(PaperChainConfig {
        reject_on_submit: HashSet::from([function]),
        ..PaperChainConfig::default()
    });
    harness
        .backend
        .push_script(vec![
            tool_call("call-1", "register", json!({"name": "nexai"})),
            end(),
        ])
        .await;

    let report = harness
        .controller
        .submit("register nexai", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(report.outcome, TurnOutcome::Completed);
    assert!(harness.controller.wait_for_trackers().await.is_empty());

    let messages = harness.snapshot().await;
    assert_eq!(roles(&messages), vec![Role::User, Role::Tool, Role::Error]);
    assert!(messages[1].parameter(keys::STATUS).is_none());
    assert!(messages[2].content.contains("submission failed"));
}

#[tokio::test]
async fn rejected_transaction_is_failed_status_not_an_error() {
    let function = format!(
        "{}::register_domain",
        AddressBook::default().aptos.name_service
    );
    let harness = Harness::new(PaperChainConfig {
        abort_on_chain: HashSet::from([function]),
        ..PaperChainConfig::default()
    });
    harness
        .backend
        .push_script(vec![
            tool_call("call-1", "register", json!({"name": "nexai"})),
            end(),
        ])
        .await;

    harness
        .controller
        .submit("register nexai", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    let states = harness.controller.wait_for_trackers().await;
    assert!(matches!(states.as_slice(), [TransactionState::Failed(_)]));

    let messages = harness.snapshot().await;
    assert_eq!(roles(&messages), vec![Role::User, Role::Tool]);
    let tool = &messages[1];
    assert_eq!(tool.parameter(keys::STATUS), Some(&Parameter::text("Failed")));
    assert!(tool.parameter(keys::GAS).is_none());
    assert!(tool.parameter(keys::BLOCK).is_none());
}

#[tokio::test]
async fn tool_result_updates_the_matching_tool_message() {
    let harness = Harness::new(PaperChainConfig::default());
    harness
        .backend
        .push_script(vec![
            tool_call("call-1", "bridge", json!({"amount": "5", "to_chain": "ethereum"})),
            ReplayChunk::frame(json!({
                "type": "tool_result",
                "id": "call-1",
                "name": "bridge",
                "outcome": {"eta": "10 minutes"}
            })),
            ReplayChunk::frame(json!({
                "type": "tool_result",
                "name": "quote",
                "outcome": "1 APT = 8.1 mUSDC"
            })),
            ReplayChunk::data("data: [DONE]\n\n"),
        ])
        .await;

    let report = harness
        .controller
        .submit("bridge 5 mUSDC to ethereum", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(report.outcome, TurnOutcome::Completed);
    harness.controller.wait_for_trackers().await;

    let messages = harness.snapshot().await;
    assert_eq!(roles(&messages), vec![Role::User, Role::Tool, Role::Tool]);
    let bridge = &messages[1];
    assert_eq!(bridge.parameter("eta"), Some(&Parameter::text("10 minutes")));
    assert_eq!(bridge.parameter("destination"), Some(&Parameter::text("ethereum")));
    assert_eq!(
        bridge.parameter(keys::STATUS),
        Some(&Parameter::text("Success"))
    );

    let quote = &messages[2];
    assert_eq!(quote.content, "quote");
    assert_eq!(
        quote.parameter("result"),
        Some(&Parameter::text("1 APT = 8.1 mUSDC"))
    );
}

#[tokio::test]
async fn transport_failures_become_error_messages() {
    let harness = Harness::new(PaperChainConfig::default());
    harness
        .backend
        .push_script(vec![text("Hel"), ReplayChunk::Fail("connection reset".to_string())])
        .await;
    harness.backend.push_script(vec![text("partial")]).await;

    let signer = harness.signer();
    let report = harness
        .controller
        .submit("hello", signer.clone())
        .await
        .unwrap()
        .wait()
        .await;
    assert!(matches!(
        report.outcome,
        TurnOutcome::Failed { ref message } if message.contains("connection reset")
    ));

    let report = harness
        .controller
        .submit("again", signer.clone())
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(
        report.outcome,
        TurnOutcome::Failed {
            message: CLOSED_EARLY.to_string()
        }
    );

    // No script left: the backend request itself fails.
    let report = harness
        .controller
        .submit("third", signer)
        .await
        .unwrap()
        .wait()
        .await;
    assert!(matches!(report.outcome, TurnOutcome::Failed { .. }));

    let messages = harness.snapshot().await;
    assert_eq!(
        roles(&messages),
        vec![
            Role::User,
            Role::Assistant,
            Role::Error,
            Role::User,
            Role::Assistant,
            Role::Error,
            Role::User,
            Role::Error,
        ]
    );
    assert!(messages[7].content.starts_with("Failed to reach the assistant"));
}

#[tokio::test]
async fn signer_without_address_is_sent_as_zero_account() {
    let harness = Harness::new(PaperChainConfig {
        address: None,
        ..PaperChainConfig::default()
    });
    harness.backend.push_script(vec![end()]).await;

    harness
        .controller
        .submit("hi", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    let requests = harness.backend.requests().await;
    assert_eq!(requests[0].account, ANONYMOUS_ACCOUNT);
}

#[tokio::test]
async fn history_accumulates_across_turns() {
    let harness = Harness::new(PaperChainConfig::default());
    harness.backend.push_script(vec![text("Hi!"), end()]).await;
    harness.backend.push_script(vec![text("Sure."), end()]).await;

    for input in ["hello", "register a name"] {
        harness
            .controller
            .submit(input, harness.signer())
            .await
            .unwrap()
            .wait()
            .await;
    }

    let requests = harness.backend.requests().await;
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[1].content, "Hi!");
    assert_eq!(requests[1].messages[2].content, "register a name");
}

#[tokio::test]
async fn tool_result_cannot_override_tracked_lifecycle() {
    let function = format!(
        "{}::register_domain",
        AddressBook::default().aptos.name_service
    );
    let harness = Harness::new(PaperChainConfig {
        abort_on_chain: HashSet::from([function]),
        finality_delay: Duration::from_millis(50),
        ..PaperChainConfig::default()
    });
    harness
        .backend
        .push_script(vec![
            tool_call("call-1", "register", json!({"name": "nexai"})),
            ReplayChunk::frame(json!({
                "type": "tool_result",
                "id": "call-1",
                "name": "register",
                "outcome": {"status": "Success", "gas": "7", "receipt": "ok"}
            })),
            end(),
        ])
        .await;

    let report = harness
        .controller
        .submit("register nexai", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(report.outcome, TurnOutcome::Completed);
    let states = harness.controller.wait_for_trackers().await;
    assert!(matches!(states.as_slice(), [TransactionState::Failed(_)]));

    let messages = harness.snapshot().await;
    assert_eq!(roles(&messages), vec![Role::User, Role::Tool]);
    let tool = &messages[1];
    assert_eq!(tool.parameter(keys::STATUS), Some(&Parameter::text("Failed")));
    assert!(matches!(
        tool.parameter(keys::TRANSACTION),
        Some(Parameter::Hash { .. })
    ));
    assert!(tool.parameter(keys::GAS).is_none());
    assert_eq!(tool.parameter("receipt"), Some(&Parameter::text("ok")));
}

#[tokio::test]
async fn error_frame_fails_the_turn_and_stops_processing() {
    let harness = Harness::new(PaperChainConfig::default());
    harness
        .backend
        .push_script(vec![
            text("Checking"),
            ReplayChunk::frame(json!({"type": "error", "message": "model overloaded"})),
            text(" never shown"),
            tool_call("call-1", "register", json!({"name": "nexai"})),
            end(),
        ])
        .await;

    let report = harness
        .controller
        .submit("register nexai", harness.signer())
        .await
        .unwrap()
        .wait()
        .await;
    assert_eq!(
        report.outcome,
        TurnOutcome::Failed {
            message: "model overloaded".to_string()
        }
    );
    assert_eq!(report.assistant_text, "Checking");
    assert!(report.tool_calls.is_empty());

    let messages = harness.snapshot().await;
    assert_eq!(roles(&messages), vec![Role::User, Role::Assistant, Role::Error]);
    assert_eq!(messages[2].content, "model overloaded");
    assert_eq!(harness.chain.submitted_count().await, 0);
    assert_eq!(harness.controller.active_turn(), None);
}
