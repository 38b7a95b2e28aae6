//! Run driver
//!
//! Wraps one agent run in lease, load, graph and save. Partial state is
//! saved on every outcome before a failure is handed back.

use super::graph::{AgentGraph, GraphOutcome};
use super::traits::{LlmClient, ToolExecutor};
use crate::conversation::{ConversationState, Turn};
use crate::db::Database;
use crate::llm::LlmErrorKind;
use crate::state_machine::RunOutcome;
use crate::store::{StateStore, StoreError, StoreResult};
use crate::tools::HouseholdScope;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a run did not produce an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    StepLimitExceeded,
    Cancelled,
    ProviderUnavailable,
    ProviderRateLimited,
    MalformedResponse,
    InvalidRequest,
    StoreUnavailable,
    WriteConflict,
    Internal,
}

impl From<LlmErrorKind> for FailureKind {
    fn from(kind: LlmErrorKind) -> Self {
        match kind {
            LlmErrorKind::Unavailable => FailureKind::ProviderUnavailable,
            LlmErrorKind::RateLimited => FailureKind::ProviderRateLimited,
            LlmErrorKind::MalformedResponse => FailureKind::MalformedResponse,
            LlmErrorKind::InvalidRequest => FailureKind::InvalidRequest,
        }
    }
}

impl From<&StoreError> for FailureKind {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::WriteConflict { .. } => FailureKind::WriteConflict,
            StoreError::Db(_) | StoreError::Serialization(_) => FailureKind::StoreUnavailable,
            StoreError::LeaseMismatch { .. } | StoreError::InvalidState(_) => FailureKind::Internal,
        }
    }
}

/// Structured run failure
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RunError {
    pub kind: FailureKind,
    pub message: String,
    /// Index of the last turn known to be persisted, if any
    pub last_committed_turn: Option<usize>,
    /// Turns this run produced
    pub partial_turns: Vec<Turn>,
}

impl RunError {
    fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            last_committed_turn: None,
            partial_turns: vec![],
        }
    }

    /// Whether running the same message again could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::ProviderUnavailable
                | FailureKind::ProviderRateLimited
                | FailureKind::MalformedResponse
                | FailureKind::StoreUnavailable
                | FailureKind::WriteConflict
        )
    }
}

/// A successful run
#[derive(Debug, Clone)]
pub struct RunReply {
    pub answer_text: String,
    /// Full history after the run
    pub turns: Vec<Turn>,
    /// Number of turns this run appended
    pub appended: usize,
    pub step_count: u32,
}

/// Who a session belongs to; set on first use, kept afterwards
#[derive(Debug, Clone, Default)]
pub struct SessionBinding {
    pub household_id: Option<String>,
    pub user_id: Option<String>,
}

pub struct RunDriver<S, L, T>
where
    S: StateStore,
    L: LlmClient,
    T: ToolExecutor,
{
    store: S,
    graph: AgentGraph<L, T>,
    household_db: Option<Database>,
}

impl<S, L, T> RunDriver<S, L, T>
where
    S: StateStore,
    L: LlmClient,
    T: ToolExecutor,
{
    pub fn new(store: S, graph: AgentGraph<L, T>) -> Self {
        Self {
            store,
            graph,
            household_db: None,
        }
    }

    /// Household data that tools of bound sessions act on
    pub fn with_household_db(mut self, db: Database) -> Self {
        self.household_db = Some(db);
        self
    }

    pub fn model_id(&self) -> &str {
        self.graph.model_id()
    }

    /// Current stored state of a session
    pub async fn session(&self, session_id: &str) -> StoreResult<ConversationState> {
        self.store.load(session_id).await
    }

    /// Run without a household binding or an external cancel signal
    #[allow(dead_code)] // Used in tests
    pub async fn run(&self, session_id: &str, user_message: &str) -> Result<RunReply, RunError> {
        self.run_with(
            session_id,
            user_message,
            SessionBinding::default(),
            &CancellationToken::new(),
        )
        .await
    }

    pub async fn run_with(
        &self,
        session_id: &str,
        user_message: &str,
        binding: SessionBinding,
        cancel: &CancellationToken,
    ) -> Result<RunReply, RunError> {
        if user_message.trim().is_empty() {
            return Err(RunError::new(
                FailureKind::InvalidInput,
                "message must not be empty",
            ));
        }

        let lease = self.store.acquire(session_id).await;
        let mut state = self.store.load(session_id).await.map_err(|e| {
            tracing::error!(session_id, error = %e, "Failed to load session");
            RunError::new(FailureKind::from(&e), e.to_string())
        })?;
        let committed = state.last_turn_index();

        prepare_session(&mut state, binding)
            .map_err(|e| RunError::new(FailureKind::Internal, e))?;
        let start = state.turns.len();

        let household = self.household_scope(&state);
        let graph_result = self
            .graph
            .run(&mut state, user_message, cancel, household)
            .await;

        if let Err(e) = &graph_result {
            tracing::error!(session_id, error = %e, "Agent graph stopped unexpectedly");
            if let Err(e) = state.repair_dangling_calls() {
                tracing::error!(session_id, error = %e, "Could not close dangling tool calls");
            }
        }
        if let Ok(GraphOutcome { steps, .. }) = &graph_result {
            state.last_step_count = *steps;
        }
        state.updated_at = Some(Utc::now());

        let saved = self.store.save(&lease, &state).await;
        drop(lease);

        let partial_turns = state.turns.get(start..).unwrap_or_default().to_vec();
        let appended = partial_turns.len();

        let version = match saved {
            Ok(version) => version,
            Err(e) => {
                tracing::error!(session_id, error = %e, "Failed to save session");
                return Err(RunError {
                    kind: FailureKind::from(&e),
                    message: e.to_string(),
                    last_committed_turn: committed,
                    partial_turns,
                });
            }
        };
        let last_committed_turn = state.last_turn_index();

        let fail = |kind: FailureKind, message: String| RunError {
            kind,
            message,
            last_committed_turn,
            partial_turns: partial_turns.clone(),
        };

        let outcome = match graph_result {
            Ok(outcome) => outcome,
            Err(e) => return Err(fail(FailureKind::Internal, e.to_string())),
        };

        tracing::info!(
            session_id,
            version,
            appended,
            steps = outcome.steps,
            "Run committed"
        );

        match outcome.outcome {
            RunOutcome::Answered => Ok(RunReply {
                answer_text: state.final_answer().unwrap_or_default().to_string(),
                turns: state.turns,
                appended,
                step_count: outcome.steps,
            }),
            RunOutcome::StepLimitExceeded { limit } => Err(fail(
                FailureKind::StepLimitExceeded,
                format!("no final answer within {limit} model steps"),
            )),
            RunOutcome::Cancelled => Err(fail(FailureKind::Cancelled, "run was cancelled".into())),
            RunOutcome::ProviderFailed { kind, message, .. } => Err(fail(kind.into(), message)),
        }
    }

    fn household_scope(&self, state: &ConversationState) -> Option<HouseholdScope> {
        let db = self.household_db.as_ref()?;
        let household_id = state.household_id.as_ref()?;
        Some(HouseholdScope {
            household_id: household_id.clone(),
            db: db.clone(),
        })
    }
}

/// Close turns a crashed run left open and apply the session binding
fn prepare_session(state: &mut ConversationState, binding: SessionBinding) -> Result<(), String> {
    let repaired = state.repair_dangling_calls().map_err(|e| e.to_string())?;
    if repaired > 0 {
        tracing::warn!(
            session_id = %state.session_id,
            repaired,
            "Closed tool calls left without results"
        );
    }

    if state.household_id.is_none() {
        state.household_id = binding.household_id;
    } else if let Some(requested) = binding.household_id {
        if state.household_id.as_deref() != Some(requested.as_str()) {
            tracing::warn!(
                session_id = %state.session_id,
                requested,
                "Ignoring household change for existing session"
            );
        }
    }
    if state.user_id.is_none() {
        state.user_id = binding.user_id;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, RetryPolicy};
    use crate::conversation::{ToolCall, ToolErrorKind, ToolOutcome};
    use crate::llm::{LlmError, ModelResponse};
    use crate::runtime::testing::{InMemoryStateStore, MockLlmClient, MockToolExecutor};
    use crate::runtime::traits::ToolRegistryExecutor;
    use crate::store::SqliteStateStore;
    use crate::tools::ToolRegistry;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    type TestDriver<T> = RunDriver<Arc<InMemoryStateStore>, Arc<MockLlmClient>, T>;

    fn config(max_steps: u32, attempts: u32) -> AgentConfig {
        AgentConfig {
            max_steps,
            retry: RetryPolicy::immediate(attempts),
            ..AgentConfig::default()
        }
    }

    fn driver<T: ToolExecutor>(
        responses: Vec<Result<ModelResponse, LlmError>>,
        tools: T,
        config: &AgentConfig,
    ) -> (TestDriver<T>, Arc<InMemoryStateStore>, Arc<MockLlmClient>) {
        let store = Arc::new(InMemoryStateStore::new());
        let llm = Arc::new(MockLlmClient::new(responses));
        let graph = AgentGraph::new(llm.clone(), tools, config);
        (RunDriver::new(store.clone(), graph), store, llm)
    }

    fn answer(text: &str) -> Result<ModelResponse, LlmError> {
        Ok(ModelResponse::FinalAnswer { text: text.into() })
    }

    fn call(id: &str, tool: &str, args: serde_json::Value) -> Result<ModelResponse, LlmError> {
        Ok(ModelResponse::ToolCalls {
            calls: vec![ToolCall::new(id, tool, args)],
            preamble: None,
        })
    }

    #[tokio::test]
    async fn direct_answer_appends_two_turns() {
        let (driver, store, _) = driver(
            vec![answer("Your pantry has rice and beans.")],
            MockToolExecutor::ok(""),
            &config(8, 3),
        );

        let reply = driver.run("s1", "What's in the pantry?").await.unwrap();

        assert_eq!(reply.answer_text, "Your pantry has rice and beans.");
        assert_eq!(reply.appended, 2);
        assert_eq!(reply.step_count, 1);
        let stored = store.load("s1").await.unwrap();
        assert_eq!(stored.turns.len(), 2);
        assert_eq!(stored.last_step_count, 1);
        assert!(stored.updated_at.is_some());
    }

    #[tokio::test]
    async fn add_milk_uses_the_pantry_tool() {
        let db = Database::open_in_memory().unwrap();
        let tools = ToolRegistryExecutor::new(Arc::new(ToolRegistry::household().unwrap()));
        let (driver, store, _) = driver(
            vec![
                call("c1", "add_pantry_item", json!({"name": "milk"})),
                answer("Added milk to your pantry list."),
            ],
            tools,
            &config(8, 3),
        );
        let driver = driver.with_household_db(db.clone());

        let reply = driver
            .run_with(
                "s1",
                "Add milk to the list",
                SessionBinding {
                    household_id: Some("h1".into()),
                    user_id: Some("u1".into()),
                },
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(reply.appended, 4);
        assert!(reply.answer_text.contains("milk"));
        match &reply.turns[2] {
            Turn::Tool { outcome, .. } => assert!(!outcome.is_error(), "{outcome:?}"),
            other => panic!("expected tool turn, got {other:?}"),
        }
        let pantry = db.list_pantry_items("h1").unwrap();
        assert_eq!(pantry.len(), 1);

        let stored = store.load("s1").await.unwrap();
        assert_eq!(stored.household_id.as_deref(), Some("h1"));
        assert_eq!(stored.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_the_model() {
        let tools = ToolRegistryExecutor::new(Arc::new(ToolRegistry::household().unwrap()));
        let (driver, _, llm) = driver(
            vec![
                call("c1", "order_pizza", json!({})),
                answer("I can't order pizza, but I can add it to the cart."),
            ],
            tools,
            &config(8, 3),
        );

        let reply = driver.run("s1", "Order a pizza").await.unwrap();

        match &reply.turns[2] {
            Turn::Tool { outcome, .. } => {
                assert!(matches!(
                    outcome,
                    ToolOutcome::Error {
                        kind: ToolErrorKind::UnknownTool,
                        ..
                    }
                ));
                assert!(outcome.render().starts_with("UnknownToolError"));
            }
            other => panic!("expected tool turn, got {other:?}"),
        }
        // The second request carried the error back to the model
        let second = &llm.recorded_requests()[1];
        assert_eq!(second.turns.len(), 3);
    }

    #[tokio::test]
    async fn rate_limit_exhaustion_keeps_only_the_user_turn() {
        let limited = || Err(LlmError::rate_limit("slow down"));
        // Two attempts in total; a third call would have succeeded
        let (driver, store, llm) = driver(
            vec![limited(), limited(), answer("too late")],
            MockToolExecutor::ok(""),
            &config(8, 2),
        );

        let err = driver.run("s1", "hello").await.unwrap_err();

        assert_eq!(err.kind, FailureKind::ProviderRateLimited);
        assert!(err.is_retryable());
        assert_eq!(err.last_committed_turn, Some(0));
        assert_eq!(err.partial_turns.len(), 1);
        assert_eq!(llm.request_count(), 2);
        let stored = store.load("s1").await.unwrap();
        assert_eq!(stored.turns.len(), 1);
        assert!(matches!(&stored.turns[0], Turn::User { content, .. } if content == "hello"));
    }

    #[tokio::test]
    async fn step_limit_persists_every_tool_result() {
        let responses = (0..5)
            .map(|i| call(&format!("c{i}"), "add_numbers", json!({"a": 1, "b": 1})))
            .collect();
        let (driver, store, _) = driver(responses, MockToolExecutor::ok("2"), &config(3, 1));

        let err = driver.run("s1", "keep adding").await.unwrap_err();

        assert_eq!(err.kind, FailureKind::StepLimitExceeded);
        assert_eq!(err.partial_turns.len(), 7);
        assert_eq!(err.last_committed_turn, Some(6));
        let stored = store.load("s1").await.unwrap();
        assert_eq!(stored.turns.len(), 7);
        assert_eq!(stored.check_pairing(), Ok(()));
        assert_eq!(stored.last_step_count, 3);
    }

    #[tokio::test]
    async fn second_run_sees_first_run_history() {
        let (driver, _, llm) = driver(
            vec![answer("hi"), answer("still here")],
            MockToolExecutor::ok(""),
            &config(8, 1),
        );

        driver.run("s1", "hello").await.unwrap();
        let reply = driver.run("s1", "you there?").await.unwrap();

        assert_eq!(reply.turns.len(), 4);
        assert_eq!(reply.appended, 2);
        assert_eq!(llm.recorded_requests()[1].turns.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_runs_on_one_session_serialize() {
        let (driver, store, _) = driver(
            vec![answer("one"), answer("two")],
            MockToolExecutor::ok(""),
            &config(8, 1),
        );
        let driver = Arc::new(driver);

        let a = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.run("s1", "first").await })
        };
        let b = {
            let driver = driver.clone();
            tokio::spawn(async move { driver.run("s1", "second").await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let stored = store.load("s1").await.unwrap();
        assert_eq!(stored.turns.len(), 4);
        assert_eq!(stored.check_pairing(), Ok(()));
        assert_eq!(store.version("s1"), 2);
    }

    #[tokio::test]
    async fn cancellation_during_a_tool_persists_partial_state() {
        let tools = MockToolExecutor::ok("never").with_delay(Duration::from_secs(10));
        let (driver, store, _) = driver(
            vec![call("c1", "add_numbers", json!({"a": 1, "b": 1}))],
            tools,
            &config(8, 1),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = driver
            .run_with("s1", "go", SessionBinding::default(), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err.kind, FailureKind::Cancelled);
        let stored = store.load("s1").await.unwrap();
        assert_eq!(stored.turns.len(), 3);
        assert_eq!(stored.check_pairing(), Ok(()));
        match &stored.turns[2] {
            Turn::Tool { outcome, .. } => assert!(matches!(
                outcome,
                ToolOutcome::Error {
                    kind: ToolErrorKind::Cancelled,
                    ..
                }
            )),
            other => panic!("expected tool turn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn store_failure_is_surfaced() {
        let (driver, store, _) = driver(vec![answer("hi")], MockToolExecutor::ok(""), &config(8, 1));
        store.fail_saves.store(true, Ordering::SeqCst);

        let err = driver.run("s1", "hello").await.unwrap_err();

        assert_eq!(err.kind, FailureKind::StoreUnavailable);
        assert_eq!(err.last_committed_turn, None);
        assert_eq!(err.partial_turns.len(), 2);
    }

    #[tokio::test]
    async fn dangling_calls_are_closed_on_load() {
        // Written by a process that crashed mid-tool, bypassing the save checks
        let db = Database::open_in_memory().unwrap();
        let mut crashed = ConversationState::new("s1");
        crashed.push(Turn::user("go"));
        crashed.push(Turn::assistant_tool_calls(
            "",
            vec![ToolCall::new("c1", "add_numbers", json!({"a": 1, "b": 1}))],
        ));
        db.put_session("s1", None, None, 0, &serde_json::to_string(&crashed).unwrap())
            .unwrap();

        let llm = Arc::new(MockLlmClient::new(vec![answer("ok")]));
        let graph = AgentGraph::new(llm, MockToolExecutor::ok(""), &config(8, 1));
        let driver = RunDriver::new(SqliteStateStore::new(db), graph);

        let reply = driver.run("s1", "again").await.unwrap();

        assert_eq!(reply.turns.len(), 5);
        assert_eq!(reply.appended, 2);
        match &reply.turns[2] {
            Turn::Tool { outcome, .. } => assert!(matches!(
                outcome,
                ToolOutcome::Error {
                    kind: ToolErrorKind::Interrupted,
                    ..
                }
            )),
            other => panic!("expected tool turn, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_touching_the_store() {
        let (driver, store, _) = driver(vec![], MockToolExecutor::ok(""), &config(8, 1));
        let err = driver.run("s1", "   ").await.unwrap_err();
        assert_eq!(err.kind, FailureKind::InvalidInput);
        assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    }
}
