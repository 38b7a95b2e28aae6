//! Mock implementations for testing
//!
//! These mocks let the graph and driver run without a provider or database.

use super::traits::{LlmClient, ToolExecutor};
use crate::conversation::{ConversationState, PromptHistory, ToolCall, ToolOutcome};
use crate::db::DbError;
use crate::llm::{LlmError, ModelResponse, ToolDefinition};
use crate::store::{
    decode, encode, SessionLease, SessionLocks, StateStore, StoreError, StoreResult,
};
use crate::tools::ToolContext;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Mock LLM client that returns queued responses
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<ModelResponse, LlmError>>>,
    delay: Option<Duration>,
    /// Record of every history sent to the model
    pub requests: Mutex<Vec<PromptHistory>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<Result<ModelResponse, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering each request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn recorded_requests(&self) -> Vec<PromptHistory> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        history: &PromptHistory,
        _tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        self.requests.lock().unwrap().push(history.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(LlmError::invalid_request("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock Tool Executor
// ============================================================================

/// Mock tool executor with a default outcome and per-tool overrides
pub struct MockToolExecutor {
    default: ToolOutcome,
    overrides: HashMap<String, ToolOutcome>,
    delay: Option<Duration>,
    /// Record of tool executions
    pub executions: Mutex<Vec<ToolCall>>,
}

impl MockToolExecutor {
    /// Every call succeeds with `output`
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            default: ToolOutcome::success(output),
            overrides: HashMap::new(),
            delay: None,
            executions: Mutex::new(Vec::new()),
        }
    }

    /// Calls to `name` return `outcome` instead of the default
    pub fn with_tool(mut self, name: impl Into<String>, outcome: ToolOutcome) -> Self {
        self.overrides.insert(name.into(), outcome);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn recorded_executions(&self) -> Vec<ToolCall> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, call: &ToolCall, ctx: ToolContext) -> ToolOutcome {
        self.executions.lock().unwrap().push(call.clone());
        if let Some(delay) = self.delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = ctx.cancel.cancelled() => {}
            }
        }
        self.overrides
            .get(&call.tool_name)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "add_numbers".to_string(),
            description: "Mock add_numbers".to_string(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }]
    }
}

// ============================================================================
// In-memory State Store
// ============================================================================

/// State store over a map of documents, with the same version and
/// pairing checks as the `SQLite` store
#[derive(Default)]
pub struct InMemoryStateStore {
    documents: Mutex<HashMap<String, (u64, String)>>,
    locks: SessionLocks,
    /// Make every save fail as if the store were down
    pub fail_saves: std::sync::atomic::AtomicBool,
    /// Number of saves that reached the document map
    pub saves: std::sync::atomic::AtomicUsize,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self, session_id: &str) -> u64 {
        self.documents
            .lock()
            .unwrap()
            .get(session_id)
            .map_or(0, |(version, _)| *version)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn acquire(&self, session_id: &str) -> SessionLease {
        self.locks.acquire(session_id).await
    }

    async fn load(&self, session_id: &str) -> StoreResult<ConversationState> {
        match self.documents.lock().unwrap().get(session_id) {
            Some((version, document)) => decode(document, *version),
            None => Ok(ConversationState::new(session_id)),
        }
    }

    async fn save(&self, lease: &SessionLease, state: &ConversationState) -> StoreResult<u64> {
        use std::sync::atomic::Ordering;

        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Db(DbError::Poisoned));
        }
        let document = encode(lease, state)?;
        let mut documents = self.documents.lock().unwrap();
        self.saves.fetch_add(1, Ordering::SeqCst);

        let stored = documents.get(&state.session_id).cloned();
        match stored {
            Some((version, stored)) if stored == document => Ok(version),
            Some((found, _)) if found != state.version => Err(StoreError::WriteConflict {
                session_id: state.session_id.clone(),
                expected: state.version,
                found,
            }),
            None if state.version != 0 => Err(StoreError::WriteConflict {
                session_id: state.session_id.clone(),
                expected: state.version,
                found: 0,
            }),
            Some(_) | None => {
                let version = state.version + 1;
                documents.insert(state.session_id.clone(), (version, document));
                Ok(version)
            }
        }
    }
}
