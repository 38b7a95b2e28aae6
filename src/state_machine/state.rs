//! Agent graph states

use crate::config::RetryPolicy;
use crate::conversation::ToolCall;
use crate::llm::LlmErrorKind;
use serde::{Deserialize, Serialize};

/// Where a run stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentState {
    /// Waiting for the user's message
    #[default]
    AwaitingInput,

    /// Model request for `step` in flight, with retry tracking
    ModelThinking { step: u32, attempt: u32 },

    /// Executing the calls of one model response in order
    ExecutingTool {
        step: u32,
        current: ToolCall,
        remaining: Vec<ToolCall>,
    },

    /// Run finished; no further events are accepted
    Terminated { outcome: RunOutcome },
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Terminated { .. })
    }

    /// Model step the run is on, zero before the first
    pub fn step(&self) -> u32 {
        match self {
            AgentState::ModelThinking { step, .. } | AgentState::ExecutingTool { step, .. } => *step,
            AgentState::AwaitingInput | AgentState::Terminated { .. } => 0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentState::AwaitingInput => "awaiting_input",
            AgentState::ModelThinking { .. } => "model_thinking",
            AgentState::ExecutingTool { .. } => "executing_tool",
            AgentState::Terminated { .. } => "terminated",
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The model produced a final answer
    Answered,
    /// The step ceiling was reached with tool calls still coming
    StepLimitExceeded { limit: u32 },
    Cancelled,
    /// Provider failed on every allowed attempt, or refused the request
    ProviderFailed {
        kind: LlmErrorKind,
        message: String,
        attempts: u32,
    },
}

/// Per-run configuration the transition function reads
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub session_id: String,
    /// Maximum entries into `ModelThinking`
    pub max_steps: u32,
    pub retry: RetryPolicy,
}

impl AgentContext {
    pub fn new(session_id: impl Into<String>, max_steps: u32, retry: RetryPolicy) -> Self {
        Self {
            session_id: session_id.into(),
            max_steps,
            retry,
        }
    }
}
