//! Effects produced by state transitions

use crate::conversation::{ToolCall, Turn};
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a turn to the working conversation
    AppendTurn { turn: Turn },

    /// Send the windowed conversation to the model
    RequestModel { step: u32, attempt: u32 },

    /// Run one tool call
    ExecuteTool { call: ToolCall },

    /// Wait, then deliver `RetryTimeout`
    ScheduleRetry { delay: Duration, attempt: u32 },
}

impl Effect {
    pub fn append(turn: Turn) -> Self {
        Effect::AppendTurn { turn }
    }

    pub fn execute_tool(call: ToolCall) -> Self {
        Effect::ExecuteTool { call }
    }
}
