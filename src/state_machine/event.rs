//! Events that drive the agent graph

use crate::conversation::ToolOutcome;
use crate::llm::{LlmErrorKind, ModelResponse};
use std::time::Duration;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        text: String,
    },
    Cancel,

    // Model events
    ModelResponded {
        response: ModelResponse,
    },
    ModelFailed {
        kind: LlmErrorKind,
        message: String,
        retry_after: Option<Duration>,
    },
    RetryTimeout {
        attempt: u32,
    },

    // Tool events
    ToolFinished {
        call_id: String,
        outcome: ToolOutcome,
    },
}
