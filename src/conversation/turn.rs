//! Turn and tool-call types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Classification of a failed tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidArguments,
    ExecutionFailed,
    TimedOut,
    Cancelled,
    /// Synthesized for a call whose run ended before a result was recorded
    Interrupted,
}

impl ToolErrorKind {
    /// Name shown to the model in the tool-result turn
    pub fn label(self) -> &'static str {
        match self {
            Self::UnknownTool => "UnknownToolError",
            Self::InvalidArguments => "InvalidArgumentsError",
            Self::ExecutionFailed => "ToolExecutionError",
            Self::TimedOut => "ToolTimeoutError",
            Self::Cancelled => "ToolCancelledError",
            Self::Interrupted => "ToolInterruptedError",
        }
    }
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a tool call produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { output: String },
    Error { kind: ToolErrorKind, message: String },
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        ToolOutcome::Success {
            output: output.into(),
        }
    }

    pub fn error(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        ToolOutcome::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error { .. })
    }

    /// Text the model sees for this result
    pub fn render(&self) -> String {
        match self {
            ToolOutcome::Success { output } => output.clone(),
            ToolOutcome::Error { kind, message } => format!("{kind}: {message}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Model step during which the turn was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
}

/// One entry in a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        content: String,
        #[serde(default)]
        metadata: TurnMetadata,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
        #[serde(default)]
        metadata: TurnMetadata,
    },
    Tool {
        call_id: String,
        tool_name: String,
        arguments: Value,
        outcome: ToolOutcome,
        #[serde(default)]
        metadata: TurnMetadata,
    },
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn::User {
            content: content.into(),
            metadata: TurnMetadata::default(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Turn::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
            metadata: TurnMetadata::default(),
        }
    }

    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Turn::Assistant {
            content: content.into(),
            tool_calls,
            metadata: TurnMetadata::default(),
        }
    }

    pub fn tool_result(call: &ToolCall, outcome: ToolOutcome) -> Self {
        Turn::Tool {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            arguments: call.arguments.clone(),
            outcome,
            metadata: TurnMetadata::default(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Turn::User { .. } => "user",
            Turn::Assistant { .. } => "assistant",
            Turn::Tool { .. } => "tool",
        }
    }

    pub fn metadata(&self) -> &TurnMetadata {
        match self {
            Turn::User { metadata, .. }
            | Turn::Assistant { metadata, .. }
            | Turn::Tool { metadata, .. } => metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut TurnMetadata {
        match self {
            Turn::User { metadata, .. }
            | Turn::Assistant { metadata, .. }
            | Turn::Tool { metadata, .. } => metadata,
        }
    }

    /// Tool calls carried by an assistant turn
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Turn::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Rough size of the turn in model tokens (about four characters each)
    pub fn estimated_tokens(&self) -> usize {
        const PER_TURN_OVERHEAD: usize = 4;
        let chars = match self {
            Turn::User { content, .. } => content.len(),
            Turn::Assistant {
                content,
                tool_calls,
                ..
            } => {
                content.len()
                    + tool_calls
                        .iter()
                        .map(|c| c.tool_name.len() + c.call_id.len() + c.arguments.to_string().len())
                        .sum::<usize>()
            }
            Turn::Tool {
                call_id, outcome, ..
            } => call_id.len() + outcome.render().len(),
        };
        chars.div_ceil(4) + PER_TURN_OVERHEAD
    }
}
