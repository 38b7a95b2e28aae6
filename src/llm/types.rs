//! Common types for LLM interactions

use super::LlmError;
use crate::conversation::{PromptHistory, ToolCall, Turn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// LLM request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    /// Build a request from the windowed history.
    ///
    /// Consecutive tool-result turns are folded into one message so each
    /// assistant tool-call message is followed by exactly one results message.
    pub fn from_history(system: &str, history: &PromptHistory, tools: &[ToolDefinition]) -> Self {
        let mut system = system.to_string();
        if history.omitted > 0 {
            system.push_str(&format!(
                "\n\n({} earlier turns of this conversation were omitted to fit the context window.)",
                history.omitted
            ));
        }

        let mut messages: Vec<LlmMessage> = Vec::new();
        for turn in &history.turns {
            match turn {
                Turn::User { content, .. } => messages.push(LlmMessage {
                    role: MessageRole::User,
                    content: vec![ContentBlock::text(content)],
                }),
                Turn::Assistant {
                    content,
                    tool_calls,
                    ..
                } => {
                    let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                    if !content.is_empty() {
                        blocks.push(ContentBlock::text(content));
                    }
                    blocks.extend(tool_calls.iter().map(|c| {
                        ContentBlock::tool_use(&c.call_id, &c.tool_name, c.arguments.clone())
                    }));
                    messages.push(LlmMessage {
                        role: MessageRole::Assistant,
                        content: blocks,
                    });
                }
                Turn::Tool {
                    call_id, outcome, ..
                } => {
                    let block =
                        ContentBlock::tool_result(call_id, outcome.render(), outcome.is_error());
                    match messages.last_mut() {
                        Some(last) if last.is_tool_results() => last.content.push(block),
                        _ => messages.push(LlmMessage {
                            role: MessageRole::User,
                            content: vec![block],
                        }),
                    }
                }
            }
        }

        Self {
            system,
            messages,
            tools: tools.to_vec(),
            max_tokens: None,
        }
    }
}

/// Message in conversation
#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl LlmMessage {
    fn is_tool_results(&self) -> bool {
        self.role == MessageRole::User
            && !self.content.is_empty()
            && self
                .content
                .iter()
                .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// Content block in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// Tool definition
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Raw provider response
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

impl LlmResponse {
    /// Get text content from the response
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Reduce the response to a final answer or a list of tool calls.
    ///
    /// Text that accompanies tool calls is kept as the preamble of the
    /// assistant tool-call turn. Missing or repeated call ids are replaced
    /// with fresh ones.
    pub fn into_model_response(self) -> Result<ModelResponse, LlmError> {
        let text = self.text();
        let mut seen = HashSet::new();
        let calls: Vec<ToolCall> = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some((id, name, input)),
                _ => None,
            })
            .map(|(id, name, input)| {
                let id = if id.is_empty() || !seen.insert(id.clone()) {
                    fresh_call_id()
                } else {
                    id
                };
                ToolCall::new(id, name, input)
            })
            .collect();

        if let Some(bad) = calls.iter().find(|c| c.tool_name.is_empty()) {
            return Err(LlmError::malformed(format!(
                "tool call {} has no tool name",
                bad.call_id
            )));
        }

        if !calls.is_empty() {
            let preamble = (!text.trim().is_empty()).then_some(text);
            return Ok(ModelResponse::ToolCalls { calls, preamble });
        }

        if text.trim().is_empty() {
            return Err(LlmError::malformed(
                "response contained neither text nor tool calls",
            ));
        }
        Ok(ModelResponse::FinalAnswer { text })
    }
}

pub fn fresh_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// Normalized model reply
#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    FinalAnswer {
        text: String,
    },
    ToolCalls {
        calls: Vec<ToolCall>,
        /// Text the model produced alongside the calls
        preamble: Option<String>,
    },
}

/// Usage statistics
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
