//! Conversation history for a session
//!
//! Turns are append-only. Every tool call emitted by an assistant turn is
//! answered by exactly one tool-result turn, and those results directly
//! follow the call before any other turn.

mod turn;
mod window;

pub use turn::{ToolCall, ToolErrorKind, ToolOutcome, Turn, TurnMetadata};
pub use window::{ContextWindow, PromptHistory};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Persisted state of one session's conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub household_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub turns: Vec<Turn>,
    /// Step count of the most recent run
    #[serde(default)]
    pub last_step_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Store version this copy was loaded at (0 = never saved)
    #[serde(skip)]
    pub version: u64,
}

/// A break in the call/result pairing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairingError {
    #[error("turn {index}: tool call {call_id} has no result")]
    MissingResult { index: usize, call_id: String },
    #[error("turn {index}: result for {call_id} does not answer a pending call")]
    UnexpectedResult { index: usize, call_id: String },
    #[error("turn {index}: call id {call_id} is used more than once")]
    DuplicateCallId { index: usize, call_id: String },
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            household_id: None,
            user_id: None,
            turns: Vec::new(),
            last_step_count: 0,
            updated_at: None,
            version: 0,
        }
    }

    /// Append a turn and return its index
    pub fn push(&mut self, turn: Turn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    pub fn last_turn_index(&self) -> Option<usize> {
        self.turns.len().checked_sub(1)
    }

    /// Text of the most recent assistant turn, if the history ends on one
    pub fn final_answer(&self) -> Option<&str> {
        match self.turns.last() {
            Some(Turn::Assistant {
                content,
                tool_calls,
                ..
            }) if tool_calls.is_empty() => Some(content.as_str()),
            _ => None,
        }
    }

    /// Verify that every tool call is answered, treating unanswered calls
    /// at the very end as a violation.
    pub fn check_pairing(&self) -> Result<(), PairingError> {
        let pending = self.scan_pairing()?;
        match pending.into_iter().next() {
            Some(call_id) => Err(PairingError::MissingResult {
                index: self.turns.len(),
                call_id,
            }),
            None => Ok(()),
        }
    }

    /// Close out tool calls left without results at the tail of the history.
    ///
    /// A run that stopped between a call and its result leaves such calls
    /// behind; each receives a synthetic interrupted result so the history
    /// is valid to send to the model again. Returns the number of results
    /// appended.
    pub fn repair_dangling_calls(&mut self) -> Result<usize, PairingError> {
        let pending = self.scan_pairing()?;
        if pending.is_empty() {
            return Ok(0);
        }
        let calls: Vec<ToolCall> = self
            .turns
            .iter()
            .rev()
            .find_map(|t| match t {
                Turn::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                    Some(tool_calls.clone())
                }
                _ => None,
            })
            .unwrap_or_default();

        let mut repaired = 0;
        for call in calls.iter().filter(|c| pending.contains(&c.call_id)) {
            self.push(Turn::tool_result(
                call,
                ToolOutcome::error(
                    ToolErrorKind::Interrupted,
                    "the previous run ended before this tool returned",
                ),
            ));
            repaired += 1;
        }
        Ok(repaired)
    }

    /// Walk the history and return call ids still awaiting results at the end
    fn scan_pairing(&self) -> Result<Vec<String>, PairingError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = Vec::new();

        for (index, turn) in self.turns.iter().enumerate() {
            match turn {
                Turn::Tool { call_id, .. } => {
                    let Some(pos) = pending.iter().position(|p| p == call_id) else {
                        return Err(PairingError::UnexpectedResult {
                            index,
                            call_id: call_id.clone(),
                        });
                    };
                    pending.remove(pos);
                }
                other => {
                    if let Some(call_id) = pending.first() {
                        return Err(PairingError::MissingResult {
                            index,
                            call_id: (*call_id).to_string(),
                        });
                    }
                    for call in other.tool_calls() {
                        if !seen.insert(call.call_id.as_str()) {
                            return Err(PairingError::DuplicateCallId {
                                index,
                                call_id: call.call_id.clone(),
                            });
                        }
                        pending.push(call.call_id.as_str());
                    }
                }
            }
        }

        Ok(pending.into_iter().map(String::from).collect())
    }

    /// Call ids already used anywhere in the history
    pub fn call_ids(&self) -> HashSet<&str> {
        self.turns
            .iter()
            .flat_map(|t| t.tool_calls().iter().map(|c| c.call_id.as_str()))
            .collect()
    }
}
