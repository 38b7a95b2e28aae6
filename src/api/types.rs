//! API request and response types

use crate::conversation::Turn;
use crate::runtime::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to send a user message to a session
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
    /// Household the session acts on; only taken on first use
    #[serde(default)]
    pub household_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response for a completed run
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub response: String,
    pub session_id: String,
    pub turns_appended: usize,
    pub step_count: u32,
    /// Turns this run appended, oldest first
    pub turns: Vec<Turn>,
}

/// Stored session with its full history
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub household_id: Option<String>,
    pub user_id: Option<String>,
    pub version: u64,
    pub last_step_count: u32,
    pub updated_at: Option<DateTime<Utc>>,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Runs that were signalled
    pub cancelled: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
    pub active_sessions: usize,
}

/// Error body for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_committed_turn: Option<usize>,
    /// Turns the failed run produced before stopping
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub partial_turns: Vec<Turn>,
    /// Whether sending the same message again could succeed
    pub retryable: bool,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            kind: None,
            last_committed_turn: None,
            partial_turns: Vec::new(),
            retryable: false,
        }
    }
}
