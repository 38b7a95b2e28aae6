//! LLM error types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// LLM error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    /// Network failure or timeout
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unavailable, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unavailable, message)
    }

    /// Rejected credentials count as the provider being unavailable
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unavailable, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimited, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::MalformedResponse, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    /// Network, auth, or 5xx failures
    Unavailable,
    /// 429 from the provider
    RateLimited,
    /// Response could not be parsed into an answer or tool calls
    MalformedResponse,
    /// 400 - the request itself is wrong, retrying cannot help
    InvalidRequest,
}

impl LlmErrorKind {
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::InvalidRequest)
    }

    /// Whether retries wait with exponential backoff
    pub fn uses_backoff(self) -> bool {
        matches!(self, Self::Unavailable | Self::RateLimited)
    }
}
