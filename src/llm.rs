//! Chat-model providers
//!
//! `LlmService` is the raw provider seam. The agent loop never talks to it
//! directly; it goes through `runtime::LlmClient`, which adds the system
//! prompt and normalizes replies.

mod error;
mod openai;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    fn model_id(&self) -> &str;
}

/// Decorator that records every provider round trip
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

/// Tool names a reply asks for, in order, joined for a log field
fn requested_tools(response: &LlmResponse) -> String {
    response
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let started = Instant::now();
        let result = self.inner.complete(request).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(response) => {
                let tools = requested_tools(response);
                tracing::info!(
                    model = %self.model_id,
                    elapsed_ms,
                    history_messages = request.messages.len(),
                    offered_tools = request.tools.len(),
                    requested_tools = %tools,
                    reply = if tools.is_empty() { "answer" } else { "tool_calls" },
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Model replied"
                );
            }
            Err(e) if e.kind.is_retryable() => {
                tracing::warn!(
                    model = %self.model_id,
                    elapsed_ms,
                    kind = ?e.kind,
                    retry_after_secs = e.retry_after.map(|d| d.as_secs()),
                    error = %e.message,
                    "Model call failed, retry possible"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    elapsed_ms,
                    kind = ?e.kind,
                    error = %e.message,
                    "Model rejected the request"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
