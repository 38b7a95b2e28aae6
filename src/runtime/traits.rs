//! Trait abstractions for runtime I/O
//!
//! These traits let the agent graph run against mock implementations.

use crate::conversation::{PromptHistory, ToolCall, ToolOutcome};
use crate::llm::{LlmError, LlmRequest, LlmService, ModelResponse, ToolDefinition};
use crate::tools::{ToolContext, ToolRegistry};
use async_trait::async_trait;
use std::sync::Arc;

/// Client that turns a conversation window into the model's next move
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        history: &PromptHistory,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Executor for tool calls
///
/// Never fails: every problem comes back as a typed error outcome so the
/// model can read it.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall, ctx: ToolContext) -> ToolOutcome;

    /// Get tool definitions for LLM
    fn definitions(&self) -> Vec<ToolDefinition>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(
        &self,
        history: &PromptHistory,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        (**self).complete(history, tools).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, call: &ToolCall, ctx: ToolContext) -> ToolOutcome {
        (**self).execute(call, ctx).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use an `LlmService` as `LlmClient`
pub struct ServiceLlmClient {
    service: Arc<dyn LlmService>,
    system_prompt: String,
}

impl ServiceLlmClient {
    pub fn new(service: Arc<dyn LlmService>, system_prompt: impl Into<String>) -> Self {
        Self {
            service,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl LlmClient for ServiceLlmClient {
    async fn complete(
        &self,
        history: &PromptHistory,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        let request = LlmRequest::from_history(&self.system_prompt, history, tools);
        self.service.complete(&request).await?.into_model_response()
    }

    fn model_id(&self) -> &str {
        self.service.model_id()
    }
}

/// Adapter to use `ToolRegistry` as `ToolExecutor`
pub struct ToolRegistryExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolRegistryExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistryExecutor {
    async fn execute(&self, call: &ToolCall, ctx: ToolContext) -> ToolOutcome {
        match self
            .registry
            .execute(&call.tool_name, call.arguments.clone(), ctx)
            .await
        {
            Ok(output) => ToolOutcome::success(output),
            Err(e) => ToolOutcome::error(e.kind(), e.to_string()),
        }
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}
