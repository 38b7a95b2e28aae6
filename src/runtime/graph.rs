//! Agent graph executor
//!
//! Drives the pure transition function for one run, interpreting the
//! effects it emits against the model, the tools and the working
//! conversation.

use super::traits::{LlmClient, ToolExecutor};
use crate::config::{AgentConfig, RetryPolicy};
use crate::conversation::{
    ContextWindow, ConversationState, ToolCall, ToolErrorKind, ToolOutcome, Turn,
};
use crate::llm::{fresh_call_id, LlmError, ModelResponse, ToolDefinition};
use crate::state_machine::{
    transition, AgentContext, AgentState, Effect, Event, RunOutcome, TransitionError,
};
use crate::tools::{HouseholdScope, ToolContext};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a run through the graph ended
#[derive(Debug, Clone, PartialEq)]
pub struct GraphOutcome {
    pub outcome: RunOutcome,
    /// Entries into `ModelThinking`
    pub steps: u32,
}

/// The agent graph, generic over the model and tool implementations
pub struct AgentGraph<L, T>
where
    L: LlmClient,
    T: ToolExecutor,
{
    llm: L,
    tools: T,
    window: ContextWindow,
    llm_timeout: Duration,
    tool_timeout: Duration,
    max_steps: u32,
    retry: RetryPolicy,
}

/// Mutable state for a single run
struct RunScope<'a> {
    conversation: &'a mut ConversationState,
    cancel: &'a CancellationToken,
    household: Option<HouseholdScope>,
    definitions: Vec<ToolDefinition>,
    step: u32,
}

impl<L, T> AgentGraph<L, T>
where
    L: LlmClient,
    T: ToolExecutor,
{
    pub fn new(llm: L, tools: T, config: &AgentConfig) -> Self {
        Self {
            llm,
            tools,
            window: ContextWindow::new(config.context_tokens),
            llm_timeout: config.llm_timeout,
            tool_timeout: config.tool_timeout,
            max_steps: config.max_steps,
            retry: config.retry.clone(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.llm.model_id()
    }

    /// Run one user message through the graph until it terminates.
    ///
    /// Turns are appended to `conversation` as they happen, so on any
    /// outcome it holds every turn the run produced.
    pub async fn run(
        &self,
        conversation: &mut ConversationState,
        user_message: &str,
        cancel: &CancellationToken,
        household: Option<HouseholdScope>,
    ) -> Result<GraphOutcome, TransitionError> {
        let context = AgentContext::new(
            conversation.session_id.clone(),
            self.max_steps,
            self.retry.clone(),
        );
        let mut scope = RunScope {
            conversation,
            cancel,
            household,
            definitions: self.tools.definitions(),
            step: 0,
        };

        tracing::info!(session_id = %context.session_id, "Starting agent run");

        let mut state = AgentState::AwaitingInput;
        let mut events = vec![Event::UserMessage {
            text: user_message.to_string(),
        }];

        while let Some(event) = events.pop() {
            let result = transition(&state, &context, event)?;

            if result.new_state.name() != state.name() {
                tracing::debug!(
                    session_id = %context.session_id,
                    from = state.name(),
                    to = result.new_state.name(),
                    step = result.new_state.step(),
                    "Agent state transition"
                );
            }
            state = result.new_state;

            for effect in result.effects {
                if let Some(generated) = self.execute_effect(effect, &mut scope).await {
                    events.push(generated);
                }
            }
        }

        match state {
            AgentState::Terminated { outcome } => {
                tracing::info!(
                    session_id = %context.session_id,
                    steps = scope.step,
                    outcome = ?outcome,
                    "Agent run finished"
                );
                Ok(GraphOutcome {
                    outcome,
                    steps: scope.step,
                })
            }
            other => Err(TransitionError::InvalidTransition(format!(
                "run stopped without terminating, in state {}",
                other.name()
            ))),
        }
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&self, effect: Effect, scope: &mut RunScope<'_>) -> Option<Event> {
        match effect {
            Effect::AppendTurn { mut turn } => {
                let metadata = turn.metadata_mut();
                metadata.created_at = Some(Utc::now());
                metadata.step = (scope.step > 0).then_some(scope.step);
                scope.conversation.push(turn);
                None
            }

            Effect::RequestModel { step, attempt } => {
                if scope.cancel.is_cancelled() {
                    return Some(Event::Cancel);
                }
                scope.step = step;
                Some(self.request_model(scope, attempt).await)
            }

            Effect::ExecuteTool { call } => {
                if scope.cancel.is_cancelled() {
                    return Some(Event::Cancel);
                }
                self.execute_tool(call, scope).await
            }

            Effect::ScheduleRetry { delay, attempt } => {
                let delay = with_jitter(delay);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    "Retrying model request after failure"
                );
                tokio::select! {
                    biased;
                    () = scope.cancel.cancelled() => Some(Event::Cancel),
                    () = tokio::time::sleep(delay) => Some(Event::RetryTimeout { attempt }),
                }
            }
        }
    }

    async fn request_model(&self, scope: &mut RunScope<'_>, attempt: u32) -> Event {
        let history = self.window.select(&scope.conversation.turns);
        if history.omitted > 0 {
            tracing::debug!(
                omitted = history.omitted,
                kept = history.turns.len(),
                "Conversation truncated to fit context window"
            );
        }

        let request = self.llm.complete(&history, &scope.definitions);
        let result = tokio::select! {
            biased;
            () = scope.cancel.cancelled() => return Event::Cancel,
            timed = tokio::time::timeout(self.llm_timeout, request) => match timed {
                Ok(result) => result,
                Err(_) => Err(LlmError::network(format!(
                    "model did not respond within {:?}",
                    self.llm_timeout
                ))),
            },
        };

        match result {
            Ok(response) => Event::ModelResponded {
                response: reassign_reused_ids(response, scope.conversation),
            },
            Err(e) => {
                tracing::warn!(
                    attempt,
                    kind = ?e.kind,
                    error = %e.message,
                    "Model request failed"
                );
                Event::ModelFailed {
                    kind: e.kind,
                    message: e.message,
                    retry_after: e.retry_after,
                }
            }
        }
    }

    async fn execute_tool(&self, call: ToolCall, scope: &RunScope<'_>) -> Option<Event> {
        let tool_cancel = scope.cancel.child_token();
        let ctx = ToolContext::new(
            tool_cancel.clone(),
            scope.conversation.session_id.clone(),
            scope.household.clone(),
        );

        tracing::debug!(tool = %call.tool_name, call_id = %call.call_id, "Executing tool");
        let started = std::time::Instant::now();

        let outcome = tokio::select! {
            biased;
            () = scope.cancel.cancelled() => return Some(Event::Cancel),
            timed = tokio::time::timeout(self.tool_timeout, self.tools.execute(&call, ctx)) => {
                timed.unwrap_or_else(|_| {
                    tool_cancel.cancel();
                    ToolOutcome::error(
                        ToolErrorKind::TimedOut,
                        format!("{} did not finish within {:?}", call.tool_name, self.tool_timeout),
                    )
                })
            }
        };

        if outcome.is_error() {
            tracing::warn!(
                tool = %call.tool_name,
                duration_ms = started.elapsed().as_millis(),
                result = %outcome.render(),
                "Tool call failed"
            );
        } else {
            tracing::info!(
                tool = %call.tool_name,
                duration_ms = started.elapsed().as_millis(),
                "Tool call completed"
            );
        }

        Some(Event::ToolFinished {
            call_id: call.call_id,
            outcome,
        })
    }
}

/// Give fresh ids to calls whose ids already appear in the conversation
fn reassign_reused_ids(response: ModelResponse, conversation: &ConversationState) -> ModelResponse {
    match response {
        ModelResponse::ToolCalls { calls, preamble } => {
            let mut seen: HashSet<String> = conversation
                .call_ids()
                .into_iter()
                .map(str::to_string)
                .collect();
            let calls = calls
                .into_iter()
                .map(|mut call| {
                    if !seen.insert(call.call_id.clone()) {
                        call.call_id = fresh_call_id();
                        seen.insert(call.call_id.clone());
                    }
                    call
                })
                .collect();
            ModelResponse::ToolCalls { calls, preamble }
        }
        answer @ ModelResponse::FinalAnswer { .. } => answer,
    }
}

/// Add up to 10% random jitter to a non-zero delay
fn with_jitter(delay: Duration) -> Duration {
    let base = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if base == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=base / 10);
    Duration::from_millis(base.saturating_add(jitter))
}
