//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! new state and effects. All I/O happens in the runtime that interprets
//! the effects.

use super::{AgentContext, AgentState, Effect, Event, RunOutcome};
use crate::conversation::{ToolCall, ToolErrorKind, ToolOutcome, Turn};
use crate::llm::ModelResponse;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: AgentState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: AgentState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Agent is busy, cannot accept message")]
    AgentBusy,
    #[error("Run has already terminated")]
    AlreadyTerminated,
    #[error("Model returned an empty tool call list")]
    EmptyToolCalls,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

pub fn transition(
    state: &AgentState,
    context: &AgentContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // User input
        // ============================================================
        (AgentState::AwaitingInput, Event::UserMessage { text }) => {
            Ok(enter_model_thinking(1, context).with_prior(Effect::append(Turn::user(text))))
        }

        (AgentState::Terminated { .. }, _) => Err(TransitionError::AlreadyTerminated),

        (_, Event::UserMessage { .. }) => Err(TransitionError::AgentBusy),

        // ============================================================
        // Model responses
        // ============================================================
        (AgentState::ModelThinking { .. }, Event::ModelResponded { response }) => match response {
            ModelResponse::FinalAnswer { text } => Ok(TransitionResult::new(
                AgentState::Terminated {
                    outcome: RunOutcome::Answered,
                },
            )
            .with_effect(Effect::append(Turn::assistant(text)))),
            ModelResponse::ToolCalls { calls, preamble } => {
                let mut queue = calls.clone().into_iter();
                let Some(current) = queue.next() else {
                    return Err(TransitionError::EmptyToolCalls);
                };
                Ok(TransitionResult::new(AgentState::ExecutingTool {
                    step: state.step(),
                    current: current.clone(),
                    remaining: queue.collect(),
                })
                .with_effect(Effect::append(Turn::assistant_tool_calls(
                    preamble.unwrap_or_default(),
                    calls,
                )))
                .with_effect(Effect::execute_tool(current)))
            }
        },

        // ============================================================
        // Model errors and retry
        // ============================================================
        (AgentState::ModelThinking { step, attempt }, Event::ModelFailed { kind, retry_after, .. })
            if kind.is_retryable() && *attempt < context.retry.max_attempts =>
        {
            let next = attempt + 1;
            let delay = context.retry.delay_for(kind, *attempt, retry_after);
            Ok(TransitionResult::new(AgentState::ModelThinking {
                step: *step,
                attempt: next,
            })
            .with_effect(Effect::ScheduleRetry {
                delay,
                attempt: next,
            }))
        }

        (AgentState::ModelThinking { attempt, .. }, Event::ModelFailed { kind, message, .. }) => {
            let message = if kind.is_retryable() {
                format!("Failed after {attempt} attempts: {message}")
            } else {
                message
            };
            Ok(TransitionResult::new(AgentState::Terminated {
                outcome: RunOutcome::ProviderFailed {
                    kind,
                    message,
                    attempts: *attempt,
                },
            }))
        }

        (AgentState::ModelThinking { step, attempt }, Event::RetryTimeout { attempt: fired })
            if *attempt == fired =>
        {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::RequestModel {
                step: *step,
                attempt: *attempt,
            }))
        }

        // ============================================================
        // Tool execution
        // ============================================================
        (
            AgentState::ExecutingTool {
                step,
                current,
                remaining,
            },
            Event::ToolFinished { call_id, outcome },
        ) if call_id == current.call_id => {
            let result = Effect::append(Turn::tool_result(current, outcome));
            match remaining.split_first() {
                Some((next, rest)) => Ok(TransitionResult::new(AgentState::ExecutingTool {
                    step: *step,
                    current: next.clone(),
                    remaining: rest.to_vec(),
                })
                .with_effect(result)
                .with_effect(Effect::execute_tool(next.clone()))),
                None => Ok(enter_model_thinking(step + 1, context).with_prior(result)),
            }
        }

        (AgentState::ExecutingTool { current, .. }, Event::ToolFinished { call_id, .. }) => {
            Err(TransitionError::InvalidTransition(format!(
                "result for {call_id} while waiting on {}",
                current.call_id
            )))
        }

        // ============================================================
        // Cancellation
        // ============================================================
        (
            AgentState::ExecutingTool {
                current, remaining, ..
            },
            Event::Cancel,
        ) => {
            let cancelled = std::iter::once(current)
                .chain(remaining.iter())
                .map(|call| Effect::append(cancelled_result(call)));
            Ok(TransitionResult::new(AgentState::Terminated {
                outcome: RunOutcome::Cancelled,
            })
            .with_effects(cancelled))
        }

        (AgentState::AwaitingInput | AgentState::ModelThinking { .. }, Event::Cancel) => {
            Ok(TransitionResult::new(AgentState::Terminated {
                outcome: RunOutcome::Cancelled,
            }))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in state {}",
            state.name()
        ))),
    }
}

/// Enter `ModelThinking` for `step`, or stop if the ceiling is reached
fn enter_model_thinking(step: u32, context: &AgentContext) -> TransitionResult {
    if step > context.max_steps {
        return TransitionResult::new(AgentState::Terminated {
            outcome: RunOutcome::StepLimitExceeded {
                limit: context.max_steps,
            },
        });
    }
    TransitionResult::new(AgentState::ModelThinking { step, attempt: 1 })
        .with_effect(Effect::RequestModel { step, attempt: 1 })
}

fn cancelled_result(call: &ToolCall) -> Turn {
    Turn::tool_result(
        call,
        ToolOutcome::error(ToolErrorKind::Cancelled, "the run was cancelled before this tool ran"),
    )
}

impl TransitionResult {
    /// Put `effect` ahead of the effects already queued
    fn with_prior(mut self, effect: Effect) -> Self {
        self.effects.insert(0, effect);
        self
    }
}
