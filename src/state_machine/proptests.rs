//! Property-based tests for the state machine
//!
//! A scripted model and always-successful tools drive the pure transition
//! function to termination, folding effects into a conversation the same
//! way the runtime does.

use super::transition::*;
use super::*;
use crate::config::RetryPolicy;
use crate::conversation::{ConversationState, ToolCall, ToolOutcome, Turn};
use crate::llm::{LlmErrorKind, ModelResponse};
use proptest::prelude::*;
use serde_json::json;
use std::collections::VecDeque;

// ============================================================================
// Scripted model
// ============================================================================

#[derive(Debug, Clone)]
enum Move {
    Answer,
    Calls(usize),
    Fail(LlmErrorKind),
}

fn arb_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Unavailable),
        Just(LlmErrorKind::RateLimited),
        Just(LlmErrorKind::MalformedResponse),
        Just(LlmErrorKind::InvalidRequest),
    ]
}

fn arb_move() -> impl Strategy<Value = Move> {
    prop_oneof![
        1 => Just(Move::Answer),
        3 => (1usize..4).prop_map(Move::Calls),
        1 => arb_error_kind().prop_map(Move::Fail),
    ]
}

struct Simulation {
    state: AgentState,
    conversation: ConversationState,
    steps_entered: u32,
    next_call: usize,
}

impl Simulation {
    fn run(context: &AgentContext, script: Vec<Move>) -> Self {
        let mut sim = Simulation {
            state: AgentState::AwaitingInput,
            conversation: ConversationState::new(context.session_id.clone()),
            steps_entered: 0,
            next_call: 0,
        };
        let mut script: VecDeque<Move> = script.into();
        let mut events = vec![Event::UserMessage {
            text: "what's in the pantry?".into(),
        }];

        while let Some(event) = events.pop() {
            let result = transition(&sim.state, context, event).expect("scripted run is valid");
            sim.state = result.new_state;
            for effect in result.effects {
                if let Some(event) = sim.apply(effect, &mut script) {
                    events.insert(0, event);
                }
            }
            assert!(events.len() <= 1, "at most one event outstanding");
        }
        sim
    }

    fn apply(&mut self, effect: Effect, script: &mut VecDeque<Move>) -> Option<Event> {
        match effect {
            Effect::AppendTurn { turn } => {
                self.conversation.push(turn);
                None
            }
            Effect::RequestModel { attempt, .. } => {
                if attempt == 1 {
                    self.steps_entered += 1;
                }
                Some(match script.pop_front().unwrap_or(Move::Answer) {
                    Move::Answer => Event::ModelResponded {
                        response: ModelResponse::FinalAnswer {
                            text: "done".into(),
                        },
                    },
                    Move::Calls(n) => {
                        let calls = (0..n)
                            .map(|_| {
                                self.next_call += 1;
                                ToolCall::new(
                                    format!("call_{}", self.next_call),
                                    "add_numbers",
                                    json!({"a": 1, "b": 1}),
                                )
                            })
                            .collect();
                        Event::ModelResponded {
                            response: ModelResponse::ToolCalls {
                                calls,
                                preamble: None,
                            },
                        }
                    }
                    Move::Fail(kind) => Event::ModelFailed {
                        kind,
                        message: "scripted failure".into(),
                        retry_after: None,
                    },
                })
            }
            Effect::ExecuteTool { call } => Some(Event::ToolFinished {
                call_id: call.call_id,
                outcome: ToolOutcome::success("2"),
            }),
            Effect::ScheduleRetry { attempt, .. } => Some(Event::RetryTimeout { attempt }),
        }
    }
}

proptest! {
    #[test]
    fn every_run_terminates_within_budget(
        max_steps in 0u32..6,
        attempts in 1u32..4,
        script in proptest::collection::vec(arb_move(), 0..20),
    ) {
        let context = AgentContext::new("s", max_steps, RetryPolicy::immediate(attempts));
        let sim = Simulation::run(&context, script);

        prop_assert!(sim.state.is_terminal());
        prop_assert!(sim.steps_entered <= max_steps);
    }

    #[test]
    fn every_call_gets_its_result(
        max_steps in 1u32..6,
        script in proptest::collection::vec(arb_move(), 0..20),
    ) {
        let context = AgentContext::new("s", max_steps, RetryPolicy::immediate(3));
        let sim = Simulation::run(&context, script);

        prop_assert_eq!(sim.conversation.check_pairing(), Ok(()));
        let starts_with_user = matches!(sim.conversation.turns.first(), Some(Turn::User { .. }));
        prop_assert!(starts_with_user);
    }

    #[test]
    fn answered_runs_end_with_the_answer(
        script in proptest::collection::vec(arb_move(), 0..10),
    ) {
        let context = AgentContext::new("s", 20, RetryPolicy::immediate(3));
        let sim = Simulation::run(&context, script);

        if matches!(sim.state, AgentState::Terminated { outcome: RunOutcome::Answered }) {
            prop_assert_eq!(sim.conversation.final_answer(), Some("done"));
        } else {
            prop_assert!(sim.conversation.final_answer().is_none());
        }
    }

    #[test]
    fn terminated_rejects_everything(text in "[a-z ]{1,20}") {
        let context = AgentContext::new("s", 3, RetryPolicy::immediate(3));
        let state = AgentState::Terminated { outcome: RunOutcome::Cancelled };
        let user_message_rejected = transition(&state, &context, Event::UserMessage { text }).is_err();
        prop_assert!(user_message_rejected);
        prop_assert!(transition(&state, &context, Event::Cancel).is_err());
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn direct_answer_takes_one_step() {
    let context = AgentContext::new("s", 8, RetryPolicy::immediate(3));
    let sim = Simulation::run(&context, vec![Move::Answer]);
    assert_eq!(sim.steps_entered, 1);
    assert_eq!(sim.conversation.turns.len(), 2);
}

#[test]
fn single_tool_round_takes_two_steps() {
    let context = AgentContext::new("s", 8, RetryPolicy::immediate(3));
    let sim = Simulation::run(&context, vec![Move::Calls(1), Move::Answer]);
    assert_eq!(sim.steps_entered, 2);
    let roles: Vec<_> = sim.conversation.turns.iter().map(Turn::role).collect();
    assert_eq!(roles, ["user", "assistant", "tool", "assistant"]);
}

#[test]
fn endless_tool_calls_hit_the_ceiling() {
    let context = AgentContext::new("s", 3, RetryPolicy::immediate(3));
    let sim = Simulation::run(&context, vec![Move::Calls(1); 10]);
    assert_eq!(
        sim.state,
        AgentState::Terminated {
            outcome: RunOutcome::StepLimitExceeded { limit: 3 }
        }
    );
    assert_eq!(sim.steps_entered, 3);
    // user + 3 x (assistant, tool)
    assert_eq!(sim.conversation.turns.len(), 7);
}

#[test]
fn transient_failure_then_success() {
    let context = AgentContext::new("s", 8, RetryPolicy::immediate(2));
    let sim = Simulation::run(
        &context,
        vec![Move::Fail(LlmErrorKind::Unavailable), Move::Answer],
    );
    assert_eq!(
        sim.state,
        AgentState::Terminated {
            outcome: RunOutcome::Answered
        }
    );
    assert_eq!(sim.steps_entered, 1);
}

#[test]
fn retries_exhausted() {
    let context = AgentContext::new("s", 8, RetryPolicy::immediate(2));
    let sim = Simulation::run(
        &context,
        vec![
            Move::Fail(LlmErrorKind::RateLimited),
            Move::Fail(LlmErrorKind::RateLimited),
            Move::Answer,
        ],
    );
    assert!(matches!(
        sim.state,
        AgentState::Terminated {
            outcome: RunOutcome::ProviderFailed {
                kind: LlmErrorKind::RateLimited,
                attempts: 2,
                ..
            }
        }
    ));
    assert_eq!(sim.conversation.turns.len(), 1);
}
