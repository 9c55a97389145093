//! Pure state transition function

use super::{CycleOutcome, CycleState, Effect, Event, Pass};
use crate::runtime::{StreamError, StreamEvent};
use crate::transcript::{AssistantTurn, Turn};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: CycleState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: CycleState) -> Self {
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
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A response is already in progress for this session")]
    Busy,
    #[error("Cycle already finished")]
    CycleFinished,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs; every side
/// effect is described by the returned `Effect`s.
pub fn transition(state: &CycleState, event: Event) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // User input
        // ============================================================
        (CycleState::AwaitingInput, Event::UserMessage { text }) => {
            Ok(TransitionResult::new(CycleState::GeneratingInitial)
                .with_effect(Effect::append_user(text))
                .with_effect(Effect::RequestGeneration {
                    pass: Pass::Initial,
                }))
        }

        (s, Event::UserMessage { .. }) if s.is_busy() => Err(TransitionError::Busy),

        // ============================================================
        // Streaming
        // ============================================================
        (
            s @ (CycleState::GeneratingInitial | CycleState::GeneratingFinal),
            Event::TextDelta { text },
        ) => {
            let result = TransitionResult::new(s.clone());
            if text.is_empty() {
                Ok(result)
            } else {
                Ok(result.with_effect(Effect::Emit(StreamEvent::Content { data: text })))
            }
        }

        // First pass, no tools: answer directly
        (CycleState::GeneratingInitial, Event::GenerationComplete { turn })
            if !turn.has_tool_requests() =>
        {
            Ok(complete(turn))
        }

        // First pass requested tools: run them in order
        (CycleState::GeneratingInitial, Event::GenerationComplete { turn }) => {
            let mut requests = turn.tool_requests.clone().into_iter();
            let Some(first) = requests.next() else {
                return Err(TransitionError::InvalidTransition(
                    "tool turn without requests".to_string(),
                ));
            };
            let message_id = turn.message_id.clone();
            let tool_calls = turn.tool_requests.clone();

            Ok(TransitionResult::new(CycleState::ExecutingTools {
                message_id: message_id.clone(),
                current: first.clone(),
                remaining: requests.collect(),
            })
            .with_effect(Effect::AppendTurn(Turn::Assistant(turn)))
            .with_effect(Effect::Emit(StreamEvent::ToolCallRequested {
                message_id,
                tool_calls,
            }))
            .with_effect(Effect::ExecuteTool { request: first }))
        }

        // Second pass: any tool requests are informational only
        (CycleState::GeneratingFinal, Event::GenerationComplete { turn }) => Ok(complete(turn)),

        (CycleState::GeneratingInitial | CycleState::GeneratingFinal, Event::GenerationEmpty) => {
            Ok(
                TransitionResult::new(CycleState::Terminal {
                    outcome: CycleOutcome::Empty,
                })
                .with_effects([Effect::stream_end(), Effect::Commit]),
            )
        }

        (
            CycleState::GeneratingInitial | CycleState::GeneratingFinal,
            Event::GenerationFailed { error },
        ) => Ok(TransitionResult::new(CycleState::Terminal {
            outcome: CycleOutcome::Failed {
                kind: error.kind,
                message: error.message.clone(),
            },
        })
        .with_effects([
            Effect::Emit(StreamEvent::StreamEnd {
                error: Some(StreamError::model_unavailable(&error)),
            }),
            Effect::Rollback,
        ])),

        // ============================================================
        // Tool execution
        // ============================================================
        (
            CycleState::ExecutingTools {
                message_id,
                current,
                remaining,
            },
            Event::ToolComplete {
                request_id,
                tool_name,
                content,
            },
        ) if request_id == current.id => {
            let recorded = [
                Effect::AppendTurn(Turn::tool_result(
                    request_id.clone(),
                    tool_name.clone(),
                    content.clone(),
                )),
                Effect::Emit(StreamEvent::ToolResult {
                    tool_call_id: request_id,
                    tool_name,
                    content,
                }),
            ];

            match remaining.split_first() {
                Some((next, rest)) => Ok(TransitionResult::new(CycleState::ExecutingTools {
                    message_id: message_id.clone(),
                    current: next.clone(),
                    remaining: rest.to_vec(),
                })
                .with_effects(recorded)
                .with_effect(Effect::ExecuteTool {
                    request: next.clone(),
                })),
                None => Ok(TransitionResult::new(CycleState::GeneratingFinal)
                    .with_effects(recorded)
                    .with_effect(Effect::RequestGeneration { pass: Pass::Final })),
            }
        }

        (CycleState::ExecutingTools { current, .. }, Event::ToolComplete { request_id, .. }) => {
            Err(TransitionError::InvalidTransition(format!(
                "tool result for {request_id} while waiting on {}",
                current.id
            )))
        }

        // ============================================================
        // Consumer disconnect
        // ============================================================
        (s, Event::SinkClosed) if s.is_busy() => Ok(TransitionResult::new(CycleState::Terminal {
            outcome: CycleOutcome::Cancelled,
        })
        .with_effect(Effect::Rollback)),

        (CycleState::AwaitingInput, Event::SinkClosed) => {
            Ok(TransitionResult::new(CycleState::Terminal {
                outcome: CycleOutcome::Cancelled,
            }))
        }

        // ============================================================
        // Everything else
        // ============================================================
        (s, _) if s.is_terminal() => Err(TransitionError::CycleFinished),

        (s, e) => Err(TransitionError::InvalidTransition(format!(
            "{} in state {}",
            e.name(),
            s.name()
        ))),
    }
}

/// Close the cycle with a final assistant turn
fn complete(turn: AssistantTurn) -> TransitionResult {
    let message_id = turn.message_id.clone();
    let content = turn.text.clone();
    let tool_calls = turn.tool_requests.clone();

    TransitionResult::new(CycleState::Terminal {
        outcome: CycleOutcome::Completed {
            message_id: message_id.clone(),
            content: content.clone(),
        },
    })
    .with_effect(Effect::AppendTurn(Turn::Assistant(turn)))
    .with_effect(Effect::Emit(StreamEvent::FinalMessage {
        message_id,
        content,
        tool_calls,
    }))
    .with_effects([Effect::stream_end(), Effect::Commit])
}
