//! Dispatch cycle executor
//!
//! Feeds events through the pure state machine and performs the effects it
//! asks for. Generation passes and tool calls run strictly one at a time.

use super::traits::{ModelClient, ToolExecutor};
use super::{Session, StreamError, StreamEvent};
use crate::llm::{LlmError, LlmRequest, StreamChunk, TurnAccumulator};
use crate::state_machine::{transition, CycleOutcome, CycleState, Effect, Event, Pass, TransitionError};
use crate::system_prompt::build_system_prompt;
use crate::tools::ToolContext;
use crate::transcript::{ToolRequest, Transcript};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Slow work requested by a transition
enum Work {
    Generate(Pass),
    Tool(ToolRequest),
}

/// Runs one cycle for one session
pub struct CycleExecutor {
    session_id: String,
    session: Arc<Session>,
    state: CycleState,
    /// Transcript as committed before the cycle started
    base: Transcript,
    working: Transcript,
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolExecutor>,
    sink: mpsc::UnboundedSender<StreamEvent>,
    cancel: CancellationToken,
}

impl CycleExecutor {
    pub fn new(
        session_id: String,
        session: Arc<Session>,
        base: Transcript,
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolExecutor>,
        sink: mpsc::UnboundedSender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            session,
            state: CycleState::AwaitingInput,
            working: base.clone(),
            base,
            model,
            tools,
            sink,
            cancel,
        }
    }

    pub async fn run(mut self, text: String) -> CycleOutcome {
        let span = tracing::info_span!(
            "chat_cycle",
            session_id = %self.session_id,
            model = %self.model.model_id()
        );

        async move {
            let started = std::time::Instant::now();
            let before = self.base.len();
            let outcome = self.drive(text).await;

            tracing::info!(
                outcome = outcome.as_str(),
                duration_ms = %started.elapsed().as_millis(),
                turns_before = before,
                turns_after = self.session.lock().len(),
                "Cycle finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    /// Process events in a loop - no recursion
    async fn drive(&mut self, text: String) -> CycleOutcome {
        let mut next = Some(Event::UserMessage { text });

        while let Some(event) = next.take() {
            let work = match self.step(event) {
                Ok(work) => work,
                Err(e) => {
                    tracing::error!(error = %e, state = self.state.name(), "Rejected transition");
                    return self.abort(&e);
                }
            };

            next = match work {
                Some(Work::Generate(pass)) => Some(self.generate(pass).await),
                Some(Work::Tool(request)) => Some(self.execute_tool(request).await),
                None => None,
            };
        }

        if let CycleState::Terminal { outcome } = &self.state {
            return outcome.clone();
        }
        let e = TransitionError::InvalidTransition(format!("cycle stalled in {}", self.state.name()));
        tracing::error!(error = %e, "Cycle stalled");
        self.abort(&e)
    }

    /// Apply one event: pure transition, then the quick effects.
    /// Returns the slow effect, if any, for the caller to await.
    fn step(&mut self, event: Event) -> Result<Option<Work>, TransitionError> {
        tracing::trace!(event = event.name(), state = self.state.name(), "Transition");
        let result = transition(&self.state, event)?;
        self.state = result.new_state;

        let mut work = None;
        for effect in result.effects {
            match effect {
                Effect::AppendTurn(turn) => {
                    tracing::debug!(kind = turn.kind(), "Appending turn");
                    self.working.append(turn);
                }
                Effect::Emit(event) => self.emit(event),
                Effect::Commit => self.commit(),
                Effect::Rollback => self.rollback(),
                Effect::RequestGeneration { pass } => work = Some(Work::Generate(pass)),
                Effect::ExecuteTool { request } => work = Some(Work::Tool(request)),
            }
        }
        Ok(work)
    }

    fn emit(&self, event: StreamEvent) {
        // A closed sink is noticed at the next yield point
        if self.sink.send(event).is_err() {
            tracing::debug!("Sink closed, dropping event");
        }
    }

    fn commit(&mut self) {
        *self.session.lock() = self.working.clone();
        self.base = self.working.clone();
    }

    fn rollback(&mut self) {
        tracing::info!(
            discarded = self.working.len().saturating_sub(self.base.len()),
            "Rolling back cycle"
        );
        self.working = self.base.clone();
    }

    /// Bail out after an internal error; the session keeps its pre-cycle transcript
    fn abort(&mut self, error: &TransitionError) -> CycleOutcome {
        self.rollback();
        self.emit(StreamEvent::StreamEnd {
            error: Some(StreamError::internal(error.to_string())),
        });
        let outcome = CycleOutcome::Internal {
            message: error.to_string(),
        };
        self.state = CycleState::Terminal {
            outcome: outcome.clone(),
        };
        outcome
    }

    /// Stream one generation pass, relaying text as it arrives
    async fn generate(&mut self, pass: Pass) -> Event {
        let definitions = self.tools.definitions();
        let request = LlmRequest {
            system: build_system_prompt(&definitions, &chrono::Local::now()),
            turns: self.working.snapshot(),
            tools: definitions,
            max_tokens: None,
        };
        tracing::debug!(pass = pass.as_str(), turns = request.turns.len(), "Requesting generation");

        let opened = tokio::select! {
            biased;
            () = disconnected(&self.sink, &self.cancel) => return Event::SinkClosed,
            opened = self.model.generate_stream(&request) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(error) => return Event::GenerationFailed { error },
        };

        let mut acc = TurnAccumulator::new();
        loop {
            let item = tokio::select! {
                biased;
                () = disconnected(&self.sink, &self.cancel) => return Event::SinkClosed,
                item = stream.next() => item,
            };

            match item {
                Some(Ok(StreamChunk::Delta(delta))) => {
                    acc.push(&delta);
                    if !delta.text.is_empty() {
                        if let Err(e) = self.step(Event::TextDelta { text: delta.text }) {
                            tracing::warn!(error = %e, "Dropping text delta");
                        }
                    }
                }
                Some(Ok(StreamChunk::Done { finish_reason })) => {
                    tracing::debug!(
                        pass = pass.as_str(),
                        deltas = acc.delta_count(),
                        finish_reason = finish_reason.as_deref().unwrap_or("none"),
                        "Generation complete"
                    );
                    break;
                }
                Some(Err(error)) => return Event::GenerationFailed { error },
                None => {
                    return Event::GenerationFailed {
                        error: LlmError::stream_interrupted(),
                    }
                }
            }
        }

        match acc.finish(uuid::Uuid::new_v4().to_string()) {
            Ok(turn) => Event::GenerationComplete { turn },
            Err(_) => {
                tracing::info!(pass = pass.as_str(), "Generation produced no content");
                Event::GenerationEmpty
            }
        }
    }

    /// Run one tool; on disconnect cancel it, wait for it, and discard the result
    async fn execute_tool(&mut self, request: ToolRequest) -> Event {
        let tool_cancel = self.cancel.child_token();
        let ctx = ToolContext::new(tool_cancel.clone(), self.session_id.clone());
        tracing::info!(tool = %request.name, request_id = %request.id, "Executing tool");

        let finished = {
            let invoke = self.tools.invoke(&request, ctx);
            tokio::pin!(invoke);

            let finished = tokio::select! {
                biased;
                invocation = &mut invoke => Some(invocation),
                () = disconnected(&self.sink, &self.cancel) => None,
            };
            if finished.is_none() {
                tool_cancel.cancel();
                let _discarded = invoke.await;
            }
            finished
        };

        let Some(invocation) = finished else {
            tracing::info!(tool = %request.name, "Tool result discarded after disconnect");
            return Event::SinkClosed;
        };

        tracing::debug!(tool = %request.name, status = ?invocation.status, "Tool finished");
        Event::ToolComplete {
            request_id: request.id,
            tool_name: request.name,
            content: invocation.content,
        }
    }
}

/// Resolves once the consumer is gone or the cycle is cancelled
async fn disconnected(sink: &mpsc::UnboundedSender<StreamEvent>, cancel: &CancellationToken) {
    tokio::select! {
        () = sink.closed() => {}
        () = cancel.cancelled() => {}
    }
}
