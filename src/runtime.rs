//! Runtime for executing dispatch cycles
//!
//! Owns one transcript per session and runs at most one cycle per session at
//! a time. Each cycle works on a copy of the transcript that is written back
//! only when the cycle commits.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::CycleExecutor;
pub use traits::*;

use crate::llm::{LlmError, ToolDefinition};
use crate::state_machine::CycleOutcome;
use crate::transcript::{ToolRequest, Transcript, Turn, DEFAULT_GREETING};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_util::sync::CancellationToken;

/// Session id used by the single-session routes
pub const DEFAULT_SESSION_ID: &str = "default";

/// Sessions kept in memory before idle ones are evicted
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

// ============================================================================
// Sink protocol
// ============================================================================

/// Events sent to the consumer of a cycle, in emission order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text of the current generation pass
    Content { data: String },
    ToolCallRequested {
        message_id: String,
        tool_calls: Vec<ToolRequest>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
    },
    FinalMessage {
        message_id: String,
        content: String,
        tool_calls: Vec<ToolRequest>,
    },
    StreamEnd {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<StreamError>,
    },
}

impl StreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Content { .. } => "content",
            StreamEvent::ToolCallRequested { .. } => "tool_call_requested",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::FinalMessage { .. } => "final_message",
            StreamEvent::StreamEnd { .. } => "stream_end",
        }
    }
}

/// Error carried by a failing `StreamEnd`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamError {
    pub kind: String,
    pub message: String,
    pub retryable: bool,
}

impl StreamError {
    pub fn model_unavailable(error: &LlmError) -> Self {
        Self {
            kind: "model_unavailable".to_string(),
            message: error.message.clone(),
            retryable: error.kind.is_retryable(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: "internal".to_string(),
            message: message.into(),
            retryable: false,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a cycle cannot run or did not produce an answer
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Model unavailable: {}", .0.message)]
    ModelUnavailable(LlmError),
    #[error("A response is already in progress for this session")]
    Busy,
    #[error("Internal error: {0}")]
    Internal(String),
}

// ============================================================================
// Sessions
// ============================================================================

/// Committed transcript plus the one-cycle-at-a-time flag
pub struct Session {
    transcript: Mutex<Transcript>,
    busy: AtomicBool,
    last_active: Mutex<Instant>,
}

impl Session {
    fn new(greeting: &str) -> Self {
        Self {
            transcript: Mutex::new(Transcript::seeded(greeting)),
            busy: AtomicBool::new(false),
            last_active: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn last_active(&self) -> Instant {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the committed transcript.
    ///
    /// A panic while holding the lock cannot leave a half-written transcript
    /// (writes are whole-value replacements), so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(self: &Arc<Self>) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard {
                session: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Marks a session busy until dropped
pub(crate) struct BusyGuard {
    session: Arc<Session>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.session.busy.store(false, Ordering::Release);
    }
}

/// Receiving side of a running cycle
pub struct CycleHandle {
    pub events: mpsc::UnboundedReceiver<StreamEvent>,
    pub outcome: oneshot::Receiver<CycleOutcome>,
}

/// Everything a cycle produced, for callers that do not stream
#[derive(Debug)]
pub struct CycleReport {
    pub events: Vec<StreamEvent>,
    pub outcome: CycleOutcome,
}

/// Manager for all sessions
pub struct SessionManager {
    model: Arc<dyn ModelClient>,
    tools: Arc<dyn ToolExecutor>,
    greeting: String,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    /// Cancels every in-flight cycle on shutdown
    shutdown: CancellationToken,
}

impl SessionManager {
    pub fn new(model: Arc<dyn ModelClient>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            model,
            tools,
            greeting: DEFAULT_GREETING.to_string(),
            sessions: RwLock::new(HashMap::new()),
            max_sessions: DEFAULT_MAX_SESSIONS,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    async fn existing(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Get or create a session. Only sending a message creates one.
    async fn session(&self, session_id: &str) -> Arc<Session> {
        if let Some(session) = self.existing(session_id).await {
            return session;
        }

        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            evict_idle(&mut sessions);
        }
        let session = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id = %session_id, "Creating session");
            Arc::new(Session::new(&self.greeting))
        });
        Arc::clone(session)
    }

    /// Start a cycle for one user turn.
    ///
    /// Configuration problems and a busy session are reported here, before
    /// the transcript is touched. Everything after that arrives on the
    /// returned event channel.
    pub async fn start_cycle(
        &self,
        session_id: &str,
        text: String,
    ) -> Result<CycleHandle, DispatchError> {
        if !self.model.is_configured() {
            return Err(DispatchError::Configuration(format!(
                "model {} is not configured; set GOOGLE_API_KEY, OPENAI_API_KEY or LLM_GATEWAY",
                self.model.model_id()
            )));
        }

        let session = self.session(session_id).await;
        let Some(guard) = session.try_acquire() else {
            tracing::info!(session_id = %session_id, "Rejecting message, cycle in progress");
            return Err(DispatchError::Busy);
        };

        session.touch();
        let base = session.lock().clone();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let executor = CycleExecutor::new(
            session_id.to_string(),
            Arc::clone(&session),
            base,
            Arc::clone(&self.model),
            Arc::clone(&self.tools),
            event_tx,
            self.shutdown.child_token(),
        );

        tokio::spawn(async move {
            let outcome = executor.run(text).await;
            drop(guard);
            let _ = outcome_tx.send(outcome);
        });

        Ok(CycleHandle {
            events: event_rx,
            outcome: outcome_rx,
        })
    }

    /// Run a cycle to completion and collect its events.
    ///
    /// A cycle that could not reach the model is an error here, with the
    /// transcript unchanged.
    pub async fn dispatch(&self, session_id: &str, text: String) -> Result<CycleReport, DispatchError> {
        let CycleHandle {
            mut events,
            outcome,
        } = self.start_cycle(session_id, text).await?;

        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }

        let outcome = outcome.await.unwrap_or(CycleOutcome::Cancelled);
        match outcome {
            CycleOutcome::Failed { kind, message } => {
                Err(DispatchError::ModelUnavailable(LlmError::new(kind, message)))
            }
            CycleOutcome::Internal { message } => Err(DispatchError::Internal(message)),
            outcome => Ok(CycleReport {
                events: collected,
                outcome,
            }),
        }
    }

    /// Clear a session back to its greeting. Unknown sessions already are.
    pub async fn reset(&self, session_id: &str) -> Result<(), DispatchError> {
        let Some(session) = self.existing(session_id).await else {
            return Ok(());
        };
        let Some(_guard) = session.try_acquire() else {
            return Err(DispatchError::Busy);
        };
        session.lock().reset();
        tracing::info!(session_id = %session_id, "Session reset");
        Ok(())
    }

    /// Committed turns of a session; an unknown session reads as the greeting
    pub async fn transcript(&self, session_id: &str) -> Vec<Turn> {
        match self.existing(session_id).await {
            Some(session) => session.lock().turns().to_vec(),
            None => Transcript::seeded(self.greeting.as_str()).turns().to_vec(),
        }
    }

    #[cfg(test)]
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_busy(&self, session_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(session_id)
            .is_some_and(|s| s.is_busy())
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_configured()
    }

    /// Cancel all in-flight cycles
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Drop the least recently active session that is not running a cycle.
/// Busy sessions are never evicted, so the map may exceed its bound while
/// every session is busy.
fn evict_idle(sessions: &mut HashMap<String, Arc<Session>>) {
    let victim = sessions
        .iter()
        .filter(|(_, s)| !s.is_busy())
        .min_by_key(|(_, s)| s.last_active())
        .map(|(id, _)| id.clone());

    match victim {
        Some(id) => {
            sessions.remove(&id);
            tracing::info!(session_id = %id, "Evicted idle session");
        }
        None => tracing::warn!(sessions = sessions.len(), "Session limit reached with every session busy"),
    }
}
