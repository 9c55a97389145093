//! Effects produced by state transitions

use super::Pass;
use crate::runtime::StreamEvent;
use crate::transcript::{ToolRequest, Turn};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append to the cycle's working transcript
    AppendTurn(Turn),

    /// Push an event to the sink
    Emit(StreamEvent),

    /// Stream a generation over the current working transcript
    RequestGeneration { pass: Pass },

    /// Invoke one tool
    ExecuteTool { request: ToolRequest },

    /// Write the working transcript back to the session
    Commit,

    /// Discard the working transcript
    Rollback,
}

impl Effect {
    pub fn append_user(text: impl Into<String>) -> Self {
        Effect::AppendTurn(Turn::user(text))
    }

    pub fn stream_end() -> Self {
        Effect::Emit(StreamEvent::StreamEnd { error: None })
    }
}
