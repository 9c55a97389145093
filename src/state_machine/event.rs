//! Events that drive a dispatch cycle

use crate::llm::LlmError;
use crate::transcript::AssistantTurn;

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    UserMessage {
        text: String,
    },

    // Generation events
    TextDelta {
        text: String,
    },
    GenerationComplete {
        turn: AssistantTurn,
    },
    /// The stream finished without text or tool requests
    GenerationEmpty,
    GenerationFailed {
        error: LlmError,
    },

    // Tool events
    ToolComplete {
        request_id: String,
        tool_name: String,
        content: String,
    },

    // Sink events
    SinkClosed,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserMessage { .. } => "user_message",
            Event::TextDelta { .. } => "text_delta",
            Event::GenerationComplete { .. } => "generation_complete",
            Event::GenerationEmpty => "generation_empty",
            Event::GenerationFailed { .. } => "generation_failed",
            Event::ToolComplete { .. } => "tool_complete",
            Event::SinkClosed => "sink_closed",
        }
    }
}
