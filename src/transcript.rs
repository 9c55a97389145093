//! Conversation transcript
//!
//! The transcript is the model's conversational context: an ordered,
//! append-only log of turns. Each session owns exactly one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Greeting used to seed new and reset transcripts
pub const DEFAULT_GREETING: &str = "How can I help you today?";

/// Message id of the seed greeting turn
pub const GREETING_MESSAGE_ID: &str = "greeting";

/// A request, emitted by generation, to invoke a named tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Unique within the assistant turn that produced it
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Assistant contribution: text plus any tool requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantTurn {
    pub message_id: String,
    pub text: String,
    #[serde(default)]
    pub tool_requests: Vec<ToolRequest>,
}

impl AssistantTurn {
    pub fn text(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            text: text.into(),
            tool_requests: Vec::new(),
        }
    }

    pub fn has_tool_requests(&self) -> bool {
        !self.tool_requests.is_empty()
    }
}

/// One atomic contribution to the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Assistant(AssistantTurn),
    ToolResult {
        tool_request_id: String,
        tool_name: String,
        content: String,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn tool_result(
        tool_request_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Turn::ToolResult {
            tool_request_id: tool_request_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
        }
    }

    /// Short label for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Turn::User { .. } => "user",
            Turn::Assistant(_) => "assistant",
            Turn::ToolResult { .. } => "tool_result",
        }
    }
}

/// Immutable view of a transcript at a point in time.
///
/// Cheap to clone; an in-flight generation holds one of these so later
/// appends can never be observed mid-stream.
pub type TranscriptSnapshot = Arc<[Turn]>;

/// Ordered log of conversation turns
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
    greeting: String,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// Empty transcript with the default greeting used on reset
    pub fn new() -> Self {
        Self {
            turns: Vec::new(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }

    /// Transcript seeded with a single greeting assistant turn
    pub fn seeded(greeting: impl Into<String>) -> Self {
        let mut transcript = Self {
            turns: Vec::new(),
            greeting: greeting.into(),
        };
        transcript.reset();
        transcript
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        Arc::from(self.turns.as_slice())
    }

    /// Clear to the single seed greeting turn
    pub fn reset(&mut self) {
        self.turns.clear();
        self.turns.push(Turn::Assistant(AssistantTurn::text(
            GREETING_MESSAGE_ID,
            self.greeting.clone(),
        )));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn greeting(&self) -> &str {
        &self.greeting
    }
}
