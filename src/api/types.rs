//! API request and response types

use crate::llm::ToolDefinition;
use crate::runtime::StreamEvent;
use crate::state_machine::CycleOutcome;
use crate::transcript::Turn;
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Response for reset
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub message: String,
}

/// Committed turns of a session
#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
    pub busy: bool,
}

/// Result of a non-streaming dispatch
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// `completed`, `empty` or `cancelled`
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub content: String,
    pub events: Vec<StreamEvent>,
}

impl MessageResponse {
    pub fn new(outcome: &CycleOutcome, events: Vec<StreamEvent>) -> Self {
        let (message_id, content) = match outcome {
            CycleOutcome::Completed {
                message_id,
                content,
            } => (Some(message_id.clone()), content.clone()),
            _ => (None, String::new()),
        };
        Self {
            outcome: outcome.as_str(),
            message_id,
            content,
            events,
        }
    }
}

/// Response for tool list
#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDefinition>,
}

/// Model information with metadata
#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub description: String,
    pub context_window: usize,
    pub default: bool,
}

/// Response for model list
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
    pub default: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
