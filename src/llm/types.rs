//! Common types for LLM interactions

use super::LlmError;
use crate::transcript::TranscriptSnapshot;
use futures::stream::BoxStream;
use serde::Serialize;

/// Streaming generation request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub turns: TranscriptSnapshot,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Partial tool call carried by one delta.
///
/// A provider may split a single call across many deltas; `index` is the
/// stable per-call key within one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Incremental piece of a generation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationDelta {
    pub text: String,
    pub tool_calls: Vec<ToolCallFragment>,
}

impl GenerationDelta {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(fragment: ToolCallFragment) -> Self {
        Self {
            text: String::new(),
            tool_calls: vec![fragment],
        }
    }
}

/// Item of a generation stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Delta(GenerationDelta),
    /// Explicit end of the response
    Done { finish_reason: Option<String> },
}

/// Lazy, single-consumption sequence of chunks.
///
/// A stream that yields `None` before `StreamChunk::Done` was interrupted.
pub type LlmStream = BoxStream<'static, Result<StreamChunk, LlmError>>;
