//! `OpenAI`-compatible streaming chat completions
//!
//! Serves both `OpenAI` and Google Gemini, which exposes the same chat
//! completions surface under its own base URL.

use super::types::{
    GenerationDelta, LlmRequest, LlmStream, StreamChunk, ToolCallFragment, ToolDefinition,
};
use super::{LlmError, LlmService};
use crate::transcript::Turn;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_CHAT_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions";

/// Which hosted endpoint a model lives behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    OpenAI,
    Gemini,
}

impl Endpoint {
    fn url(self, gateway: Option<&str>) -> String {
        match (gateway, self) {
            (Some(gw), Endpoint::OpenAI) => {
                format!("{}/openai/v1/chat/completions", gw.trim_end_matches('/'))
            }
            (Some(gw), Endpoint::Gemini) => {
                format!("{}/gemini/v1beta/openai/chat/completions", gw.trim_end_matches('/'))
            }
            (None, Endpoint::OpenAI) => OPENAI_CHAT_URL.to_string(),
            (None, Endpoint::Gemini) => GEMINI_CHAT_URL.to_string(),
        }
    }
}

/// Streaming chat completions client
pub struct OpenAIService {
    client: Client,
    api_key: String,
    api_name: String,
    base_url: String,
    model_id: String,
}

impl OpenAIService {
    pub fn new(
        api_key: String,
        model_id: &str,
        api_name: &str,
        endpoint: Endpoint,
        gateway: Option<&str>,
    ) -> Result<Self, LlmError> {
        // No overall timeout: a streamed answer may legitimately take minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            api_name: api_name.to_string(),
            base_url: endpoint.url(gateway),
            model_id: model_id.to_string(),
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);

        if !request.system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(request.system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        messages.extend(translate_turns(&request.turns));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(translate_tool).collect())
        };

        OpenAIRequest {
            model: self.api_name.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            stream: true,
        }
    }
}

/// Translate transcript turns to chat messages.
///
/// Tool requests that never received a result (informational requests from a
/// final pass) are left off the wire: the API rejects an assistant tool call
/// with no matching tool message.
pub(super) fn translate_turns(turns: &[Turn]) -> Vec<OpenAIMessage> {
    let answered: HashSet<&str> = turns
        .iter()
        .filter_map(|turn| match turn {
            Turn::ToolResult {
                tool_request_id, ..
            } => Some(tool_request_id.as_str()),
            _ => None,
        })
        .collect();

    turns
        .iter()
        .map(|turn| match turn {
            Turn::User { text } => OpenAIMessage {
                role: "user".to_string(),
                content: Some(text.clone()),
                tool_calls: None,
                tool_call_id: None,
            },
            Turn::Assistant(assistant) => {
                let tool_calls: Vec<OpenAIToolCall> = assistant
                    .tool_requests
                    .iter()
                    .filter(|r| answered.contains(r.id.as_str()))
                    .map(|r| OpenAIToolCall {
                        id: r.id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: r.name.clone(),
                            arguments: serde_json::Value::Object(r.arguments.clone())
                                .to_string(),
                        },
                    })
                    .collect();

                let content = if assistant.text.is_empty() && !tool_calls.is_empty() {
                    None
                } else {
                    Some(assistant.text.clone())
                };

                OpenAIMessage {
                    role: "assistant".to_string(),
                    content,
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                }
            }
            Turn::ToolResult {
                tool_request_id,
                content,
                ..
            } => OpenAIMessage {
                role: "tool".to_string(),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(tool_request_id.clone()),
            },
        })
        .collect()
}

fn translate_tool(tool: &ToolDefinition) -> OpenAITool {
    OpenAITool {
        r#type: "function".to_string(),
        function: OpenAIFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        },
    }
}

/// What a single SSE `data:` payload contributes to the stream
#[derive(Debug, PartialEq, Eq)]
enum ChunkPayload {
    Delta {
        delta: GenerationDelta,
        finish_reason: Option<String>,
    },
    Done,
}

fn parse_chunk(data: &str) -> Result<ChunkPayload, LlmError> {
    if data.trim() == "[DONE]" {
        return Ok(ChunkPayload::Done);
    }

    let chunk: OpenAIStreamChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::protocol(format!("Failed to parse stream chunk: {e} - data: {data}")))?;

    if let Some(error) = chunk.error {
        return Err(LlmError::server_error(format!("Stream error: {}", error.message)));
    }

    let mut delta = GenerationDelta::default();
    let mut finish_reason = None;

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content {
            delta.text.push_str(&text);
        }
        // Some compatible endpoints omit `index`; position in the chunk stands in
        for (position, tc) in (0u32..).zip(choice.delta.tool_calls.unwrap_or_default()) {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            delta.tool_calls.push(ToolCallFragment {
                index: tc.index.unwrap_or(position),
                id: tc.id,
                name,
                arguments,
            });
        }
        if choice.finish_reason.is_some() {
            finish_reason = choice.finish_reason;
        }
    }

    Ok(ChunkPayload::Delta {
        delta,
        finish_reason,
    })
}

/// Per-stream bookkeeping for the terminal signal
#[derive(Debug, Default)]
struct StreamProgress {
    finish_reason: Option<String>,
    done: bool,
}

impl StreamProgress {
    /// Map a parsed payload to the chunks handed to the caller
    fn advance(&mut self, payload: ChunkPayload) -> Vec<Result<StreamChunk, LlmError>> {
        match payload {
            ChunkPayload::Done => {
                self.done = true;
                vec![Ok(StreamChunk::Done {
                    finish_reason: self.finish_reason.take(),
                })]
            }
            ChunkPayload::Delta {
                delta,
                finish_reason,
            } => {
                if finish_reason.is_some() {
                    self.finish_reason = finish_reason;
                }
                if delta.text.is_empty() && delta.tool_calls.is_empty() {
                    Vec::new()
                } else {
                    vec![Ok(StreamChunk::Delta(delta))]
                }
            }
        }
    }

    /// Called when the transport closes.
    ///
    /// Some compatible servers close right after the finish reason without
    /// sending `[DONE]`; that still counts as a completed response.
    fn close(&mut self) -> Option<Result<StreamChunk, LlmError>> {
        if self.done {
            return None;
        }
        self.done = true;
        match self.finish_reason.take() {
            Some(reason) => Some(Ok(StreamChunk::Done {
                finish_reason: Some(reason),
            })),
            None => Some(Err(LlmError::stream_interrupted())),
        }
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let openai_request = self.translate_request(request);

        let response = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;
            let message = extract_error_message(&body);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let events = Box::pin(response.bytes_stream().eventsource());

        let stream = futures::stream::unfold(
            (events, StreamProgress::default(), Vec::new()),
            |(mut events, mut progress, mut pending)| async move {
                loop {
                    if let Some(item) = pending.pop() {
                        return Some((item, (events, progress, pending)));
                    }
                    if progress.done {
                        return None;
                    }

                    match events.next().await {
                        Some(Ok(event)) => {
                            let items = match parse_chunk(&event.data) {
                                Ok(payload) => progress.advance(payload),
                                Err(e) => {
                                    progress.done = true;
                                    vec![Err(e)]
                                }
                            };
                            // Reverse so pop yields emission order
                            pending.extend(items.into_iter().rev());
                        }
                        Some(Err(e)) => {
                            progress.done = true;
                            let err = LlmError::network(format!("Stream read error: {e}"));
                            return Some((Err(err), (events, progress, pending)));
                        }
                        None => {
                            let item = progress.close()?;
                            return Some((item, (events, progress, pending)));
                        }
                    }
                }
            },
        );

        Ok(stream.boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

fn extract_error_message(body: &str) -> String {
    // Gemini wraps the error object in a single-element array
    serde_json::from_str::<OpenAIErrorResponse>(body)
        .map(|r| r.error.message)
        .or_else(|_| {
            serde_json::from_str::<Vec<OpenAIErrorResponse>>(body).map(|mut v| {
                v.pop()
                    .map_or_else(|| body.to_string(), |r| r.error.message)
            })
        })
        .unwrap_or_else(|_| body.to_string())
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct OpenAIMessage {
    pub(super) role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct OpenAIToolCall {
    pub(super) id: String,
    r#type: String,
    pub(super) function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct OpenAIFunctionCall {
    pub(super) name: String,
    pub(super) arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallDelta {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OpenAIFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
