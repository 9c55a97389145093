//! Remote tools reached over HTTP
//!
//! Each declaration in the tools file becomes one tool. An invocation POSTs
//! `{ "tool", "arguments", "session_id" }` to the declared endpoint and reads
//! back `{ "content" }`, `{ "error" }`, or a plain-text body.

use super::{Tool, ToolContext, ToolError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ToolsFileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid tool declaration: {0}")]
    Invalid(String),
}

/// One remote tool declaration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteToolSpec {
    pub name: String,
    pub description: String,
    pub endpoint: String,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Top-level shape of the tools file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolsFile {
    #[serde(default)]
    pub tools: Vec<RemoteToolSpec>,
}

impl ToolsFile {
    pub fn load(path: &Path) -> Result<Self, ToolsFileError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| ToolsFileError::Read {
            path: display.clone(),
            source,
        })?;
        let file: ToolsFile = serde_json::from_str(&raw).map_err(|source| ToolsFileError::Parse {
            path: display,
            source,
        })?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), ToolsFileError> {
        for spec in &self.tools {
            if spec.name.trim().is_empty() {
                return Err(ToolsFileError::Invalid("tool name is empty".to_string()));
            }
            if !(spec.endpoint.starts_with("http://") || spec.endpoint.starts_with("https://")) {
                return Err(ToolsFileError::Invalid(format!(
                    "{}: endpoint must be an http(s) URL",
                    spec.name
                )));
            }
            if let Some(schema) = &spec.input_schema {
                if !schema.is_object() {
                    return Err(ToolsFileError::Invalid(format!(
                        "{}: input_schema must be a JSON object",
                        spec.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    tool: &'a str,
    arguments: &'a Map<String, Value>,
    session_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Tool backed by an HTTP endpoint
pub struct RemoteTool {
    spec: RemoteToolSpec,
    client: Client,
    timeout: Duration,
}

impl RemoteTool {
    pub fn new(spec: RemoteToolSpec) -> Self {
        let timeout = Duration::from_secs(spec.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        Self {
            spec,
            client: Client::new(),
            timeout,
        }
    }

    async fn call(&self, input: &Map<String, Value>, session_id: &str) -> Result<String, ToolError> {
        let body = InvokeRequest {
            tool: &self.spec.name,
            arguments: input,
            session_id,
        };

        let response = self
            .client
            .post(&self.spec.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let parsed = serde_json::from_str::<InvokeResponse>(&text).ok();

        if !status.is_success() {
            let detail = parsed.and_then(|r| r.error).unwrap_or(text);
            return Err(ToolError::Failed(format!("HTTP {}: {detail}", status.as_u16())));
        }

        match parsed {
            Some(InvokeResponse {
                error: Some(error), ..
            }) => Err(ToolError::Failed(error)),
            Some(InvokeResponse {
                content: Some(Value::String(s)),
                ..
            }) => Ok(s),
            Some(InvokeResponse {
                content: Some(other),
                ..
            }) => Ok(other.to_string()),
            // Plain-text or unrecognized JSON body
            _ => Ok(text),
        }
    }

    fn transport_error(&self, e: &reqwest::Error) -> ToolError {
        if e.is_timeout() {
            ToolError::Timeout(self.timeout)
        } else {
            ToolError::Failed(format!("request failed: {e}"))
        }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> String {
        self.spec.description.clone()
    }

    fn input_schema(&self) -> Value {
        self.spec.input_schema.clone().unwrap_or_else(|| {
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural-language request for this tool"
                    }
                },
                "required": ["query"]
            })
        })
    }

    async fn run(&self, input: Map<String, Value>, ctx: ToolContext) -> Result<String, ToolError> {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
            result = self.call(&input, &ctx.session_id) => result,
        }
    }
}
