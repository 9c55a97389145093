//! Tool implementations for the assistant
//!
//! Tools are stateless singletons; all per-call context arrives through
//! `ToolContext`.

mod clock;
mod remote;

pub use clock::CurrentDateTimeTool;
pub use remote::{RemoteTool, RemoteToolSpec, ToolsFile};

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm::ToolDefinition;

/// Failure raised by a tool capability
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Failed(String),
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

/// Context for one tool invocation
#[derive(Clone)]
pub struct ToolContext {
    /// Fires when the consumer of the cycle has gone away
    pub cancel: CancellationToken,
    pub session_id: String,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, session_id: impl Into<String>) -> Self {
        Self {
            cancel,
            session_id: session_id.into(),
        }
    }
}

/// Trait for tools the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool.
    ///
    /// Long-running tools should watch `ctx.cancel` and return
    /// `ToolError::Cancelled` when it fires.
    async fn run(&self, input: Map<String, Value>, ctx: ToolContext) -> Result<String, ToolError>;
}

/// How an invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Succeeded,
    NotFound,
    Failed,
}

/// Result of routing one tool request; failures are carried as content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub content: String,
    pub status: InvocationStatus,
}

impl ToolInvocation {
    fn not_found(name: &str) -> Self {
        Self {
            content: format!("Tool '{name}' not found"),
            status: InvocationStatus::NotFound,
        }
    }

    fn failed(name: &str, message: impl std::fmt::Display) -> Self {
        Self {
            content: format!("Error executing tool {name}: {message}"),
            status: InvocationStatus::Failed,
        }
    }
}

/// Collection of tools available to sessions
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in tools plus the given remote declarations
    pub fn standard(remote: Vec<RemoteToolSpec>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CurrentDateTimeTool));
        for spec in remote {
            registry.register(Arc::new(RemoteTool::new(spec)));
        }
        registry
    }

    /// Add a tool; a tool with the same name is replaced in place
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            tracing::warn!(tool = %tool.name(), "Replacing previously registered tool");
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Route one request to its tool.
    ///
    /// Never fails: an unknown name, an error, or a panic inside the tool
    /// all come back as an invocation with descriptive content.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Map<String, Value>,
        ctx: ToolContext,
    ) -> ToolInvocation {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name).cloned() else {
            tracing::warn!(tool = %name, "Model requested unknown tool");
            return ToolInvocation::not_found(name);
        };

        let started = std::time::Instant::now();
        let outcome = AssertUnwindSafe(tool.run(arguments, ctx)).catch_unwind().await;
        let duration_ms = started.elapsed().as_millis();

        match outcome {
            Ok(Ok(content)) => {
                tracing::info!(tool = %name, duration_ms = %duration_ms, "Tool completed");
                ToolInvocation {
                    content,
                    status: InvocationStatus::Succeeded,
                }
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %name, duration_ms = %duration_ms, error = %e, "Tool failed");
                ToolInvocation::failed(name, e)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(tool = %name, duration_ms = %duration_ms, panic = %message, "Tool panicked");
                ToolInvocation::failed(name, message)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}
