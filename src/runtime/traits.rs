//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the executor with mock implementations.

use crate::llm::{LlmError, LlmRequest, LlmStream, ModelRegistry, ToolDefinition};
use crate::tools::{ToolContext, ToolInvocation, ToolRegistry};
use crate::transcript::ToolRequest;
use async_trait::async_trait;
use std::sync::Arc;

/// Client for streaming generations
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Open a generation over the request's transcript snapshot
    async fn generate_stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError>;

    fn model_id(&self) -> &str;

    /// Whether a generation could be attempted at all
    fn is_configured(&self) -> bool;
}

/// Executor for tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one request; failures come back as invocation content
    async fn invoke(&self, request: &ToolRequest, ctx: ToolContext) -> ToolInvocation;

    /// Get tool definitions for LLM
    fn definitions(&self) -> Vec<ToolDefinition>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ModelClient + ?Sized> ModelClient for Arc<T> {
    async fn generate_stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        (**self).generate_stream(request).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn is_configured(&self) -> bool {
        (**self).is_configured()
    }
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn invoke(&self, request: &ToolRequest, ctx: ToolContext) -> ToolInvocation {
        (**self).invoke(request, ctx).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        (**self).definitions()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use `ModelRegistry` as `ModelClient`
pub struct RegistryModelClient {
    registry: Arc<ModelRegistry>,
    model_id: String,
}

impl RegistryModelClient {
    pub fn new(registry: Arc<ModelRegistry>, model_id: String) -> Self {
        Self { registry, model_id }
    }

    /// Client for the registry's default model
    pub fn default_model(registry: Arc<ModelRegistry>) -> Self {
        let model_id = registry.default_model_id().to_string();
        Self::new(registry, model_id)
    }
}

#[async_trait]
impl ModelClient for RegistryModelClient {
    async fn generate_stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let llm = self
            .registry
            .get(&self.model_id)
            .ok_or_else(|| LlmError::auth(format!("Model {} is not configured", self.model_id)))?;
        llm.stream(request).await
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn is_configured(&self) -> bool {
        self.registry.get(&self.model_id).is_some()
    }
}

/// Adapter to use `ToolRegistry` as `ToolExecutor`
pub struct ToolRegistryExecutor {
    registry: ToolRegistry,
}

impl ToolRegistryExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistryExecutor {
    async fn invoke(&self, request: &ToolRequest, ctx: ToolContext) -> ToolInvocation {
        self.registry
            .invoke(&request.name, request.arguments.clone(), ctx)
            .await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}
