//! LLM provider abstraction
//!
//! Provides a common streaming interface over chat completion providers.

mod accumulator;
mod error;
mod models;
mod openai;
mod registry;
mod types;


pub use accumulator::TurnAccumulator;
pub use error::{LlmError, LlmErrorKind};
pub use models::{all_models, ModelDef, Provider};
pub use registry::{LlmConfig, ModelRegistry};
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Open a streaming generation.
    ///
    /// Errors returned here mean no output was produced at all; failures
    /// after the first chunk arrive as `Err` items on the stream.
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn stream(&self, request: &LlmRequest) -> Result<LlmStream, LlmError> {
        let start = Instant::now();
        let result = self.inner.stream(request).await;

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = e.kind.as_str(),
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            model = %self.model_id,
            open_ms = %start.elapsed().as_millis(),
            turns = request.turns.len(),
            tools = request.tools.len(),
            "LLM stream opened"
        );

        let model_id = self.model_id.clone();
        let mut deltas = 0usize;
        let logged = stream.inspect(move |item| match item {
            Ok(StreamChunk::Delta(_)) => deltas += 1,
            Ok(StreamChunk::Done { finish_reason }) => {
                tracing::info!(
                    model = %model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    deltas,
                    finish_reason = finish_reason.as_deref().unwrap_or("none"),
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    deltas,
                    error = %e.message,
                    kind = e.kind.as_str(),
                    retryable = e.kind.is_retryable(),
                    "LLM stream failed"
                );
            }
        });

        Ok(logged.boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
