//! HTTP API for the assistant
//!
//! Streaming chat over SSE, session reset and inspection, and model/tool
//! introspection.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::llm::ModelRegistry;
use crate::runtime::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub llm_registry: Arc<ModelRegistry>,
}

impl AppState {
    pub fn new(sessions: SessionManager, llm_registry: Arc<ModelRegistry>) -> Self {
        Self {
            sessions: Arc::new(sessions),
            llm_registry,
        }
    }
}
