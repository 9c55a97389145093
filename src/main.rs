//! Concierge - a conversational personal assistant
//!
//! Dispatches each user message to a language model, runs the tools the
//! model asks for, and streams the answer back over SSE.

mod api;
mod config;
mod llm;
mod runtime;
mod state_machine;
mod system_prompt;
mod tools;
mod transcript;

use api::{create_router, AppState};
use axum::http::HeaderValue;
use config::ServerConfig;
use llm::{LlmConfig, ModelRegistry};
use runtime::{RegistryModelClient, SessionManager, ToolRegistryExecutor};
use std::sync::Arc;
use tools::{ToolRegistry, ToolsFile};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env before anything reads the environment
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concierge=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    match dotenv {
        Ok(path) => tracing::info!(path = %path.display(), "Loaded .env file"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env file"),
    }

    // Configuration
    let config = ServerConfig::from_env()?;

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config));

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    }

    // Tools
    let remote = match &config.tools_file {
        Some(path) => ToolsFile::load(path)?.tools,
        None => Vec::new(),
    };
    let tool_registry = ToolRegistry::standard(remote);
    tracing::info!(tools = ?tool_registry.names(), "Tool registry initialized");

    // Sessions
    let model = Arc::new(RegistryModelClient::default_model(Arc::clone(&llm_registry)));
    let mut sessions = SessionManager::new(model, Arc::new(ToolRegistryExecutor::new(tool_registry)))
        .with_max_sessions(config.max_sessions);
    if let Some(greeting) = &config.greeting {
        sessions = sessions.with_greeting(greeting.clone());
    }
    if !sessions.is_configured() {
        tracing::warn!(
            model = %sessions.model_id(),
            "No credentials for the default model; chat requests will be rejected. Set GOOGLE_API_KEY, OPENAI_API_KEY or LLM_GATEWAY."
        );
    }

    let state = AppState::new(sessions, llm_registry);
    let sessions = Arc::clone(&state.sessions);

    // Create router
    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|o| HeaderValue::from_str(o))
            .collect::<Result<Vec<_>, _>>()?;
        CorsLayer::new().allow_origin(origins)
    }
    .allow_methods(Any)
    .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.addr();
    tracing::info!("Concierge server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down, cancelling in-flight cycles");
            sessions.shutdown();
        })
        .await?;

    Ok(())
}
