//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatRequest, ErrorResponse, MessageResponse, ModelsResponse, ResetResponse, ToolsResponse,
    TranscriptResponse,
};
use super::AppState;
use crate::runtime::{DispatchError, DEFAULT_SESSION_ID};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Per-session operations
        .route("/api/sessions/:id/chat", post(stream_chat))
        .route("/api/sessions/:id/messages", post(send_message))
        .route("/api/sessions/:id/reset", post(reset_session))
        .route("/api/sessions/:id/transcript", get(get_transcript))
        // Single-session deployments
        .route("/chat/invoke", post(invoke_default))
        .route("/chat/reset", post(reset_default))
        // Introspection
        .route("/api/tools", get(list_tools))
        .route("/api/models", get(list_models))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Chat
// ============================================================

async fn stream_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    start_stream(&state, &session_id, req).await
}

async fn invoke_default(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, AppError> {
    start_stream(&state, DEFAULT_SESSION_ID, req).await
}

/// Errors before the cycle starts become HTTP errors; later failures travel
/// inside the event stream.
async fn start_stream(
    state: &AppState,
    session_id: &str,
    req: ChatRequest,
) -> Result<Response, AppError> {
    let text = validate_text(req.text)?;
    tracing::info!(session_id = %session_id, chars = text.len(), "Chat message received");

    let handle = state.sessions.start_cycle(session_id, text).await?;
    Ok(sse_stream(handle.events).into_response())
}

async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let text = validate_text(req.text)?;
    let report = state.sessions.dispatch(&session_id, text).await?;
    Ok(Json(MessageResponse::new(&report.outcome, report.events)))
}

fn validate_text(text: String) -> Result<String, AppError> {
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }
    Ok(text)
}

// ============================================================
// Session Management
// ============================================================

async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ResetResponse>, AppError> {
    reset(&state, &session_id).await
}

async fn reset_default(State(state): State<AppState>) -> Result<Json<ResetResponse>, AppError> {
    reset(&state, DEFAULT_SESSION_ID).await
}

async fn reset(state: &AppState, session_id: &str) -> Result<Json<ResetResponse>, AppError> {
    state.sessions.reset(session_id).await?;
    Ok(Json(ResetResponse {
        message: "Chat history reset successfully".to_string(),
    }))
}

async fn get_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<TranscriptResponse> {
    let turns = state.sessions.transcript(&session_id).await;
    let busy = state.sessions.is_busy(&session_id).await;
    Json(TranscriptResponse {
        session_id,
        turns,
        busy,
    })
}

// ============================================================
// Introspection
// ============================================================

async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.sessions.tool_definitions(),
    })
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: state.llm_registry.available_model_info(),
        default: state.llm_registry.default_model_id().to_string(),
    })
}

async fn get_version() -> &'static str {
    concat!("concierge ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    Busy(String),
    Configuration(String),
    ModelUnavailable(String),
    Internal(String),
}

impl From<DispatchError> for AppError {
    fn from(e: DispatchError) -> Self {
        let message = e.to_string();
        match e {
            DispatchError::Busy => AppError::Busy(message),
            DispatchError::Configuration(_) => AppError::Configuration(message),
            DispatchError::ModelUnavailable(_) => AppError::ModelUnavailable(message),
            DispatchError::Internal(_) => AppError::Internal(message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Busy(msg) => (StatusCode::CONFLICT, msg),
            AppError::Configuration(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::ModelUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, error = %message, "Request failed");
        }
        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
