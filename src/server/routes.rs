//! HTTP route handlers for the relay API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::conversation::core::ids::UserId;
use crate::conversation::store::{ConversationExport, ConversationStats};
use crate::relay::ModelInfo;

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat))
        .route(
            "/api/conversations/{user_id}",
            get(export_conversation).delete(clear_conversation),
        )
        .route("/api/stats", get(stats))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.relay.model_info().model_name,
    }))
}

/// Chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Opaque user identifier.
    pub user_id: UserId,
    /// The user's message.
    pub message: String,
}

/// Chat response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Text to show the user.
    pub reply: String,
    /// Generation failed and `reply` is a fallback.
    pub fallback: bool,
}

/// Relay one message.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    if request.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message must not be empty".to_string()));
    }

    let reply = state
        .relay
        .on_message(request.user_id, &request.message)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Relay error: {e}")))?;

    Ok(Json(ChatResponse {
        fallback: reply.is_fallback(),
        reply: reply.into_text(),
    }))
}

async fn export_conversation(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Json<ConversationExport> {
    Json(state.store().export(user_id))
}

async fn clear_conversation(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> impl IntoResponse {
    let message = state.relay.on_command_clear(user_id).await;
    Json(serde_json::json!({
        "status": "cleared",
        "message": message,
    }))
}

/// Stats response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Live store statistics.
    pub conversations: ConversationStats,
    /// Generation settings in use.
    pub model: ModelInfo,
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        conversations: state.store().stats(),
        model: state.relay.model_info(),
    })
}
