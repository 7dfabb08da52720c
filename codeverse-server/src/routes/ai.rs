//! AI assistant. Conversations are keyed by session, so logging out forgets them.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use codeverse_ai::{AssistRequest, ChatMessage, CodeAction};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::{ApiJson, CurrentUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatHistory {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct AssistReply {
    pub action: CodeAction,
    pub reply: String,
}

pub async fn history(State(state): State<AppState>, current: CurrentUser) -> Json<ChatHistory> {
    Json(ChatHistory {
        messages: state.assistant.history(&current.token).await,
    })
}

pub async fn send(
    State(state): State<AppState>,
    current: CurrentUser,
    ApiJson(body): ApiJson<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    let reply = state.assistant.chat(&current.token, &body.message).await?;
    Ok(Json(ChatReply { reply }))
}

pub async fn clear(State(state): State<AppState>, current: CurrentUser) -> StatusCode {
    state.assistant.clear(&current.token).await;
    StatusCode::NO_CONTENT
}

pub async fn assist(
    State(state): State<AppState>,
    _current: CurrentUser,
    ApiJson(request): ApiJson<AssistRequest>,
) -> Result<Json<AssistReply>, ApiError> {
    let reply = state.assistant.assist(&request).await?;
    Ok(Json(AssistReply {
        action: request.action,
        reply,
    }))
}
