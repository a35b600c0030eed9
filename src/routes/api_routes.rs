use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::http::HeaderValue;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chat_protocol::{ChatRequest, ResetRequest, ResetResponse};
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::info;

use super::AppState;
use crate::errors::AppError;
use crate::models::{Conversation, Identity, Message};
use crate::service::spawn_relay;

/// Parses a JSON body by hand so malformed input maps onto the relay's own
/// `400 Invalid JSON body` instead of axum's rejection text.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(AppError::InvalidJson)
}

/// POST `/api/chat` — validates, persists the user message, opens the
/// upstream stream and answers with `text/event-stream`.
pub async fn chat_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request: ChatRequest = parse_json(&body)?;
    let turn = state.chat.prepare_turn(&identity, request).await?;

    let upstream = state.chat.agent().stream(&turn.upstream_messages).await?;
    info!(
        conversation_id = %turn.conversation_id,
        created = turn.created,
        model = state.chat.agent().model(),
        "Streaming chat reply"
    );

    let events = spawn_relay(state.chat.clone(), turn.conversation_id, upstream);
    let stream = UnboundedReceiverStream::new(events).map(|event| Event::default().json_data(event));

    let mut response = Sse::new(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-transform"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}

/// POST `/api/chat/reset` — clears a conversation's messages.
pub async fn reset_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    body: Bytes,
) -> Result<Json<ResetResponse>, AppError> {
    let request: ResetRequest = parse_json(&body)?;
    state.chat.reset_conversation(&identity, &request.conversation_id).await?;
    Ok(Json(ResetResponse { ok: true }))
}

/// GET `/api/conversations`
pub async fn list_conversations_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Conversation>>, AppError> {
    state.chat.get_conversations(&identity).await.map(Json)
}

/// GET `/api/conversations/{id}/messages`
pub async fn list_messages_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, AppError> {
    state.chat.get_messages(&identity, &id).await.map(Json)
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
