use chat_protocol::{ChatRequest, ErrorBody, ResetRequest, ResetResponse};
use gloo_net::http::{Request, Response};
use web_sys::{AbortSignal, ReadableStream};

use crate::models::{Conversation, Message};

/// Same origin: the gateway serving this app adds the identity headers.
const API_BASE: &str = "";

const GENERIC_ERROR: &str = "Something went wrong, please try again";

/// Picks the most useful text from a failed response body: the structured
/// `details`, `error` or `hint` fields first, then the raw text.
pub fn describe_error(status: u16, text: &str) -> String {
    if let Ok(body) = serde_json::from_str::<ErrorBody>(text) {
        let structured = [body.details, Some(body.error), body.hint]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty());
        if let Some(message) = structured {
            return message;
        }
    }
    let raw = text.trim();
    if !raw.is_empty() {
        return raw.to_string();
    }
    if status == 0 {
        GENERIC_ERROR.to_string()
    } else {
        format!("{GENERIC_ERROR} (status {status})")
    }
}

async fn error_from(resp: Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    describe_error(status, &text)
}

/// Fetches the caller's conversations.
pub async fn fetch_conversations() -> Result<Vec<Conversation>, String> {
    let resp = Request::get(&format!("{API_BASE}/api/conversations"))
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_from(resp).await);
    }

    resp.json::<Vec<Conversation>>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

/// Fetches all messages for a given conversation.
pub async fn fetch_messages(conversation_id: &str) -> Result<Vec<Message>, String> {
    let resp = Request::get(&format!(
        "{API_BASE}/api/conversations/{conversation_id}/messages"
    ))
    .send()
    .await
    .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_from(resp).await);
    }

    resp.json::<Vec<Message>>()
        .await
        .map_err(|e| format!("Parse error: {e}"))
}

/// Posts a chat turn and hands back the event-stream body. Aborting
/// `signal` cancels both the request and any read of the body.
pub async fn open_chat_stream(
    message: &str,
    conversation_id: Option<&str>,
    signal: Option<&AbortSignal>,
) -> Result<ReadableStream, String> {
    let body = ChatRequest {
        message: Some(message.to_string()),
        conversation_id: conversation_id.map(str::to_string),
    };

    let resp = Request::post(&format!("{API_BASE}/api/chat"))
        .abort_signal(signal)
        .json(&body)
        .map_err(|e| format!("Serialize error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_from(resp).await);
    }

    resp.body().ok_or_else(|| GENERIC_ERROR.to_string())
}

/// Clears a conversation on the server.
pub async fn reset_conversation(conversation_id: &str) -> Result<(), String> {
    let body = ResetRequest { conversation_id: conversation_id.to_string() };
    let resp = Request::post(&format!("{API_BASE}/api/chat/reset"))
        .json(&body)
        .map_err(|e| format!("Serialize error: {e}"))?
        .send()
        .await
        .map_err(|e| format!("Network error: {e}"))?;

    if !resp.ok() {
        return Err(error_from(resp).await);
    }

    match resp.json::<ResetResponse>().await {
        Ok(ResetResponse { ok: true }) => Ok(()),
        Ok(_) => Err(GENERIC_ERROR.to_string()),
        Err(e) => Err(format!("Parse error: {e}")),
    }
}
