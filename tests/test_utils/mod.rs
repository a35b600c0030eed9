//! Test utilities for integration tests
#![allow(dead_code)]

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex};

use agency_chat_relay::agent::CompletionClient;
use agency_chat_relay::auth::GatewayHeaders;
use agency_chat_relay::config::AppConfig;
use agency_chat_relay::db::{ConversationStore, DirectoryStore, MessageStore};
use agency_chat_relay::errors::AppError;
use agency_chat_relay::models::{
    ClientRecord, Conversation, Message, MessageRole, ProjectRecord, TaskRecord,
};
use agency_chat_relay::service::ChatService;
use agency_chat_relay::{app, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use axum::Router;
use chat_protocol::{decode_line, LineBuffer, StreamEvent};
use chrono::{DateTime, Utc};
use sqlx::error::{DatabaseError, ErrorKind};

pub const USER_HEADER: &str = "x-user-id";
pub const EMAIL_HEADER: &str = "x-user-email";

/// Shared in-memory state behind the store fakes. Tests keep a clone to
/// inspect what the relay wrote.
#[derive(Default)]
pub struct MemoryDb {
    pub conversations: Mutex<Vec<Conversation>>,
    pub messages: Mutex<Vec<Message>>,
    pub projects: Mutex<Vec<ProjectRecord>>,
    pub fail_directory: Mutex<bool>,
    pub fail_touch: Mutex<bool>,
    pub fail_create: Mutex<bool>,
    pub fail_user_insert: Mutex<bool>,
    pub fail_assistant_insert: Mutex<bool>,
    pub fail_history: Mutex<bool>,
}

/// Database error with a message and SQLSTATE, as a driver would report it.
#[derive(Debug)]
pub struct FakeDbError {
    pub message: &'static str,
    pub code: &'static str,
}

impl fmt::Display for FakeDbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl StdError for FakeDbError {}

impl DatabaseError for FakeDbError {
    fn message(&self) -> &str {
        self.message
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed(self.code))
    }

    fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// The error a repository returns when `table` is missing.
pub fn missing_table(context: &str, table: &'static str) -> AppError {
    let message = match table {
        "conversations" => "relation \"conversations\" does not exist",
        _ => "relation \"messages\" does not exist",
    };
    AppError::db_query(
        context,
        sqlx::Error::Database(Box::new(FakeDbError { message, code: "42P01" })),
    )
}

impl MemoryDb {
    pub fn messages_for(&self, conversation_id: &str) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.conversations.lock().unwrap().iter().find(|c| c.id == id).cloned()
    }

    /// Seeds a conversation owned by `owner_id` and returns its id.
    pub fn seed_conversation(&self, owner_id: &str, title: &str) -> String {
        let conversation = Conversation::open(owner_id, title);
        let id = conversation.id.clone();
        self.conversations.lock().unwrap().push(conversation);
        id
    }

    pub fn seed_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }
}

pub struct MemoryConversations(pub Arc<MemoryDb>);
pub struct MemoryMessages(pub Arc<MemoryDb>);
pub struct MemoryDirectory(pub Arc<MemoryDb>);

#[async_trait]
impl ConversationStore for MemoryConversations {
    async fn find_for_owner(&self, id: &str, owner_id: &str) -> Result<Option<Conversation>, AppError> {
        Ok(self
            .0
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id && c.owner_id == owner_id)
            .cloned())
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Conversation>, AppError> {
        let mut owned: Vec<Conversation> = self
            .0
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
        Ok(owned)
    }

    async fn create(&self, conversation: &Conversation) -> Result<(), AppError> {
        if *self.0.fail_create.lock().unwrap() {
            return Err(missing_table("Failed to create conversation", "conversations"));
        }
        self.0.conversations.lock().unwrap().push(conversation.clone());
        Ok(())
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        if *self.0.fail_touch.lock().unwrap() {
            return Err(AppError::Unexpected("conversations table is read-only".to_string()));
        }
        if let Some(c) = self.0.conversations.lock().unwrap().iter_mut().find(|c| c.id == id) {
            c.last_message_at = at;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryMessages {
    async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        if *self.0.fail_history.lock().unwrap() {
            return Err(missing_table("Failed to load conversation history", "messages"));
        }
        let mut messages = self.0.messages_for(conversation_id);
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn insert(&self, message: &Message) -> Result<(), AppError> {
        let fail = match message.role {
            MessageRole::User => *self.0.fail_user_insert.lock().unwrap(),
            _ => *self.0.fail_assistant_insert.lock().unwrap(),
        };
        if fail {
            return Err(missing_table("Failed to save message", "messages"));
        }
        self.0.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn delete_for_conversation(&self, conversation_id: &str) -> Result<u64, AppError> {
        let mut messages = self.0.messages.lock().unwrap();
        let before = messages.len();
        messages.retain(|m| m.conversation_id != conversation_id);
        Ok((before - messages.len()) as u64)
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn list_projects(&self, limit: i64) -> Result<Vec<ProjectRecord>, AppError> {
        if *self.0.fail_directory.lock().unwrap() {
            return Err(AppError::Unexpected("directory offline".to_string()));
        }
        Ok(self.0.projects.lock().unwrap().iter().take(limit as usize).cloned().collect())
    }

    async fn list_tasks(&self, _limit: i64) -> Result<Vec<TaskRecord>, AppError> {
        if *self.0.fail_directory.lock().unwrap() {
            return Err(AppError::Unexpected("directory offline".to_string()));
        }
        Ok(Vec::new())
    }

    async fn list_clients(&self, _limit: i64) -> Result<Vec<ClientRecord>, AppError> {
        if *self.0.fail_directory.lock().unwrap() {
            return Err(AppError::Unexpected("directory offline".to_string()));
        }
        Ok(Vec::new())
    }
}

pub fn test_config(upstream_url: &str) -> AppConfig {
    AppConfig::from_lookup(|name| match name {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        "AI_API_KEY" => Some("sk-test-key".to_string()),
        "AI_API_BASE_URL" => Some(upstream_url.to_string()),
        "AI_MODEL" => Some("test-model".to_string()),
        "MAX_MESSAGE_CHARS" => Some("500".to_string()),
        _ => None,
    })
    .expect("test config is valid")
}

pub fn test_service(db: &Arc<MemoryDb>, upstream_url: &str) -> ChatService {
    let config = test_config(upstream_url);
    ChatService::new(
        Arc::new(MemoryConversations(db.clone())),
        Arc::new(MemoryMessages(db.clone())),
        Arc::new(MemoryDirectory(db.clone())),
        CompletionClient::new(&config),
        config.max_message_chars,
    )
}

/// Builds the full router over in-memory stores, with the upstream provider
/// at `upstream_url` (usually a mockito server).
pub fn test_app(db: &Arc<MemoryDb>, upstream_url: &str) -> Router {
    app(AppState {
        chat: test_service(db, upstream_url),
        identity: Arc::new(GatewayHeaders::new(USER_HEADER, EMAIL_HEADER)),
    })
}

pub fn post_json(uri: &str, user_id: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(uri)
        .method("POST")
        .header("content-type", "application/json");
    if let Some(user_id) = user_id {
        builder = builder
            .header(USER_HEADER, user_id)
            .header(EMAIL_HEADER, format!("{user_id}@agency.test"));
    }
    builder.body(body.into()).unwrap()
}

pub fn get_as(uri: &str, user_id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(USER_HEADER, user_id)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Decodes an event-stream body into relay events.
pub fn parse_events(body: &str) -> Vec<StreamEvent> {
    let mut lines = LineBuffer::new();
    let mut all = lines.push(body.as_bytes());
    all.extend(lines.finish());
    all.iter()
        .filter_map(|line| decode_line(line).unwrap())
        .collect()
}

/// Concatenation of every `token` value, in arrival order.
pub fn token_text(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Token { value } => Some(value.as_str()),
            _ => None,
        })
        .collect()
}

/// An upstream body streaming `deltas` as OpenAI-style chunks, then `[DONE]`.
pub fn upstream_body(deltas: &[&str]) -> String {
    let mut body = String::from(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    );
    for delta in deltas {
        let chunk = serde_json::json!({"choices": [{"delta": {"content": delta}, "finish_reason": null}]});
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}
