use std::sync::Arc;

use chat_protocol::ChatRequest;
use chrono::Utc;
use tracing::{debug, error, info};

use crate::agent::prompt::{compose_messages, system_prompt};
use crate::agent::{CompletionClient, UpstreamMessage};
use crate::context::build_context;
use crate::db::{ConversationStore, DirectoryStore, MessageStore};
use crate::errors::AppError;
use crate::models::{Conversation, Identity, Message, MessageRole};

/// Everything the relay needs once the pre-stream gates have passed.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub conversation_id: String,
    /// True when this turn opened a new conversation.
    pub created: bool,
    pub upstream_messages: Vec<UpstreamMessage>,
}

#[derive(Clone)]
pub struct ChatService {
    conversations: Arc<dyn ConversationStore>,
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn DirectoryStore>,
    agent: CompletionClient,
    max_message_chars: usize,
}

impl ChatService {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn DirectoryStore>,
        agent: CompletionClient,
        max_message_chars: usize,
    ) -> Self {
        Self { conversations, messages, directory, agent, max_message_chars }
    }

    pub fn agent(&self) -> &CompletionClient {
        &self.agent
    }

    pub async fn get_conversations(&self, identity: &Identity) -> Result<Vec<Conversation>, AppError> {
        self.conversations.list_for_owner(&identity.user_id).await
    }

    pub async fn get_messages(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        self.owned_conversation(identity, conversation_id).await?;
        self.messages.list_for_conversation(conversation_id).await
    }

    /// Runs every gate that precedes the upstream call: validation,
    /// conversation resolution, the user-message write, history load and
    /// prompt assembly. Any error here is returned before a stream opens.
    pub async fn prepare_turn(
        &self,
        identity: &Identity,
        request: ChatRequest,
    ) -> Result<TurnContext, AppError> {
        // ── Validation ────────────────────────────────────────────────────────
        let message = request.message.as_deref().map(str::trim).unwrap_or_default();
        if message.is_empty() {
            return Err(AppError::EmptyField { field_name: "Message" });
        }
        let length = message.chars().count();
        if length > self.max_message_chars {
            return Err(AppError::FieldTooLong {
                field_name: "Message",
                max_length: self.max_message_chars,
                actual_length: length,
            });
        }

        // ── Resolve or create conversation ────────────────────────────────────
        let requested_id = request
            .conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        let (conversation_id, created) = match requested_id {
            Some(id) => (self.owned_conversation(identity, id).await?.id, false),
            None => {
                let conversation = Conversation::open(&identity.user_id, message);
                self.conversations.create(&conversation).await?;
                info!(
                    conversation_id = %conversation.id,
                    user_id = %identity.user_id,
                    "Opened conversation"
                );
                (conversation.id, true)
            }
        };

        // ── Persist user message ──────────────────────────────────────────────
        let user_message = Message::new(conversation_id.clone(), MessageRole::User, message.to_string());
        self.messages.insert(&user_message).await?;

        // ── History (includes the message just written) ───────────────────────
        let history = self.messages.list_for_conversation(&conversation_id).await?;

        // ── Prompt ────────────────────────────────────────────────────────────
        let context_block = build_context(self.directory.as_ref(), message).await;
        let system = system_prompt(identity, &context_block);
        let upstream_messages = compose_messages(system, &history);

        debug!(
            conversation_id = %conversation_id,
            history = history.len(),
            context = !context_block.is_empty(),
            "Prepared chat turn"
        );

        Ok(TurnContext { conversation_id, created, upstream_messages })
    }

    /// Persists a finished reply. The message insert and the timestamp bump
    /// run concurrently; a failure in either is logged and does not stop the
    /// other. Returns true when both writes succeeded.
    pub async fn save_assistant_reply(&self, conversation_id: &str, content: String) -> bool {
        let reply = Message::new(conversation_id.to_string(), MessageRole::Assistant, content);
        let (inserted, touched) = tokio::join!(
            self.messages.insert(&reply),
            self.conversations.touch(conversation_id, Utc::now()),
        );

        if let Err(e) = &inserted {
            error!(conversation_id, "Failed to save assistant message: {e}");
        }
        if let Err(e) = &touched {
            error!(conversation_id, "Failed to update conversation timestamp: {e}");
        }
        inserted.is_ok() && touched.is_ok()
    }

    /// Clears a conversation's messages. Returns the number removed.
    pub async fn reset_conversation(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> Result<u64, AppError> {
        let conversation_id = conversation_id.trim();
        if conversation_id.is_empty() {
            return Err(AppError::EmptyField { field_name: "Conversation id" });
        }
        self.owned_conversation(identity, conversation_id).await?;
        let removed = self.messages.delete_for_conversation(conversation_id).await?;
        info!(conversation_id, removed, "Conversation reset");
        Ok(removed)
    }

    async fn owned_conversation(
        &self,
        identity: &Identity,
        conversation_id: &str,
    ) -> Result<Conversation, AppError> {
        self.conversations
            .find_for_owner(conversation_id, &identity.user_id)
            .await?
            .ok_or_else(|| AppError::ConversationNotFound { id: conversation_id.to_string() })
    }
}
