//! Persistence seams. The relay only talks to these traits; the PostgreSQL
//! repositories below implement them for production.

pub mod conversation_repository;
pub mod directory_repository;
pub mod message_repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::AppError;
use crate::models::{ClientRecord, Conversation, Message, ProjectRecord, TaskRecord};

pub use conversation_repository::ConversationRepository;
pub use directory_repository::DirectoryRepository;
pub use message_repository::MessageRepository;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Looks a conversation up, scoped to its owner. A conversation owned by
    /// someone else is indistinguishable from one that does not exist.
    async fn find_for_owner(&self, id: &str, owner_id: &str) -> Result<Option<Conversation>, AppError>;

    /// The owner's conversations, most recently active first.
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Conversation>, AppError>;

    async fn create(&self, conversation: &Conversation) -> Result<(), AppError>;

    /// Records activity on a conversation.
    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All messages of a conversation in ascending `created_at` order.
    async fn list_for_conversation(&self, conversation_id: &str) -> Result<Vec<Message>, AppError>;

    async fn insert(&self, message: &Message) -> Result<(), AppError>;

    /// Returns the number of deleted messages.
    async fn delete_for_conversation(&self, conversation_id: &str) -> Result<u64, AppError>;
}

/// Read-only view of the back-office records the assistant may quote.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn list_projects(&self, limit: i64) -> Result<Vec<ProjectRecord>, AppError>;
    async fn list_tasks(&self, limit: i64) -> Result<Vec<TaskRecord>, AppError>;
    async fn list_clients(&self, limit: i64) -> Result<Vec<ClientRecord>, AppError>;
}
