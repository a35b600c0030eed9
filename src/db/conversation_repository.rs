use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

use super::ConversationStore;
use crate::errors::AppError;
use crate::models::Conversation;

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for ConversationRepository {
    async fn find_for_owner(&self, id: &str, owner_id: &str) -> Result<Option<Conversation>, AppError> {
        sqlx::query_as::<_, Conversation>(
            "SELECT id, owner_id, title, last_message_at, created_at
             FROM conversations
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to find conversation {id}: {e}");
            AppError::db_query("Failed to load conversation", e)
        })
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Conversation>, AppError> {
        sqlx::query_as::<_, Conversation>(
            "SELECT id, owner_id, title, last_message_at, created_at
             FROM conversations
             WHERE owner_id = $1
             ORDER BY last_message_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list conversations for {owner_id}: {e}");
            AppError::db_query("Failed to fetch conversations", e)
        })
    }

    async fn create(&self, conversation: &Conversation) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO conversations (id, owner_id, title, last_message_at, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&conversation.id)
        .bind(&conversation.owner_id)
        .bind(&conversation.title)
        .bind(conversation.last_message_at)
        .bind(conversation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create conversation {}: {e}", conversation.id);
            AppError::db_query("Failed to create conversation", e)
        })?;
        Ok(())
    }

    async fn touch(&self, id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE conversations SET last_message_at = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to update conversation timestamp {id}: {e}");
                AppError::db_query("Failed to update conversation", e)
            })?;
        Ok(())
    }
}
