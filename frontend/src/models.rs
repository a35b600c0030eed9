use serde::{Deserialize, Serialize};

/// Matches the backend `Conversation` model.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub last_message_at: String,
    pub created_at: String,
}

/// Matches the backend `Message` model.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}
