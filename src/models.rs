use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Title length, in characters, of a conversation created from its first message.
pub const TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// A new conversation titled after the message that opened it.
    pub fn open(owner_id: &str, first_message: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: first_message.chars().take(TITLE_MAX_CHARS).collect(),
            last_message_at: now,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for MessageRole {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: String, role: MessageRole, content: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id,
            role,
            content,
            created_at: Utc::now(),
        }
    }
}

/// The authenticated caller, as reported by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
}

// ── Read-only directory records used for prompt context ──────────────────────

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ProjectRecord {
    pub name: String,
    pub status: Option<String>,
    pub client_name: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskRecord {
    pub title: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub project_name: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ClientRecord {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_truncated_by_characters() {
        let long = "é".repeat(100);
        let conv = Conversation::open("u1", &long);
        assert_eq!(conv.title.chars().count(), TITLE_MAX_CHARS);
        assert_eq!(conv.owner_id, "u1");
    }

    #[test]
    fn test_role_round_trips_through_storage_text() {
        assert_eq!(MessageRole::try_from("assistant".to_string()), Ok(MessageRole::Assistant));
        assert_eq!(MessageRole::try_from("USER".to_string()), Ok(MessageRole::User));
        assert!(MessageRole::try_from("tool".to_string()).is_err());
        assert_eq!(serde_json::to_string(&MessageRole::User).unwrap(), r#""user""#);
    }
}
