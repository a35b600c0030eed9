use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_AI_API_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_AI_TEMPERATURE: f32 = 0.7;
const DEFAULT_IDENTITY_USER_HEADER: &str = "x-user-id";
const DEFAULT_IDENTITY_EMAIL_HEADER: &str = "x-user-email";
const DEFAULT_MAX_MESSAGE_CHARS: usize = 8000;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Startup configuration. Loaded once in `main` and passed down.
///
/// Each field comes from its environment variable when set, otherwise from
/// the default. The upstream API key has no default.
#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub port: u16,
    pub ai_api_base_url: String,
    pub ai_api_key: String,
    pub ai_model: String,
    pub ai_temperature: f32,
    pub identity_user_header: String,
    pub identity_email_header: String,
    pub max_message_chars: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            db_max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            ai_api_base_url: get("AI_API_BASE_URL")
                .unwrap_or_else(|| DEFAULT_AI_API_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            ai_api_key: get("AI_API_KEY").ok_or(ConfigError::Missing("AI_API_KEY"))?,
            ai_model: get("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            ai_temperature: parse_or(&get, "AI_TEMPERATURE", DEFAULT_AI_TEMPERATURE)?,
            identity_user_header: get("IDENTITY_USER_HEADER")
                .unwrap_or_else(|| DEFAULT_IDENTITY_USER_HEADER.to_string()),
            identity_email_header: get("IDENTITY_EMAIL_HEADER")
                .unwrap_or_else(|| DEFAULT_IDENTITY_EMAIL_HEADER.to_string()),
            max_message_chars: parse_or(&get, "MAX_MESSAGE_CHARS", DEFAULT_MAX_MESSAGE_CHARS)?,
        })
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<redacted>")
            .field("db_max_connections", &self.db_max_connections)
            .field("port", &self.port)
            .field("ai_api_base_url", &self.ai_api_base_url)
            .field("ai_api_key", &"<redacted>")
            .field("ai_model", &self.ai_model)
            .field("ai_temperature", &self.ai_temperature)
            .field("identity_user_header", &self.identity_user_header)
            .field("identity_email_header", &self.identity_email_header)
            .field("max_message_chars", &self.max_message_chars)
            .finish()
    }
}
