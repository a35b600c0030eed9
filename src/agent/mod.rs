//! Client for the upstream chat-completion provider.

pub mod prompt;
pub mod reframe;

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::MessageRole;

/// Raw byte stream of an accepted streaming completion.
pub type UpstreamStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// One `{role, content}` entry of the upstream `messages` array.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [UpstreamMessage],
    temperature: f32,
    stream: bool,
}

/// Calls `POST {base_url}/chat/completions` in streaming mode.
#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl CompletionClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", config.ai_api_base_url.trim_end_matches('/')),
            api_key: config.ai_api_key.clone(),
            model: config.ai_model.clone(),
            temperature: config.ai_temperature,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Opens a streaming completion. Only a 2xx response with a body is
    /// returned; anything else becomes an [`AppError`] that never contains
    /// the API key.
    pub async fn stream(&self, messages: &[UpstreamMessage]) -> Result<UpstreamStream, AppError> {
        let payload = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream: true,
        };

        debug!(model = %self.model, messages = messages.len(), "Opening completion stream");
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Completion request could not be sent: {e}");
                AppError::UpstreamRequestFailed(e.without_url())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = body.replace(&self.api_key, "[redacted]");
            error!(status = status.as_u16(), "AI provider rejected the completion request");
            return Err(AppError::upstream_status(status.as_u16(), &body));
        }
        if response.content_length() == Some(0) {
            error!(status = status.as_u16(), "AI provider returned an empty body");
            return Err(AppError::UpstreamEmptyBody);
        }

        Ok(Box::pin(response.bytes_stream()))
    }
}
