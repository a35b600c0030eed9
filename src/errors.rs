use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chat_protocol::ErrorBody;
use sqlx::postgres::PgDatabaseError;
use thiserror::Error;
use tracing::{error, warn};

/// Longest slice of an upstream error body surfaced to the caller.
pub const UPSTREAM_BODY_PREVIEW_CHARS: usize = 200;

/// Top-level application error. Every variant maps to one HTTP status and the
/// JSON [`ErrorBody`] returned before any event stream is opened.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Identity ─────────────────────────────────────────────────────────────
    #[error("Unauthorized")]
    Unauthorized,

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Invalid JSON body")]
    InvalidJson(#[source] serde_json::Error),

    #[error("{field_name} is required")]
    EmptyField { field_name: &'static str },

    #[error("{field_name} exceeds max length of {max_length} characters (actual: {actual_length})")]
    FieldTooLong { field_name: &'static str, max_length: usize, actual_length: usize },

    // ── Conversation errors ──────────────────────────────────────────────────
    #[error("Conversation not found")]
    ConversationNotFound { id: String },

    // ── Database errors ──────────────────────────────────────────────────────
    #[error("Database connection failed: {0}")]
    DatabaseConnectionFailed(#[source] sqlx::Error),

    #[error("{message}")]
    DatabaseQueryFailed {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    // ── Upstream provider errors ─────────────────────────────────────────────
    #[error("AI provider request failed")]
    UpstreamRequestFailed(#[source] reqwest::Error),

    #[error("AI provider returned status {status}")]
    UpstreamStatus { status: u16, body: String },

    #[error("AI provider returned no response body")]
    UpstreamEmptyBody,

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn db_query(message: impl Into<String>, source: sqlx::Error) -> Self {
        AppError::DatabaseQueryFailed { message: message.into(), source }
    }

    /// Builds an upstream status error, keeping only the head of the body.
    pub fn upstream_status(status: u16, body: &str) -> Self {
        AppError::UpstreamStatus {
            status,
            body: body.chars().take(UPSTREAM_BODY_PREVIEW_CHARS).collect(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::ConversationNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::InvalidJson(_) | AppError::EmptyField { .. } | AppError::FieldTooLong { .. }
        )
    }

    pub fn status(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else if matches!(self, AppError::Unauthorized) {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn body(&self) -> ErrorBody {
        let mut body = ErrorBody::new(self.to_string());
        match self {
            AppError::InvalidJson(source) => body.details = Some(source.to_string()),
            AppError::DatabaseConnectionFailed(source) | AppError::DatabaseQueryFailed { source, .. } => {
                let (details, code, hint) = database_diagnostics(source);
                body.details = details;
                body.code = code;
                body.hint = hint;
            }
            AppError::UpstreamRequestFailed(source) => body.details = Some(source.to_string()),
            AppError::UpstreamStatus { status, body: preview } => {
                body.details = Some(format!("upstream status {status}: {preview}"));
            }
            _ => {}
        }
        body
    }
}

/// Splits a sqlx error into operator-facing message, SQLSTATE code and the
/// Postgres hint, when available.
fn database_diagnostics(source: &sqlx::Error) -> (Option<String>, Option<String>, Option<String>) {
    match source {
        sqlx::Error::Database(db) => {
            let hint = db
                .try_downcast_ref::<PgDatabaseError>()
                .and_then(PgDatabaseError::hint)
                .map(str::to_string);
            (
                Some(db.message().to_string()),
                db.code().map(|code| code.into_owned()),
                hint,
            )
        }
        other => (Some(other.to_string()), None, None),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = self.body();
        if status.is_server_error() {
            error!(
                error = %self,
                details = body.details.as_deref().unwrap_or(""),
                code = body.code.as_deref().unwrap_or(""),
                "Request failed"
            );
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(body)).into_response()
    }
}
