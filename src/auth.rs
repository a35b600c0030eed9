//! Caller identity.
//!
//! Authentication itself happens in front of the relay. The gateway that
//! terminates the user's session forwards the resolved identity in request
//! headers; this module turns those headers into an [`Identity`] and fails
//! closed when they are missing.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::models::Identity;
use crate::routes::AppState;

pub trait IdentityProvider: Send + Sync {
    /// Returns the caller's identity, or `None` when the request is anonymous.
    fn identify(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Reads the identity forwarded by the authenticating gateway.
#[derive(Debug, Clone)]
pub struct GatewayHeaders {
    user_header: String,
    email_header: String,
}

impl GatewayHeaders {
    pub fn new(user_header: &str, email_header: &str) -> Self {
        Self {
            user_header: user_header.to_ascii_lowercase(),
            email_header: email_header.to_ascii_lowercase(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.identity_user_header, &config.identity_email_header)
    }
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl IdentityProvider for GatewayHeaders {
    fn identify(&self, headers: &HeaderMap) -> Option<Identity> {
        let user_id = header_text(headers, &self.user_header)?;
        Some(Identity {
            user_id,
            email: header_text(headers, &self.email_header),
        })
    }
}

/// Rejects anonymous requests with `401` before any handler touches data,
/// and hands the [`Identity`] to handlers through request extensions.
pub async fn require_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = state.identity.identify(req.headers()).ok_or_else(|| {
        warn!(path = %req.uri().path(), "Rejecting request without caller identity");
        AppError::Unauthorized
    })?;

    debug!(user_id = %identity.user_id, "Authenticated request");
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
