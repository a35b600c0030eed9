pub mod api_routes;

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{require_identity, IdentityProvider};
use crate::service::ChatService;

use api_routes::{
    chat_handler, health_handler, list_conversations_handler, list_messages_handler, reset_handler,
};

#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Builds the application router. Everything under `/api` requires a caller
/// identity; `/health` does not.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/reset", post(reset_handler))
        .route("/conversations", get(list_conversations_handler))
        .route("/conversations/{id}/messages", get(list_messages_handler))
        .route_layer(from_fn_with_state(state.clone(), require_identity));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
