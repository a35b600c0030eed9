use std::sync::Arc;

use agency_chat_relay::agent::CompletionClient;
use agency_chat_relay::auth::GatewayHeaders;
use agency_chat_relay::config::AppConfig;
use agency_chat_relay::db::{ConversationRepository, DirectoryRepository, MessageRepository};
use agency_chat_relay::errors::AppError;
use agency_chat_relay::service::ChatService;
use agency_chat_relay::{app, AppState};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agency_chat_relay=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env().context("invalid configuration (see .env.example)")?;
    info!(?config, "Configuration loaded");

    // ── Database ──────────────────────────────────────────────────────────────
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(AppError::DatabaseConnectionFailed)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run database migrations")?;

    info!("Database connection established and migrations applied");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let chat = ChatService::new(
        Arc::new(ConversationRepository::new(pool.clone())),
        Arc::new(MessageRepository::new(pool.clone())),
        Arc::new(DirectoryRepository::new(pool)),
        CompletionClient::new(&config),
        config.max_message_chars,
    );
    let state = AppState {
        chat,
        identity: Arc::new(GatewayHeaders::from_config(&config)),
    };

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app(state)).await?;
    Ok(())
}
