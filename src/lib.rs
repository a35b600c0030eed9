//! Streaming chat relay for the agency back office.
//!
//! `POST /api/chat` stores the user's message, calls the upstream
//! chat-completion provider in streaming mode and re-frames its output into
//! the event protocol defined in `chat-protocol`. The assistant's reply is
//! persisted once the stream ends.

pub mod agent;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod service;

pub use routes::{app, AppState};
