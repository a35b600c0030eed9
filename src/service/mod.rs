pub mod chat_service;
pub mod relay;

pub use chat_service::{ChatService, TurnContext};
pub use relay::{relay, spawn_relay, RelayOutcome};
