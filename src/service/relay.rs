//! Drives one streamed turn: upstream bytes in, [`StreamEvent`]s out, then
//! finalization.

use std::fmt::Display;

use bytes::Bytes;
use chat_protocol::{StreamEvent, EMPTY_RESPONSE_MESSAGE};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

use super::ChatService;
use crate::agent::reframe::Reframer;

/// Message of the `error` event sent when the upstream body breaks off.
pub const STREAM_INTERRUPTED_MESSAGE: &str = "AI stream interrupted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Non-empty reply handed to the stores.
    Persisted,
    /// Nothing to save; the client got an empty-response error.
    Empty,
    /// The client went away; the partial reply was discarded.
    ClientGone,
}

/// Starts the relay on its own task and returns the event receiver that
/// feeds the HTTP body. The task outlives the body, so finalization runs
/// even if the response is dropped mid-stream.
pub fn spawn_relay<S, E>(
    service: ChatService,
    conversation_id: String,
    upstream: S,
) -> UnboundedReceiver<StreamEvent>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let outcome = relay(&service, &conversation_id, upstream, tx).await;
        debug!(conversation_id = %conversation_id, ?outcome, "Relay finished");
    });
    rx
}

/// Re-frames `upstream` into `tx` and finalizes the turn.
///
/// The sender is dropped only after persistence completes, so a client that
/// reads the body to the end observes the stored state.
pub async fn relay<S, E>(
    service: &ChatService,
    conversation_id: &str,
    mut upstream: S,
    tx: UnboundedSender<StreamEvent>,
) -> RelayOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let opened = StreamEvent::Conversation { conversation_id: conversation_id.to_string() };
    if tx.send(opened).is_err() {
        return client_gone(conversation_id, 0);
    }

    let mut reframer = Reframer::new(conversation_id);
    loop {
        let next = tokio::select! {
            chunk = upstream.next() => chunk,
            _ = tx.closed() => return client_gone(conversation_id, reframer.text().len()),
        };

        let (events, upstream_ended) = match next {
            Some(Ok(bytes)) => (reframer.feed(&bytes), false),
            Some(Err(e)) => {
                error!(conversation_id, "Upstream stream failed: {e}");
                let interrupted = StreamEvent::Error { message: STREAM_INTERRUPTED_MESSAGE.to_string() };
                (vec![interrupted], true)
            }
            None => {
                if !reframer.is_finished() {
                    debug!(conversation_id, "Upstream closed without [DONE]");
                }
                (reframer.flush(), true)
            }
        };

        for event in events {
            if tx.send(event).is_err() {
                return client_gone(conversation_id, reframer.text().len());
            }
        }
        if upstream_ended || reframer.is_finished() {
            break;
        }
    }

    debug!(
        conversation_id,
        finish_reason = reframer.finish_reason().unwrap_or("none"),
        chars = reframer.text().len(),
        "Upstream stream ended"
    );

    let text = reframer.into_text();
    if text.trim().is_empty() {
        info!(conversation_id, "AI returned empty response, nothing persisted");
        let _ = tx.send(StreamEvent::Error { message: EMPTY_RESPONSE_MESSAGE.to_string() });
        return RelayOutcome::Empty;
    }

    service.save_assistant_reply(conversation_id, text).await;
    RelayOutcome::Persisted
}

fn client_gone(conversation_id: &str, discarded_chars: usize) -> RelayOutcome {
    info!(conversation_id, discarded_chars, "Client disconnected, stopping relay");
    RelayOutcome::ClientGone
}
