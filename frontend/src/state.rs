use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use leptos::task::spawn_local;
use web_sys::AbortController;

use crate::api;
use crate::models::Conversation;
use crate::stream;
use crate::turn::{Applied, ChatSession, TurnOutcome};

const NOTICE_MILLIS: u32 = 5_000;

/// Shared application state, provided via Leptos context.
#[derive(Clone, Copy)]
pub struct AppState {
    // --- Read signals (for components to subscribe to) ---
    pub conversations: ReadSignal<Vec<Conversation>>,
    pub session: ReadSignal<ChatSession>,
    pub notice: ReadSignal<Option<(u64, String)>>,

    // --- Write signals (for mutating state) ---
    pub set_conversations: WriteSignal<Vec<Conversation>>,
    pub set_session: WriteSignal<ChatSession>,
    pub set_notice: WriteSignal<Option<(u64, String)>>,

    /// Abort handle of the in-flight chat request.
    controller: StoredValue<Option<AbortController>, LocalStorage>,
    notice_seq: StoredValue<u64>,
}

impl AppState {
    /// Create a new `AppState` and provide it in the current Leptos context.
    pub fn provide() -> Self {
        let (conversations, set_conversations) = signal(Vec::<Conversation>::new());
        let (session, set_session) = signal(ChatSession::new());
        let (notice, set_notice) = signal(None::<(u64, String)>);

        let state = Self {
            conversations,
            session,
            notice,
            set_conversations,
            set_session,
            set_notice,
            controller: StoredValue::new_local(None),
            notice_seq: StoredValue::new(0),
        };

        provide_context(state);
        state
    }

    /// Shows a transient notification.
    pub fn notify(&self, message: String) {
        log::warn!("{message}");
        let seq = self.notice_seq.get_value() + 1;
        self.notice_seq.set_value(seq);
        self.set_notice.set(Some((seq, message)));

        let set_notice = self.set_notice;
        let notice = self.notice;
        Timeout::new(NOTICE_MILLIS, move || {
            if notice.get_untracked().is_some_and(|(shown, _)| shown == seq) {
                set_notice.set(None);
            }
        })
        .forget();
    }

    /// Load conversations from the backend.
    pub fn load_conversations(&self) {
        let state = *self;
        spawn_local(async move {
            match api::fetch_conversations().await {
                Ok(convos) => state.set_conversations.set(convos),
                Err(e) => {
                    log::error!("Failed to fetch conversations: {e}");
                    state.notify(e);
                }
            }
        });
    }

    /// Select a conversation and load its messages.
    pub fn select_conversation(&self, id: String) {
        self.stop();
        let state = *self;
        spawn_local(async move {
            match api::fetch_messages(&id).await {
                Ok(msgs) => state.set_session.update(|s| s.load(id, &msgs)),
                Err(e) => {
                    log::error!("Failed to fetch messages: {e}");
                    state.notify(e);
                }
            }
        });
    }

    /// Starts a fresh local conversation. Nothing is deleted on the server.
    pub fn new_conversation(&self) {
        self.stop();
        self.set_session.update(ChatSession::clear);
    }

    /// Sends a message and streams the reply into the session.
    pub fn send_message(&self, text: String) {
        let Some(ticket) = self.set_session.try_update(|s| s.begin(&text)).flatten() else {
            return;
        };
        let conversation_id = self
            .session
            .with_untracked(|s| s.conversation_id().map(str::to_string));

        let controller = AbortController::new().ok();
        let signal = controller.as_ref().map(AbortController::signal);
        self.controller.set_value(controller);

        let state = *self;
        spawn_local(async move {
            let body = match api::open_chat_stream(&text, conversation_id.as_deref(), signal.as_ref()).await {
                Ok(body) => body,
                Err(e) => {
                    state.conclude(state.set_session.try_update(|s| s.fail(ticket, &e)).flatten());
                    return;
                }
            };

            let opened = state.set_session.try_update(|s| s.stream_opened(ticket)).unwrap_or(false);
            if !opened {
                return;
            }

            let mut failure = None;
            let read = stream::read_events(body, |event| {
                match state.set_session.try_update(|s| s.apply(ticket, event)) {
                    Some(Applied::Continue) => true,
                    Some(Applied::Failed(message)) => {
                        failure = Some(message);
                        false
                    }
                    Some(Applied::Stale) | None => false,
                }
            })
            .await;

            let outcome = match (failure, read) {
                (Some(message), _) | (None, Err(message)) => {
                    state.set_session.try_update(|s| s.fail(ticket, &message))
                }
                (None, Ok(())) => state.set_session.try_update(|s| s.finish(ticket)),
            };
            state.conclude(outcome.flatten());
        });
    }

    /// Cancels the running turn, if any. Safe to call repeatedly.
    pub fn stop(&self) {
        self.controller.update_value(|controller| {
            if let Some(controller) = controller.take() {
                controller.abort();
            }
        });
        self.set_session.update(|s| {
            if s.cancel() {
                log::info!("Chat turn cancelled");
            }
        });
    }

    /// Cancels any stream, waits for the server to clear the conversation,
    /// then clears the local view.
    pub fn reset_conversation(&self) {
        self.stop();
        let Some(id) = self
            .session
            .with_untracked(|s| s.conversation_id().map(str::to_string))
        else {
            self.set_session.update(ChatSession::clear);
            return;
        };

        let mut started = false;
        self.set_session.update(|s| started = s.begin_reset());
        if !started {
            return;
        }

        let state = *self;
        spawn_local(async move {
            let result = api::reset_conversation(&id).await;
            state.set_session.update(|s| s.finish_reset(result.is_ok()));
            match result {
                Ok(()) => state.load_conversations(),
                Err(e) => state.notify(e),
            }
        });
    }

    /// Runs once per finished turn. `None` means the turn was already
    /// cancelled or replaced.
    fn conclude(&self, outcome: Option<TurnOutcome>) {
        let Some(outcome) = outcome else {
            return;
        };
        self.controller.set_value(None);
        match outcome {
            TurnOutcome::Completed => self.load_conversations(),
            TurnOutcome::Errored(message) => {
                self.notify(message);
                self.load_conversations();
            }
            TurnOutcome::Cancelled => {}
        }
    }
}
