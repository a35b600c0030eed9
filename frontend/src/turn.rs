//! Per-turn chat state, kept free of browser APIs so it can be unit tested.
//!
//! A turn moves `Idle -> Sending -> Streaming` and ends `Completed`,
//! `Errored` or `Cancelled`, after which the session is `Idle` again. Every
//! turn gets a ticket; callbacks carrying a ticket that is no longer current
//! are ignored, so a cancelled or reset turn can never touch the view.

use chat_protocol::{StreamEvent, EMPTY_RESPONSE_MESSAGE};

use crate::models::Message;

/// Shown when a turn produced no text.
pub const NO_RESPONSE_NOTICE: &str = "The agent did not return a response";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bubble {
    pub id: u64,
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Sending,
    Streaming,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    /// Carries the text to show the user.
    Errored(String),
    Cancelled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket(u64);

/// What the read loop should do after an event was applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    Continue,
    Failed(String),
    /// The turn is no longer current; stop reading.
    Stale,
}

#[derive(Clone, Debug, Default)]
pub struct ChatSession {
    bubbles: Vec<Bubble>,
    /// The assistant bubble being streamed into.
    pending: Option<Bubble>,
    conversation_id: Option<String>,
    phase: Option<(Ticket, TurnPhase)>,
    /// A server reset is in flight; no turn may start until it resolves.
    resetting: bool,
    next_id: u64,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn pending_text(&self) -> Option<&str> {
        self.pending.as_ref().map(|b| b.content.as_str())
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase.map(|(_, phase)| phase).unwrap_or(TurnPhase::Idle)
    }

    /// True while a turn runs or a reset is pending.
    pub fn is_busy(&self) -> bool {
        self.phase.is_some() || self.resetting
    }

    pub fn is_resetting(&self) -> bool {
        self.resetting
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        matches!(self.phase, Some((current, _)) if current == ticket)
    }

    /// Starts a turn and shows the user's message right away. Returns `None`
    /// when a turn is already running or the text is blank.
    pub fn begin(&mut self, text: &str) -> Option<Ticket> {
        if self.is_busy() || text.trim().is_empty() {
            return None;
        }
        let bubble = self.bubble(Role::User, text.to_string());
        self.bubbles.push(bubble);
        let ticket = Ticket(self.alloc_id());
        self.phase = Some((ticket, TurnPhase::Sending));
        Some(ticket)
    }

    /// The response body is readable: open the assistant placeholder.
    pub fn stream_opened(&mut self, ticket: Ticket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.pending = Some(self.bubble(Role::Assistant, String::new()));
        self.phase = Some((ticket, TurnPhase::Streaming));
        true
    }

    pub fn apply(&mut self, ticket: Ticket, event: StreamEvent) -> Applied {
        if !self.is_current(ticket) {
            return Applied::Stale;
        }
        match event {
            StreamEvent::Conversation { conversation_id } => {
                self.conversation_id = Some(conversation_id);
            }
            StreamEvent::Token { value } => {
                if let Some(pending) = self.pending.as_mut() {
                    pending.content.push_str(&value);
                }
            }
            // The end of the body finishes the turn, not this event.
            StreamEvent::Done => {}
            StreamEvent::Error { message } => return Applied::Failed(message),
        }
        Applied::Continue
    }

    /// The body ended cleanly.
    pub fn finish(&mut self, ticket: Ticket) -> Option<TurnOutcome> {
        if !self.is_current(ticket) {
            return None;
        }
        let outcome = match self.pending.take() {
            Some(bubble) if !bubble.content.trim().is_empty() => {
                self.bubbles.push(bubble);
                TurnOutcome::Completed
            }
            _ => TurnOutcome::Errored(NO_RESPONSE_NOTICE.to_string()),
        };
        Some(self.end(outcome))
    }

    /// The request or the stream failed. The user's own bubble always stays;
    /// an empty placeholder is dropped.
    pub fn fail(&mut self, ticket: Ticket, message: &str) -> Option<TurnOutcome> {
        if !self.is_current(ticket) {
            return None;
        }
        self.settle_pending();
        let notice = if message == EMPTY_RESPONSE_MESSAGE {
            NO_RESPONSE_NOTICE.to_string()
        } else {
            message.to_string()
        };
        Some(self.end(TurnOutcome::Errored(notice)))
    }

    /// Abandons the running turn. Safe to call at any time; returns false
    /// when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        if self.phase.is_none() {
            return false;
        }
        self.settle_pending();
        self.end(TurnOutcome::Cancelled);
        true
    }

    /// Forgets everything, including the adopted conversation id.
    pub fn clear(&mut self) {
        self.cancel();
        self.bubbles.clear();
        self.conversation_id = None;
    }

    /// Cancels any turn and blocks new ones until [`Self::finish_reset`].
    /// Returns false when a reset is already pending.
    pub fn begin_reset(&mut self) -> bool {
        if self.resetting {
            return false;
        }
        self.cancel();
        self.resetting = true;
        true
    }

    /// The server answered the reset. The view is cleared only on success.
    pub fn finish_reset(&mut self, succeeded: bool) {
        self.resetting = false;
        if succeeded {
            self.clear();
        }
    }

    /// Replaces the view with a stored conversation.
    pub fn load(&mut self, conversation_id: String, history: &[Message]) {
        self.clear();
        for message in history {
            let role = match message.role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                _ => continue,
            };
            let bubble = self.bubble(role, message.content.clone());
            self.bubbles.push(bubble);
        }
        self.conversation_id = Some(conversation_id);
    }

    /// Keeps a partial reply that has text, drops an empty placeholder.
    fn settle_pending(&mut self) {
        if let Some(bubble) = self.pending.take() {
            if !bubble.content.trim().is_empty() {
                self.bubbles.push(bubble);
            }
        }
    }

    fn end(&mut self, outcome: TurnOutcome) -> TurnOutcome {
        self.phase = None;
        outcome
    }

    fn bubble(&mut self, role: Role, content: String) -> Bubble {
        Bubble { id: self.alloc_id(), role, content }
    }

    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(value: &str) -> StreamEvent {
        StreamEvent::Token { value: value.to_string() }
    }

    fn streaming(session: &mut ChatSession, text: &str) -> Ticket {
        let ticket = session.begin(text).unwrap();
        assert!(session.stream_opened(ticket));
        ticket
    }

    #[test]
    fn test_completed_turn() {
        let mut session = ChatSession::new();
        let ticket = session.begin("hello").unwrap();
        assert_eq!(session.phase(), TurnPhase::Sending);
        assert_eq!(session.bubbles()[0].role, Role::User);

        assert!(session.stream_opened(ticket));
        assert_eq!(session.phase(), TurnPhase::Streaming);
        assert_eq!(session.pending_text(), Some(""));

        let conversation = StreamEvent::Conversation { conversation_id: "c1".to_string() };
        assert_eq!(session.apply(ticket, conversation), Applied::Continue);
        assert_eq!(session.apply(ticket, token("Hi")), Applied::Continue);
        assert_eq!(session.apply(ticket, token(" you")), Applied::Continue);
        assert_eq!(session.apply(ticket, StreamEvent::Done), Applied::Continue);
        assert_eq!(session.pending_text(), Some("Hi you"));

        assert_eq!(session.finish(ticket), Some(TurnOutcome::Completed));
        assert_eq!(session.phase(), TurnPhase::Idle);
        assert_eq!(session.conversation_id(), Some("c1"));
        let contents: Vec<&str> = session.bubbles().iter().map(|b| b.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "Hi you"]);
    }

    #[test]
    fn test_only_one_turn_at_a_time() {
        let mut session = ChatSession::new();
        assert!(session.begin("   ").is_none());
        session.begin("first").unwrap();
        assert!(session.begin("second").is_none());
        assert_eq!(session.bubbles().len(), 1);
    }

    #[test]
    fn test_blank_reply_removes_placeholder() {
        let mut session = ChatSession::new();
        let ticket = streaming(&mut session, "anyone?");
        session.apply(ticket, token("  "));
        assert_eq!(
            session.finish(ticket),
            Some(TurnOutcome::Errored(NO_RESPONSE_NOTICE.to_string()))
        );
        assert_eq!(session.bubbles().len(), 1);
        assert_eq!(session.pending_text(), None);
    }

    #[test]
    fn test_empty_response_error_event() {
        let mut session = ChatSession::new();
        let ticket = streaming(&mut session, "anyone?");
        let applied = session.apply(ticket, StreamEvent::Error { message: EMPTY_RESPONSE_MESSAGE.to_string() });
        let Applied::Failed(message) = applied else {
            panic!("error events must fail the turn");
        };
        assert_eq!(
            session.fail(ticket, &message),
            Some(TurnOutcome::Errored(NO_RESPONSE_NOTICE.to_string()))
        );
        assert_eq!(session.bubbles().len(), 1);
        assert_eq!(session.bubbles()[0].role, Role::User);
    }

    #[test]
    fn test_request_failure_keeps_user_bubble() {
        let mut session = ChatSession::new();
        let ticket = session.begin("hi").unwrap();
        assert_eq!(
            session.fail(ticket, "Conversation not found"),
            Some(TurnOutcome::Errored("Conversation not found".to_string()))
        );
        assert_eq!(session.bubbles().len(), 1);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_cancel_is_idempotent_and_ignores_late_events() {
        let mut session = ChatSession::new();
        let ticket = streaming(&mut session, "long answer please");
        session.apply(ticket, token("Part"));

        assert!(session.cancel());
        assert!(!session.cancel());
        assert_eq!(session.phase(), TurnPhase::Idle);

        assert_eq!(session.apply(ticket, token("late")), Applied::Stale);
        assert_eq!(session.finish(ticket), None);
        assert_eq!(session.fail(ticket, "aborted"), None);
        let contents: Vec<&str> = session.bubbles().iter().map(|b| b.content.as_str()).collect();
        assert_eq!(contents, vec!["long answer please", "Part"]);

        // next turn can start immediately
        assert!(session.begin("again").is_some());
    }

    #[test]
    fn test_cancel_before_first_token_drops_placeholder() {
        let mut session = ChatSession::new();
        let ticket = streaming(&mut session, "hi");
        session.cancel();
        assert_eq!(session.bubbles().len(), 1);
        assert!(!session.stream_opened(ticket));
    }

    #[test]
    fn test_clear_forgets_conversation() {
        let mut session = ChatSession::new();
        let ticket = streaming(&mut session, "hi");
        session.apply(ticket, StreamEvent::Conversation { conversation_id: "c1".to_string() });
        session.clear();
        assert!(session.bubbles().is_empty());
        assert_eq!(session.conversation_id(), None);
        assert_eq!(session.apply(ticket, token("late")), Applied::Stale);
    }

    #[test]
    fn test_no_turn_starts_while_a_reset_is_pending() {
        let mut session = ChatSession::new();
        let ticket = streaming(&mut session, "hi");
        session.apply(ticket, StreamEvent::Conversation { conversation_id: "c1".to_string() });

        assert!(session.begin_reset());
        assert!(!session.begin_reset());
        assert_eq!(session.apply(ticket, token("late")), Applied::Stale);
        assert!(session.is_busy());
        assert!(session.begin("typed during reset").is_none());
        assert_eq!(session.bubbles().len(), 1);

        session.finish_reset(true);
        assert!(session.bubbles().is_empty());
        assert_eq!(session.conversation_id(), None);
        assert!(session.begin("fresh start").is_some());
    }

    #[test]
    fn test_failed_reset_keeps_the_view() {
        let mut session = ChatSession::new();
        let ticket = streaming(&mut session, "hi");
        session.apply(ticket, StreamEvent::Conversation { conversation_id: "c1".to_string() });
        session.apply(ticket, token("answer"));
        session.finish(ticket);

        assert!(session.begin_reset());
        session.finish_reset(false);
        assert!(!session.is_resetting());
        assert_eq!(session.bubbles().len(), 2);
        assert_eq!(session.conversation_id(), Some("c1"));
        assert!(session.begin("again").is_some());
    }

    #[test]
    fn test_load_history() {
        let mut session = ChatSession::new();
        let message = |role: &str, content: &str| Message {
            id: content.to_string(),
            conversation_id: "c9".to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: String::new(),
        };
        session.load(
            "c9".to_string(),
            &[message("user", "q"), message("system", "hidden"), message("assistant", "a")],
        );
        let roles: Vec<Role> = session.bubbles().iter().map(|b| b.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(session.conversation_id(), Some("c9"));
    }
}
