use leptos::ev;
use leptos::prelude::*;

use crate::state::AppState;
use crate::turn::{Role, TurnPhase};

/// Main chat area with message history, the streaming reply and input.
#[component]
pub fn ChatArea() -> impl IntoView {
    let state = expect_context::<AppState>();

    view! {
        <main class="chat-area">
            // Transient notice
            {move || {
                state.notice.get().map(|(_, message)| {
                    view! {
                        <div class="error-banner" role="alert">{message}</div>
                    }
                })
            }}

            // Chat header
            <div class="chat-header">
                <span>
                    {move || {
                        state.session.with(|s| match s.conversation_id() {
                            Some(id) => format!("Conversation: {}", &id[..8.min(id.len())]),
                            None => "New conversation".to_string(),
                        })
                    }}
                </span>
                <button
                    class="reset-btn"
                    on:click=move |_| state.reset_conversation()
                    disabled=move || state.session.with(|s| s.bubbles().is_empty() && !s.is_busy())
                >
                    "Reset"
                </button>
            </div>

            // Messages
            <div class="messages-container">
                {move || {
                    let empty = state.session.with(|s| s.bubbles().is_empty() && s.pending_text().is_none());
                    if empty {
                        view! {
                            <div class="empty-state">
                                "Ask about projects, tasks or clients"
                            </div>
                        }.into_any()
                    } else {
                        view! {
                            <For
                                each=move || state.session.with(|s| s.bubbles().to_vec())
                                key=|b| b.id
                                let:bubble
                            >
                                <MessageBubble role=bubble.role content=bubble.content.clone() />
                            </For>
                            // Reply being streamed
                            {move || {
                                state.session.with(|s| s.pending_text().map(str::to_string)).map(|text| {
                                    view! {
                                        <div class="message assistant">
                                            <div class="role-label">"assistant"</div>
                                            <div class="streaming-cursor">{text}</div>
                                        </div>
                                    }
                                })
                            }}
                        }.into_any()
                    }
                }}
            </div>

            <ChatInput />
        </main>
    }
}

/// A single chat message bubble.
#[component]
fn MessageBubble(role: Role, content: String) -> impl IntoView {
    let css_class = match role {
        Role::User => "message user",
        Role::Assistant => "message assistant",
    };

    view! {
        <div class=css_class>
            <div class="role-label">{role.as_str()}</div>
            <div>{content}</div>
        </div>
    }
}

/// Chat input with send and stop buttons.
#[component]
fn ChatInput() -> impl IntoView {
    let state = expect_context::<AppState>();
    let (input, set_input) = signal(String::new());

    let phase = move || state.session.with(|s| s.phase());
    let is_busy = move || state.session.with(|s| s.is_busy());
    let is_resetting = move || state.session.with(|s| s.is_resetting());

    let send = move || {
        let text = input.get_untracked().trim().to_string();
        if text.is_empty() || is_busy() {
            return;
        }
        set_input.set(String::new());
        state.send_message(text);
    };

    let on_keydown = move |ev: ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            send();
        }
    };

    view! {
        <div class="input-area">
            <div class="input-row">
                <textarea
                    rows="1"
                    placeholder="Type a message… (Enter to send, Shift+Enter for newline)"
                    prop:value=input
                    on:input=move |ev| {
                        set_input.set(event_target_value(&ev));
                    }
                    on:keydown=on_keydown
                    disabled=is_busy
                />
                <Show
                    when=is_busy
                    fallback=move || view! {
                        <button
                            class="send-btn"
                            on:click=move |_| send()
                            disabled=move || input.get().trim().is_empty()
                        >
                            "Send"
                        </button>
                    }
                >
                    <button class="stop-btn" on:click=move |_| state.stop() disabled=is_resetting>
                        {move || {
                            if is_resetting() {
                                "Resetting…"
                            } else if phase() == TurnPhase::Sending {
                                "Sending…"
                            } else {
                                "Stop"
                            }
                        }}
                    </button>
                </Show>
            </div>
        </div>
    }
}
