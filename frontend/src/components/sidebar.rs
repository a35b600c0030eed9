use leptos::prelude::*;

use crate::state::AppState;

/// Sidebar showing the caller's conversations and a "New Chat" button.
#[component]
pub fn Sidebar() -> impl IntoView {
    let state = expect_context::<AppState>();

    view! {
        <aside class="sidebar">
            <div class="sidebar-header">
                <h2>"Agency Assistant"</h2>
                <button class="new-chat-btn" on:click=move |_| state.new_conversation()>
                    "+ New Chat"
                </button>
            </div>
            <div class="conversation-list">
                {move || {
                    if state.conversations.with(Vec::is_empty) {
                        view! {
                            <div style="padding:1rem;color:var(--text-secondary);font-size:0.85rem">
                                "No conversations yet"
                            </div>
                        }.into_any()
                    } else {
                        view! {
                            <For
                                each=move || state.conversations.get()
                                key=|c| c.id.clone()
                                let:conv
                            >
                                {
                                    let id_click = conv.id.clone();
                                    let id_active = conv.id.clone();
                                    let title = if conv.title.trim().is_empty() {
                                        "Untitled chat".to_string()
                                    } else {
                                        conv.title.clone()
                                    };
                                    view! {
                                        <div
                                            class="conversation-item"
                                            class:active=move || {
                                                state.session.with(|s| s.conversation_id() == Some(id_active.as_str()))
                                            }
                                            on:click=move |_| {
                                                state.select_conversation(id_click.clone());
                                            }
                                        >
                                            {title}
                                        </div>
                                    }
                                }
                            </For>
                        }.into_any()
                    }
                }}
            </div>
        </aside>
    }
}
