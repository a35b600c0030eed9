mod api;
mod components;
mod models;
mod state;
mod stream;
mod turn;

use leptos::mount::mount_to_body;
use leptos::prelude::*;

use components::chat::ChatArea;
use components::sidebar::Sidebar;
use state::AppState;

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let state = AppState::provide();

    // Load conversations on mount
    state.load_conversations();

    // Tearing the app down aborts any in-flight stream
    on_cleanup(move || state.stop());

    view! {
        <div class="app-container">
            <Sidebar />
            <ChatArea />
        </div>
    }
}

fn main() {
    let _ = console_log::init_with_level(log::Level::Debug);
    mount_to_body(App);
}
