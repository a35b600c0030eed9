//! Keyword-triggered injection of live directory records into the system
//! prompt. Best effort: a failed fetch becomes a note in the prompt text.

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::db::DirectoryStore;
use crate::errors::AppError;
use crate::models::{ClientRecord, ProjectRecord, TaskRecord};

/// Words that signal the user wants a listing.
pub const LISTING_INTENTS: [&str; 4] = ["list", "show", "all", "current"];

pub const CONTEXT_HEADER: &str = "Live agency data (quote it literally, do not extend it):";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    Projects,
    Tasks,
    Clients,
}

impl ContextSource {
    pub fn label(&self) -> &'static str {
        match self {
            ContextSource::Projects => "projects",
            ContextSource::Tasks => "tasks",
            ContextSource::Clients => "clients",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ContextSource::Projects => "Projects",
            ContextSource::Tasks => "Tasks",
            ContextSource::Clients => "Clients",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ContextRule {
    pub source: ContextSource,
    pub nouns: &'static [&'static str],
    pub limit: i64,
}

/// Everything the assistant can be handed, in rendering order.
pub static CONTEXT_RULES: [ContextRule; 3] = [
    ContextRule { source: ContextSource::Projects, nouns: &["project"], limit: 50 },
    ContextRule { source: ContextSource::Tasks, nouns: &["task"], limit: 20 },
    ContextRule { source: ContextSource::Clients, nouns: &["client"], limit: 50 },
];

impl ContextRule {
    /// Substring match on the lowercased message: any listing intent plus
    /// any of the rule's nouns.
    pub fn matches(&self, lowered: &str) -> bool {
        LISTING_INTENTS.iter().any(|intent| lowered.contains(intent))
            && self.nouns.iter().any(|noun| lowered.contains(noun))
    }
}

pub fn triggered_rules(message: &str) -> Vec<&'static ContextRule> {
    let lowered = message.to_lowercase();
    CONTEXT_RULES.iter().filter(|rule| rule.matches(&lowered)).collect()
}

/// Fetches every triggered source concurrently and renders the block that is
/// appended to the system prompt. Returns an empty string when nothing fired.
pub async fn build_context(store: &dyn DirectoryStore, message: &str) -> String {
    let rules = triggered_rules(message);
    if rules.is_empty() {
        return String::new();
    }
    debug!(
        sources = ?rules.iter().map(|r| r.source.label()).collect::<Vec<_>>(),
        "Injecting directory context"
    );

    let sections = join_all(rules.iter().map(|rule| fetch_section(store, rule))).await;

    let mut block = String::from(CONTEXT_HEADER);
    for section in sections {
        block.push('\n');
        block.push_str(&section);
    }
    block
}

async fn fetch_section(store: &dyn DirectoryStore, rule: &ContextRule) -> String {
    let lines: Result<Vec<String>, AppError> = match rule.source {
        ContextSource::Projects => store
            .list_projects(rule.limit)
            .await
            .map(|rows| rows.iter().map(render_project).collect()),
        ContextSource::Tasks => store
            .list_tasks(rule.limit)
            .await
            .map(|rows| rows.iter().map(render_task).collect()),
        ContextSource::Clients => store
            .list_clients(rule.limit)
            .await
            .map(|rows| rows.iter().map(render_client).collect()),
    };

    match lines {
        Ok(lines) => render_section(rule.source, &lines),
        Err(e) => {
            warn!(source = rule.source.label(), "Context fetch failed: {e}");
            format!("Note: unable to fetch {}.", rule.source.label())
        }
    }
}

fn render_section(source: ContextSource, lines: &[String]) -> String {
    if lines.is_empty() {
        return format!("{}: none on record.", source.title());
    }
    let mut section = format!("{}:", source.title());
    for (i, line) in lines.iter().enumerate() {
        section.push_str(&format!("\n{}. {line}", i + 1));
    }
    section
}

fn with_fields(head: &str, fields: &[(&str, Option<String>)]) -> String {
    let mut line = head.to_string();
    for (name, value) in fields {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            line.push_str(&format!(" | {name}: {value}"));
        }
    }
    line
}

fn render_project(p: &ProjectRecord) -> String {
    with_fields(
        &p.name,
        &[
            ("status", p.status.clone()),
            ("client", p.client_name.clone()),
            ("due", p.due_date.map(|d| d.to_string())),
        ],
    )
}

fn render_task(t: &TaskRecord) -> String {
    with_fields(
        &t.title,
        &[
            ("status", t.status.clone()),
            ("priority", t.priority.clone()),
            ("project", t.project_name.clone()),
            ("due", t.due_date.map(|d| d.to_string())),
        ],
    )
}

fn render_client(c: &ClientRecord) -> String {
    with_fields(
        &c.name,
        &[
            ("company", c.company.clone()),
            ("email", c.email.clone()),
            ("status", c.status.clone()),
        ],
    )
}
