use crate::models::{Identity, Message, MessageRole};

use super::UpstreamMessage;

const ROLE_INSTRUCTIONS: &str = "You are the back-office assistant of a creative agency. \
                                 You help the team with clients, projects and tasks. \
                                 Be concise, accurate, and friendly.";

const DATA_POLICY: &str = "Only use the data supplied below or earlier in this conversation. \
                           Never invent projects, tasks, clients, people, dates or figures. \
                           If the data you need is not supplied, say that you do not have it.";

/// Builds the system message: role instructions, the data policy, the
/// caller's email when known, then the context block verbatim.
pub fn system_prompt(identity: &Identity, context_block: &str) -> String {
    let mut prompt = format!("{ROLE_INSTRUCTIONS}\n{DATA_POLICY}");
    if let Some(email) = identity.email.as_deref().filter(|e| !e.trim().is_empty()) {
        prompt.push_str(&format!("\nYou are assisting {email}."));
    }
    if !context_block.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(context_block);
    }
    prompt
}

/// The system message followed by the history in stored order.
///
/// Stored system messages are dropped; the only system message sent is the
/// freshly built one.
pub fn compose_messages(system: String, history: &[Message]) -> Vec<UpstreamMessage> {
    std::iter::once(UpstreamMessage { role: MessageRole::System, content: system })
        .chain(
            history
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .map(|m| UpstreamMessage { role: m.role, content: m.content.clone() }),
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: Option<&str>) -> Identity {
        Identity { user_id: "u1".to_string(), email: email.map(str::to_string) }
    }

    #[test]
    fn test_prompt_always_carries_data_policy() {
        let prompt = system_prompt(&identity(None), "");
        assert!(prompt.contains("Never invent"));
        assert!(!prompt.contains("You are assisting"));
        assert!(!prompt.ends_with('\n'));
    }

    #[test]
    fn test_prompt_names_caller_and_appends_context() {
        let prompt = system_prompt(&identity(Some("ana@agency.test")), "Projects:\n1. Atlas");
        assert!(prompt.contains("You are assisting ana@agency.test."));
        assert!(prompt.ends_with("\n\nProjects:\n1. Atlas"));
    }

    #[test]
    fn test_history_is_replayed_in_order_after_system() {
        let history = vec![
            Message::new("c1".into(), MessageRole::User, "one".into()),
            Message::new("c1".into(), MessageRole::System, "stale".into()),
            Message::new("c1".into(), MessageRole::Assistant, "two".into()),
            Message::new("c1".into(), MessageRole::User, "three".into()),
        ];
        let messages = compose_messages("sys".to_string(), &history);
        let pairs: Vec<(MessageRole, &str)> =
            messages.iter().map(|m| (m.role, m.content.as_str())).collect();
        assert_eq!(
            pairs,
            vec![
                (MessageRole::System, "sys"),
                (MessageRole::User, "one"),
                (MessageRole::Assistant, "two"),
                (MessageRole::User, "three"),
            ]
        );
    }
}
