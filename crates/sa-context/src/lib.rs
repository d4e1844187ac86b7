//! Context Builder: assembles the two artifacts a Streaming LLM Session
//! needs for one provider call — the system prompt (skills header + base
//! prompt, budget-truncated) and the provider-shaped message/tool payloads.
//!
//! The truncate-to-budget-plus-suffix technique follows
//! `crates/contextpack/src/truncation.rs`'s char-budget approach, generalized
//! to the single fixed `"..."` suffix called for here rather than
//! contextpack's `[TRUNCATED]` markers.

use sa_domain::part::Part;
use sa_domain::session::{Message, MessageRole};
use sa_tools::ToolRegistry;
use serde_json::{json, Value};

const SKILLS_HEADER: &str = "You have access to the following skills:";
const DEFAULT_PROMPT: &str = "You are a helpful assistant.";
const TRUNCATION_SUFFIX: &str = "...";

/// A skill available to be woven into the system prompt. Skill discovery
/// and file-system layout are a collaborator concern — this
/// carries only the name/description/body text the prompt composition
/// needs.
#[derive(Debug, Clone)]
pub struct SkillDoc {
    pub name: String,
    pub description: String,
    pub content: String,
}

/// Build the system prompt for one invocation.
///
/// `requested_skills` names skills in the order they should appear; any name
/// absent from `available` is silently skipped. `max_char_budget` of `None`
/// disables truncation.
pub fn build_system_prompt(
    base_prompt: &str,
    requested_skills: &[String],
    available: &[SkillDoc],
    max_char_budget: Option<usize>,
) -> String {
    let base = if base_prompt.is_empty() { DEFAULT_PROMPT } else { base_prompt };

    let prompt = if requested_skills.is_empty() {
        base.to_string()
    } else {
        let mut out = String::new();
        out.push_str(SKILLS_HEADER);
        out.push('\n');
        for name in requested_skills {
            if let Some(skill) = available.iter().find(|s| &s.name == name) {
                out.push_str(&format!("- {}: {}\n", skill.name, skill.description));
                out.push_str(&format!("  content: {}\n", skill.content));
            }
        }
        out.push('\n');
        out.push_str(base);
        out
    };

    match max_char_budget {
        Some(budget) if prompt.chars().count() > budget => {
            let keep_chars = budget.saturating_sub(TRUNCATION_SUFFIX.chars().count());
            let boundary = prompt.char_indices().nth(keep_chars).map(|(i, _)| i).unwrap_or(prompt.len());
            format!("{}{}", &prompt[..boundary], TRUNCATION_SUFFIX)
        }
        _ => prompt,
    }
}

/// One provider-shaped chat message: `{role, content}`.
pub fn message_content(message: &Message) -> String {
    if message.parts.is_empty() {
        message.text.clone()
    } else {
        message.parts.iter().filter_map(Part::text_contribution).collect()
    }
}

fn role_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
    }
}

/// Translate a message history plus system prompt into provider payload
/// shape. When `supports_system_field` is true the system prompt is
/// returned separately (callers place it in the provider's top-level
/// `system` field); otherwise it is prepended as a `{role: system}` message.
pub fn build_provider_messages(history: &[Message], system_prompt: &str, supports_system_field: bool) -> (Vec<Value>, Option<String>) {
    let mut messages: Vec<Value> = Vec::with_capacity(history.len() + 1);

    if !supports_system_field {
        messages.push(json!({"role": "system", "content": system_prompt}));
    }

    for message in history {
        messages.push(json!({
            "role": role_str(message.role),
            "content": message_content(message),
        }));
    }

    let system_field = if supports_system_field { Some(system_prompt.to_string()) } else { None };
    (messages, system_field)
}

/// Emit `{type: "function", function: {name, description, parameters}}`
/// tool schemas in the registry's deterministic (sorted id) iteration order.
pub fn build_tool_schemas(registry: &ToolRegistry) -> Vec<Value> {
    registry
        .definitions()
        .into_iter()
        .map(|def| {
            json!({
                "type": "function",
                "function": {
                    "name": def.name,
                    "description": def.description,
                    "parameters": def.parameters,
                },
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sa_domain::part::TextPart;

    fn skill(name: &str) -> SkillDoc {
        SkillDoc {
            name: name.to_string(),
            description: format!("{name} description"),
            content: format!("{name} content"),
        }
    }

    #[test]
    fn no_skills_returns_base_prompt() {
        let prompt = build_system_prompt("Be terse.", &[], &[], None);
        assert_eq!(prompt, "Be terse.");
    }

    #[test]
    fn empty_base_prompt_falls_back_to_default() {
        let prompt = build_system_prompt("", &[], &[], None);
        assert_eq!(prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn skills_are_rendered_in_requested_order_with_content_lines() {
        let available = vec![skill("alpha"), skill("beta")];
        let prompt = build_system_prompt("Base.", &["beta".to_string(), "alpha".to_string()], &available, None);
        let expected = "You have access to the following skills:\n\
- beta: beta description\n  content: beta content\n\
- alpha: alpha description\n  content: alpha content\n\n\
Base.";
        assert_eq!(prompt, expected);
    }

    #[test]
    fn missing_skill_names_are_silently_skipped() {
        let available = vec![skill("alpha")];
        let prompt = build_system_prompt("Base.", &["alpha".to_string(), "ghost".to_string()], &available, None);
        assert!(prompt.contains("alpha"));
        assert!(!prompt.contains("ghost"));
    }

    #[test]
    fn over_budget_prompt_is_truncated_with_suffix() {
        let prompt = build_system_prompt(&"x".repeat(100), &[], &[], Some(10));
        assert_eq!(prompt.chars().count(), 10);
        assert!(prompt.ends_with("..."));
    }

    #[test]
    fn under_budget_prompt_is_untouched() {
        let prompt = build_system_prompt("short", &[], &[], Some(1000));
        assert_eq!(prompt, "short");
    }

    #[test]
    fn assistant_content_concatenates_text_parts_only() {
        let mut message = Message::user("m1", "s1", "ignored");
        message.role = MessageRole::Assistant;
        message.parts = vec![
            Part::Text(TextPart {
                id: "p1".into(),
                session_id: "s1".into(),
                message_id: "m1".into(),
                text: "Hello ".into(),
                time_created: Utc::now(),
                time_updated: None,
            }),
            Part::Text(TextPart {
                id: "p2".into(),
                session_id: "s1".into(),
                message_id: "m1".into(),
                text: "world.".into(),
                time_created: Utc::now(),
                time_updated: None,
            }),
        ];
        assert_eq!(message_content(&message), "Hello world.");
    }

    #[test]
    fn system_field_unsupported_prepends_system_message() {
        let history = vec![Message::user("m1", "s1", "hi")];
        let (messages, system_field) = build_provider_messages(&history, "You are helpful.", false);
        assert!(system_field.is_none());
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
    }

    #[test]
    fn system_field_supported_is_returned_separately() {
        let history = vec![Message::user("m1", "s1", "hi")];
        let (messages, system_field) = build_provider_messages(&history, "You are helpful.", true);
        assert_eq!(system_field.as_deref(), Some("You are helpful."));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }
}
