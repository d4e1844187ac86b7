use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::part::Part;

/// The persistent conversation scope owning messages and parts.
///
/// Lifecycle: created once; mutated only by appending messages/parts and
/// bumping `message_counter`; destroyed by explicit deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub slug: String,
    pub project_id: String,
    pub directory: String,
    pub title: String,
    pub message_counter: u64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Session {
    /// Validates the non-empty invariant required before any agent may run
    /// against this session: `project_id`, `directory`, `title`.
    ///
    /// Returns the name of the first empty field, if any.
    pub fn first_empty_required_field(&self) -> Option<&'static str> {
        if self.project_id.is_empty() {
            return Some("project_id");
        }
        if self.directory.is_empty() {
            return Some("directory");
        }
        if self.title.is_empty() {
            return Some("title");
        }
        None
    }

    /// Allocates the next message id (`<session_id>_<counter>`) and bumps
    /// the counter. Does not persist — callers own the write.
    pub fn next_message_id(&mut self) -> String {
        let id = format!("{}_{}", self.id, self.message_counter);
        self.message_counter += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Metadata attached to a persisted [`Message`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<MessageTokens>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<MessagePath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MessageTokens {
    pub input: u32,
    pub output: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePath {
    pub root: String,
    pub cwd: String,
}

/// A persisted message belonging to exactly one session; its parts
/// reference it by `message_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub text: String,
    pub parts: Vec<Part>,
    pub metadata: MessageMetadata,
    pub time_created: DateTime<Utc>,
}

impl Message {
    pub fn user(id: impl Into<String>, session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_id: session_id.into(),
            role: MessageRole::User,
            text: text.into(),
            parts: Vec::new(),
            metadata: MessageMetadata::default(),
            time_created: Utc::now(),
        }
    }

    /// Recomputes `text` from `TextPart`s in part order — the Part Ordering
    /// invariant: concatenating `TextPart.text` in order equals `Message.text`.
    pub fn recompute_text_from_parts(&mut self) {
        self.text = self.parts.iter().filter_map(Part::text_contribution).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_validates_required_fields_in_order() {
        let s = Session {
            id: "s1".into(),
            slug: "s1".into(),
            project_id: String::new(),
            directory: "/tmp".into(),
            title: "t".into(),
            message_counter: 0,
            created: Utc::now(),
            updated: Utc::now(),
        };
        assert_eq!(s.first_empty_required_field(), Some("project_id"));
    }

    #[test]
    fn session_valid_when_all_fields_present() {
        let s = Session {
            id: "s1".into(),
            slug: "s1".into(),
            project_id: "p1".into(),
            directory: "/tmp".into(),
            title: "t".into(),
            message_counter: 0,
            created: Utc::now(),
            updated: Utc::now(),
        };
        assert_eq!(s.first_empty_required_field(), None);
    }

    #[test]
    fn next_message_id_increments_counter() {
        let mut s = Session {
            id: "sess".into(),
            slug: "sess".into(),
            project_id: "p".into(),
            directory: "/tmp".into(),
            title: "t".into(),
            message_counter: 0,
            created: Utc::now(),
            updated: Utc::now(),
        };
        assert_eq!(s.next_message_id(), "sess_0");
        assert_eq!(s.next_message_id(), "sess_1");
        assert_eq!(s.message_counter, 2);
    }
}
