use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a tool call within a [`ToolState`] machine.
///
/// Transition graph: `Pending -> Running -> (Completed | Error)`;
/// `Pending -> Error` is permitted for early cancellation. No backward edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolStatus::Completed | ToolStatus::Error)
    }
}

/// State carried by a [`Part::Tool`] across its execution lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolState {
    pub status: ToolStatus,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_compacted: Option<DateTime<Utc>>,
}

impl ToolState {
    pub fn pending(input: Value) -> Self {
        Self {
            status: ToolStatus::Pending,
            input,
            output: None,
            title: None,
            metadata: serde_json::Map::new(),
            error: None,
            time_start: None,
            time_end: None,
            time_compacted: None,
        }
    }
}

/// One semantic unit of a message. A sealed sum type — every kind named in
/// the data model gets its own variant, tagged on the wire by `part_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "part_type")]
pub enum Part {
    Text(TextPart),
    Tool(ToolPart),
    Reasoning(ReasoningPart),
    Snapshot(SnapshotPart),
    Patch(PatchPart),
    Agent(AgentPart),
    Compaction(CompactionPart),
    File(FilePart),
    Subtask(SubtaskPart),
    Retry(RetryPart),
}

impl Part {
    pub fn id(&self) -> &str {
        match self {
            Part::Text(p) => &p.id,
            Part::Tool(p) => &p.id,
            Part::Reasoning(p) => &p.id,
            Part::Snapshot(p) => &p.id,
            Part::Patch(p) => &p.id,
            Part::Agent(p) => &p.id,
            Part::Compaction(p) => &p.id,
            Part::File(p) => &p.id,
            Part::Subtask(p) => &p.id,
            Part::Retry(p) => &p.id,
        }
    }

    pub fn set_message_id(&mut self, message_id: impl Into<String>) {
        let message_id = message_id.into();
        match self {
            Part::Text(p) => p.message_id = message_id,
            Part::Tool(p) => p.message_id = message_id,
            Part::Reasoning(p) => p.message_id = message_id,
            Part::Snapshot(p) => p.message_id = message_id,
            Part::Patch(p) => p.message_id = message_id,
            Part::Agent(p) => p.message_id = message_id,
            Part::Compaction(p) => p.message_id = message_id,
            Part::File(p) => p.message_id = message_id,
            Part::Subtask(p) => p.message_id = message_id,
            Part::Retry(p) => p.message_id = message_id,
        }
    }

    /// The text content of a part for the purpose of assembling
    /// `Message.text` — only `TextPart`s contribute.
    pub fn text_contribution(&self) -> Option<&str> {
        match self {
            Part::Text(p) => Some(p.text.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub text: String,
    pub time_created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub tool: String,
    pub call_id: String,
    pub state: ToolState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ToolSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSource {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub snapshot_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub files: Vec<String>,
    pub diff: String,
}

/// A soft delimiter between tool cycles, naming the provider that produced
/// the preceding stretch of parts (see §4.5's `finish` handling).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub summary: String,
    pub messages_compacted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub filename: String,
    pub mime_type: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub task_id: String,
    pub agent_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPart {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub attempt: u32,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_text_parts_contribute_to_message_text() {
        let parts = vec![
            Part::Text(TextPart {
                id: "p1".into(),
                session_id: "s1".into(),
                message_id: "m1".into(),
                text: "Hi ".into(),
                time_created: Utc::now(),
                time_updated: None,
            }),
            Part::Tool(ToolPart {
                id: "p2".into(),
                session_id: "s1".into(),
                message_id: "m1".into(),
                tool: "bash".into(),
                call_id: "c1".into(),
                state: ToolState::pending(serde_json::json!({})),
                source: None,
            }),
            Part::Text(TextPart {
                id: "p3".into(),
                session_id: "s1".into(),
                message_id: "m1".into(),
                text: "there.".into(),
                time_created: Utc::now(),
                time_updated: None,
            }),
        ];
        let text: String = parts.iter().filter_map(Part::text_contribution).collect();
        assert_eq!(text, "Hi there.");
    }

    #[test]
    fn tool_status_terminal() {
        assert!(!ToolStatus::Pending.is_terminal());
        assert!(!ToolStatus::Running.is_terminal());
        assert!(ToolStatus::Completed.is_terminal());
        assert!(ToolStatus::Error.is_terminal());
    }
}
