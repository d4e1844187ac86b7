use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::part::Part;

/// Lifecycle status of an [`AgentTask`].
///
/// Invariant: monotonic across `Pending -> Running -> {Completed, Failed,
/// Cancelled}`. No backward edges, no skipping `Running` from `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn is_complete(self) -> bool {
        !self.is_active()
    }
}

/// A unit of orchestrated work: one agent invocation tracked by the
/// Orchestrator's task table, with optional hierarchical parentage for
/// delegation subtrees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: String,
    pub agent_name: String,
    pub description: String,
    #[serde(default)]
    pub tool_ids: Vec<String>,
    #[serde(default)]
    pub skill_names: Vec<String>,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

impl AgentTask {
    pub fn new(
        task_id: impl Into<String>,
        agent_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_name: agent_name.into(),
            description: description.into(),
            tool_ids: Vec::new(),
            skill_names: Vec::new(),
            options: serde_json::Map::new(),
            parent_id: None,
            status: TaskStatus::Pending,
            result_id: None,
            result_agent_name: None,
            error: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// Token accounting for one agent invocation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u32,
    #[serde(default)]
    pub output: u32,
    #[serde(default)]
    pub reasoning: u32,
    #[serde(default)]
    pub cache_read: u32,
    #[serde(default)]
    pub cache_write: u32,
}

/// Outcome of one `execute_agent` call. Always returned, never an error —
/// the Agent Runtime folds failures into `error` rather than propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    pub response: String,
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<TokenUsage>,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

impl AgentResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Couples an [`AgentTask`] with its [`AgentResult`] (or error) and
/// execution timestamps, as stored in the Orchestrator's results table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: AgentTask,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AgentResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_running_are_active() {
        assert!(TaskStatus::Pending.is_active());
        assert!(TaskStatus::Running.is_active());
        assert!(!TaskStatus::Completed.is_active());
        assert!(!TaskStatus::Failed.is_active());
        assert!(!TaskStatus::Cancelled.is_active());
    }

    #[test]
    fn new_task_starts_pending() {
        let task = AgentTask::new("t1", "reviewer", "check the diff");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.is_active());
    }

    #[test]
    fn result_without_error_is_success() {
        let result = AgentResult {
            agent_name: "reviewer".into(),
            response: "looks good".into(),
            parts: Vec::new(),
            metadata: serde_json::Map::new(),
            tools_used: Vec::new(),
            tokens_used: None,
            duration: 1.5,
            error: None,
            task_id: None,
        };
        assert!(result.is_success());
    }
}
