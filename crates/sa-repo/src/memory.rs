//! In-memory reference implementations of the repository contracts.
//! Suitable for tests and for single-process embeddings with no durability
//! requirement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sa_domain::error::Result;
use sa_domain::part::{Part, ToolState};
use sa_domain::session::{Message, Session};

use crate::traits::{MemoryRecord, MemoryRepository, MessageRepository, PartRepository, SessionRepository, ToolExecutionRecord, ToolExecutionRepository};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    async fn create(&self, session: &Session) -> Result<()> {
        self.sessions.write().insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn update(&self, session: &Session) -> Result<()> {
        self.sessions.write().insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        self.sessions.write().remove(session_id);
        Ok(())
    }
}

/// Messages kept per session in append order — `truncate_after` relies on
/// that order, not on any id comparison, since message ids are opaque
/// `<session_id>_<counter>` strings rather than a sortable type.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    by_session: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn get(&self, session_id: &str, message_id: &str) -> Result<Option<Message>> {
        Ok(self
            .by_session
            .read()
            .get(session_id)
            .and_then(|messages| messages.iter().find(|m| m.id == message_id).cloned()))
    }

    async fn create(&self, message: &Message) -> Result<()> {
        self.by_session
            .write()
            .entry(message.session_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Message>> {
        Ok(self.by_session.read().get(session_id).cloned().unwrap_or_default())
    }

    async fn truncate_after(&self, session_id: &str, after_message_id: &str) -> Result<()> {
        let mut by_session = self.by_session.write();
        if let Some(messages) = by_session.get_mut(session_id) {
            if let Some(pos) = messages.iter().position(|m| m.id == after_message_id) {
                messages.truncate(pos + 1);
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryPartRepository {
    by_message: RwLock<HashMap<String, Vec<Part>>>,
}

impl InMemoryPartRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PartRepository for InMemoryPartRepository {
    async fn create(&self, message_id: &str, part: &Part) -> Result<()> {
        self.by_message
            .write()
            .entry(message_id.to_string())
            .or_default()
            .push(part.clone());
        Ok(())
    }

    async fn list_by_message(&self, message_id: &str) -> Result<Vec<Part>> {
        Ok(self.by_message.read().get(message_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryMemoryRepository {
    by_session: RwLock<HashMap<String, Vec<MemoryRecord>>>,
}

impl InMemoryMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryRepository for InMemoryMemoryRepository {
    async fn get(&self, session_id: &str, memory_id: &str) -> Result<Option<MemoryRecord>> {
        Ok(self
            .by_session
            .read()
            .get(session_id)
            .and_then(|records| records.iter().find(|r| r.id == memory_id).cloned()))
    }

    async fn create(&self, record: &MemoryRecord) -> Result<()> {
        self.by_session
            .write()
            .entry(record.session_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list_by_session(&self, session_id: &str) -> Result<Vec<MemoryRecord>> {
        Ok(self.by_session.read().get(session_id).cloned().unwrap_or_default())
    }
}

/// Keyed by `execution_id` alone (not `(session_id, execution_id)`) — mirrors
/// `tool_execution_tracker.py`'s cross-session lookup by execution id only.
#[derive(Default)]
pub struct InMemoryToolExecutionRepository {
    records: RwLock<HashMap<String, ToolExecutionRecord>>,
}

impl InMemoryToolExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ToolExecutionRepository for InMemoryToolExecutionRepository {
    async fn log(&self, record: &ToolExecutionRecord) -> Result<()> {
        self.records.write().insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_state(&self, execution_id: &str, state: &ToolState) -> Result<Option<ToolExecutionRecord>> {
        let mut records = self.records.write();
        match records.get_mut(execution_id) {
            Some(record) => {
                record.state = state.clone();
                record.updated_at = Some(Utc::now());
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn get(&self, execution_id: &str) -> Result<Option<ToolExecutionRecord>> {
        Ok(self.records.read().get(execution_id).cloned())
    }

    async fn history(&self, session_id: &str, tool_id: Option<&str>, limit: Option<usize>) -> Result<Vec<ToolExecutionRecord>> {
        let records = self.records.read();
        let mut matched: Vec<ToolExecutionRecord> = records
            .values()
            .filter(|r| r.session_id == session_id)
            .filter(|r| tool_id.map(|t| r.tool_id == t).unwrap_or(true))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.logged_at.cmp(&a.logged_at));
        if let Some(limit) = limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

/// Adapts an [`ToolExecutionRepository`] to the [`sa_tools::ToolExecutionTracker`]
/// contract the Tool Execution Manager consumes.
pub struct RepoBackedTracker<R: ToolExecutionRepository> {
    repo: R,
}

impl<R: ToolExecutionRepository> RepoBackedTracker<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: ToolExecutionRepository> sa_tools::ToolExecutionTracker for RepoBackedTracker<R> {
    async fn log_execution(&self, execution_id: &str, session_id: &str, message_id: &str, tool_id: &str, state: &ToolState) {
        let record = ToolExecutionRecord {
            id: execution_id.to_string(),
            session_id: session_id.to_string(),
            message_id: message_id.to_string(),
            tool_id: tool_id.to_string(),
            state: state.clone(),
            logged_at: Utc::now(),
            updated_at: None,
        };
        if let Err(err) = self.repo.log(&record).await {
            tracing::warn!(%execution_id, %err, "failed to log tool execution");
        }
    }

    async fn update_execution(&self, execution_id: &str, state: &ToolState) {
        match self.repo.update_state(execution_id, state).await {
            Ok(None) => tracing::warn!(%execution_id, "update_execution: no matching record"),
            Err(err) => tracing::warn!(%execution_id, %err, "failed to update tool execution"),
            Ok(Some(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_roundtrip() {
        let repo = InMemorySessionRepository::new();
        let session = Session {
            id: "s1".into(),
            slug: "s1".into(),
            project_id: "p".into(),
            directory: "/tmp".into(),
            title: "t".into(),
            message_counter: 0,
            created: Utc::now(),
            updated: Utc::now(),
        };
        assert!(repo.get("s1").await.unwrap().is_none());
        repo.create(&session).await.unwrap();
        assert_eq!(repo.get("s1").await.unwrap().unwrap().id, "s1");
    }

    #[tokio::test]
    async fn message_truncate_after_drops_trailing_messages() {
        let repo = InMemoryMessageRepository::new();
        for i in 0..4 {
            repo.create(&Message::user(format!("s1_{i}"), "s1", "hi")).await.unwrap();
        }
        repo.truncate_after("s1", "s1_1").await.unwrap();
        let remaining = repo.list_by_session("s1").await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining.last().unwrap().id, "s1_1");
    }

    #[tokio::test]
    async fn tracker_logs_and_updates_round_trip_to_final_state() {
        let tracker = RepoBackedTracker::new(InMemoryToolExecutionRepository::new());
        let pending = ToolState::pending(serde_json::json!({"a": 1}));
        sa_tools::ToolExecutionTracker::log_execution(&tracker, "call1", "s1", "m1", "exec", &pending).await;

        let mut completed = pending.clone();
        completed.status = sa_domain::part::ToolStatus::Completed;
        completed.output = Some("done".into());
        sa_tools::ToolExecutionTracker::update_execution(&tracker, "call1", &completed).await;

        let record = tracker.repo.get("call1").await.unwrap().unwrap();
        assert_eq!(record.state.status, sa_domain::part::ToolStatus::Completed);
        assert_eq!(record.state.output.as_deref(), Some("done"));
    }
}
