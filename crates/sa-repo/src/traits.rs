//! Repository contracts consumed by the core. Concrete storage (files,
//! databases, network services) is a collaborator concern — the core only
//! ever sees these traits. Every lookup returns `Result<Option<T>>`: `Ok(None)`
//! means "not found", `Err` means the store itself failed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sa_domain::error::Result;
use sa_domain::part::Part;
use sa_domain::session::{Message, Session};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>>;
    async fn create(&self, session: &Session) -> Result<()>;
    async fn update(&self, session: &Session) -> Result<()>;
    async fn delete(&self, session_id: &str) -> Result<()>;
}

#[async_trait]
impl SessionRepository for Arc<dyn SessionRepository> {
    async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        (**self).get(session_id).await
    }
    async fn create(&self, session: &Session) -> Result<()> {
        (**self).create(session).await
    }
    async fn update(&self, session: &Session) -> Result<()> {
        (**self).update(session).await
    }
    async fn delete(&self, session_id: &str) -> Result<()> {
        (**self).delete(session_id).await
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn get(&self, session_id: &str, message_id: &str) -> Result<Option<Message>>;
    async fn create(&self, message: &Message) -> Result<()>;
    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Message>>;
    /// Remove every message with `message.id > after_message_id` (by
    /// insertion order) — the truncation half of a session revert.
    async fn truncate_after(&self, session_id: &str, after_message_id: &str) -> Result<()>;
}

#[async_trait]
impl MessageRepository for Arc<dyn MessageRepository> {
    async fn get(&self, session_id: &str, message_id: &str) -> Result<Option<Message>> {
        (**self).get(session_id, message_id).await
    }
    async fn create(&self, message: &Message) -> Result<()> {
        (**self).create(message).await
    }
    async fn list_by_session(&self, session_id: &str) -> Result<Vec<Message>> {
        (**self).list_by_session(session_id).await
    }
    async fn truncate_after(&self, session_id: &str, after_message_id: &str) -> Result<()> {
        (**self).truncate_after(session_id, after_message_id).await
    }
}

#[async_trait]
pub trait PartRepository: Send + Sync {
    async fn create(&self, message_id: &str, part: &Part) -> Result<()>;
    async fn list_by_message(&self, message_id: &str) -> Result<Vec<Part>>;
}

#[async_trait]
impl PartRepository for Arc<dyn PartRepository> {
    async fn create(&self, message_id: &str, part: &Part) -> Result<()> {
        (**self).create(message_id, part).await
    }
    async fn list_by_message(&self, message_id: &str) -> Result<Vec<Part>> {
        (**self).list_by_message(message_id).await
    }
}

/// `{id, session_id, content, embedding?, metadata, created}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub session_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    pub created: DateTime<Utc>,
}

#[async_trait]
pub trait MemoryRepository: Send + Sync {
    async fn get(&self, session_id: &str, memory_id: &str) -> Result<Option<MemoryRecord>>;
    async fn create(&self, record: &MemoryRecord) -> Result<()>;
    async fn list_by_session(&self, session_id: &str) -> Result<Vec<MemoryRecord>>;
}

/// `{id, session_id, message_id, tool_id, state, start_time, end_time, logged_at, updated_at?}`,
/// matching `tool_execution_tracker.py`'s on-disk record shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub id: String,
    pub session_id: String,
    pub message_id: String,
    pub tool_id: String,
    pub state: sa_domain::part::ToolState,
    pub logged_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ToolExecutionRepository: Send + Sync {
    async fn log(&self, record: &ToolExecutionRecord) -> Result<()>;
    async fn update_state(&self, execution_id: &str, state: &sa_domain::part::ToolState) -> Result<Option<ToolExecutionRecord>>;
    async fn get(&self, execution_id: &str) -> Result<Option<ToolExecutionRecord>>;
    async fn history(&self, session_id: &str, tool_id: Option<&str>, limit: Option<usize>) -> Result<Vec<ToolExecutionRecord>>;
}

#[async_trait]
impl ToolExecutionRepository for Arc<dyn ToolExecutionRepository> {
    async fn log(&self, record: &ToolExecutionRecord) -> Result<()> {
        (**self).log(record).await
    }
    async fn update_state(&self, execution_id: &str, state: &sa_domain::part::ToolState) -> Result<Option<ToolExecutionRecord>> {
        (**self).update_state(execution_id, state).await
    }
    async fn get(&self, execution_id: &str) -> Result<Option<ToolExecutionRecord>> {
        (**self).get(execution_id).await
    }
    async fn history(&self, session_id: &str, tool_id: Option<&str>, limit: Option<usize>) -> Result<Vec<ToolExecutionRecord>> {
        (**self).history(session_id, tool_id, limit).await
    }
}
