//! Unit of Work: batches a Streaming LLM Session turn's writes (one message
//! plus its parts, or a session update) into a single transaction boundary.
//!
//! Grounded on `core/unit_of_work.py::UnitOfWorkImpl` — same begin/commit/
//! rollback contract, same "first failing write short-circuits commit"
//! behavior, same explicit non-thread-safety (single in-flight transaction
//! per instance; callers needing concurrent transactions use one instance
//! per task).

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::error::{Error, Result};
use sa_domain::part::Part;
use sa_domain::session::{Message, Session};
use tokio::sync::Mutex;

use crate::traits::{MessageRepository, PartRepository, SessionRepository};

/// The shape every collaborator actually wires up: one transaction over the
/// same `Arc<dyn ...>` trait objects the rest of the core holds, rather than
/// a fresh concrete-type instantiation per caller.
pub type Uow = UnitOfWorkImpl<Arc<dyn SessionRepository>, Arc<dyn MessageRepository>, Arc<dyn PartRepository>>;

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn begin(&self) -> Result<()>;
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
    async fn register_session(&self, session: Session) -> Result<()>;
    async fn register_message(&self, message: Message) -> Result<()>;
    async fn register_part(&self, message_id: String, part: Part) -> Result<()>;
}

#[derive(Default)]
struct Pending {
    in_transaction: bool,
    sessions: Vec<Session>,
    messages: Vec<Message>,
    parts: Vec<(String, Part)>,
}

pub struct UnitOfWorkImpl<S, M, P>
where
    S: SessionRepository,
    M: MessageRepository,
    P: PartRepository,
{
    session_repo: S,
    message_repo: M,
    part_repo: P,
    pending: Mutex<Pending>,
}

impl<S, M, P> UnitOfWorkImpl<S, M, P>
where
    S: SessionRepository,
    M: MessageRepository,
    P: PartRepository,
{
    pub fn new(session_repo: S, message_repo: M, part_repo: P) -> Self {
        Self {
            session_repo,
            message_repo,
            part_repo,
            pending: Mutex::new(Pending::default()),
        }
    }
}

fn not_in_transaction() -> Error {
    Error::InvalidState("No transaction in progress".to_string())
}

#[async_trait]
impl<S, M, P> UnitOfWork for UnitOfWorkImpl<S, M, P>
where
    S: SessionRepository,
    M: MessageRepository,
    P: PartRepository,
{
    async fn begin(&self) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if pending.in_transaction {
            return Err(Error::InvalidState("Transaction already in progress".to_string()));
        }
        *pending = Pending {
            in_transaction: true,
            ..Pending::default()
        };
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if !pending.in_transaction {
            return Err(not_in_transaction());
        }

        for session in &pending.sessions {
            self.session_repo.create(session).await?;
        }
        for message in &pending.messages {
            self.message_repo.create(message).await?;
        }
        for (message_id, part) in &pending.parts {
            self.part_repo.create(message_id, part).await?;
        }

        *pending = Pending::default();
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if !pending.in_transaction {
            return Err(not_in_transaction());
        }
        *pending = Pending::default();
        Ok(())
    }

    async fn register_session(&self, session: Session) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if !pending.in_transaction {
            return Err(not_in_transaction());
        }
        pending.sessions.push(session);
        Ok(())
    }

    async fn register_message(&self, message: Message) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if !pending.in_transaction {
            return Err(not_in_transaction());
        }
        pending.messages.push(message);
        Ok(())
    }

    async fn register_part(&self, message_id: String, part: Part) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if !pending.in_transaction {
            return Err(not_in_transaction());
        }
        pending.parts.push((message_id, part));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryMessageRepository, InMemoryPartRepository, InMemorySessionRepository};
    use chrono::Utc;

    fn uow() -> UnitOfWorkImpl<InMemorySessionRepository, InMemoryMessageRepository, InMemoryPartRepository> {
        UnitOfWorkImpl::new(InMemorySessionRepository::new(), InMemoryMessageRepository::new(), InMemoryPartRepository::new())
    }

    #[tokio::test]
    async fn commit_without_begin_fails() {
        let uow = uow();
        assert!(uow.commit().await.is_err());
    }

    #[tokio::test]
    async fn double_begin_fails() {
        let uow = uow();
        uow.begin().await.unwrap();
        assert!(uow.begin().await.is_err());
    }

    #[tokio::test]
    async fn register_outside_transaction_fails() {
        let uow = uow();
        let message = Message::user("m1", "s1", "hi");
        assert!(uow.register_message(message).await.is_err());
    }

    #[tokio::test]
    async fn commit_persists_registered_entities_and_clears_pending() {
        let uow = uow();
        uow.begin().await.unwrap();
        let message = Message::user("s1_0", "s1", "hi");
        uow.register_message(message.clone()).await.unwrap();
        uow.register_part("s1_0".to_string(), Part::Text(sa_domain::part::TextPart {
            id: "p1".into(),
            session_id: "s1".into(),
            message_id: "s1_0".into(),
            text: "hi".into(),
            time_created: Utc::now(),
            time_updated: None,
        })).await.unwrap();

        uow.commit().await.unwrap();

        let persisted = uow.message_repo.list_by_session("s1").await.unwrap();
        assert_eq!(persisted.len(), 1);
        let parts = uow.part_repo.list_by_message("s1_0").await.unwrap();
        assert_eq!(parts.len(), 1);

        // Committing again without a new begin fails — pending was cleared.
        assert!(uow.commit().await.is_err());
    }

    #[tokio::test]
    async fn rollback_discards_registered_entities() {
        let uow = uow();
        uow.begin().await.unwrap();
        uow.register_message(Message::user("s1_0", "s1", "hi")).await.unwrap();
        uow.rollback().await.unwrap();

        // Nothing was persisted.
        assert!(uow.message_repo.list_by_session("s1").await.unwrap().is_empty());
    }
}
