//! Session revert — "undo to last message", supplemented from
//! `original_source/dawn_kestrel/session/revert.py`'s `RevertManager`. Not
//! named in spec.md's data model and not excluded by any Non-goal; the
//! distillation simply dropped it.

use sa_domain::error::{Error, Result};
use sa_domain::session::Session;

use crate::traits::{MessageRepository, SessionRepository};

/// Revert `session_id` to the state it was in right after `message_id` was
/// appended: every later message is dropped and `message_counter` is reset
/// to match, so the next message allocated reuses the freed counter range.
///
/// `message_id` must belong to the session and must actually exist — an
/// unknown id is an `InvalidState` error rather than a silent no-op, since a
/// caller asking to revert to a point that never existed is a programming
/// error, not a normal "nothing to do" case.
pub async fn revert_to(sessions: &dyn SessionRepository, messages: &dyn MessageRepository, session_id: &str, message_id: &str) -> Result<Session> {
    let mut session = sessions
        .get(session_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("session not found: {session_id}")))?;

    let remaining = messages.list_by_session(session_id).await?;
    let kept = remaining
        .iter()
        .position(|m| m.id == message_id)
        .ok_or_else(|| Error::InvalidState(format!("message {message_id} not found in session {session_id}")))?
        + 1;

    messages.truncate_after(session_id, message_id).await?;

    session.message_counter = kept as u64;
    session.updated = chrono::Utc::now();
    sessions.update(&session).await?;

    Ok(session)
}
