//! In-memory registry of live sessions.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::session::GenerationSession;

/// Live sessions keyed by chat id.
///
/// Passed explicitly to whoever needs it; a session is visible from
/// [`SessionStore::open`] until [`SessionStore::close`].
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, GenerationSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. A project id can only be held by one running
    /// session at a time.
    pub fn open(&self, session: GenerationSession) -> SessionResult<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session.chat_id) {
            return Err(SessionError::AlreadyOpen(session.chat_id));
        }
        if let Some(holder) = sessions
            .values()
            .find(|s| s.project_id == session.project_id && s.is_running())
        {
            return Err(SessionError::ProjectBusy {
                project_id: session.project_id,
                chat_id: holder.chat_id.clone(),
            });
        }
        debug!("Opened session {} ({})", session.chat_id, session.project_id);
        sessions.insert(session.chat_id.clone(), session);
        Ok(())
    }

    /// Remove a session, returning its final state.
    pub fn close(&self, chat_id: &str) -> SessionResult<GenerationSession> {
        let session = self
            .sessions
            .write()
            .remove(chat_id)
            .ok_or_else(|| SessionError::NotFound(chat_id.to_string()))?;
        debug!("Closed session {}", chat_id);
        Ok(session)
    }

    /// Snapshot of a session.
    pub fn get(&self, chat_id: &str) -> Option<GenerationSession> {
        self.sessions.read().get(chat_id).cloned()
    }

    /// Apply `f` to a live session.
    pub fn update<F>(&self, chat_id: &str, f: F) -> SessionResult<()>
    where
        F: FnOnce(&mut GenerationSession),
    {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(chat_id)
            .ok_or_else(|| SessionError::NotFound(chat_id.to_string()))?;
        f(session);
        Ok(())
    }

    pub fn list(&self) -> Vec<GenerationSession> {
        let mut sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
