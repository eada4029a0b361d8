use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Duration, Utc};

use crate::models::ConversationSession;

/// Storage for in-progress booking conversations, keyed by session id.
/// Saves overwrite; concurrent writers to one id are last-write-wins.
pub trait SessionStore: Send + Sync {
    /// Returns the stored session, or a fresh one when the id is unknown or
    /// its session has expired. The fresh session is not stored until saved.
    fn get_or_create(&self, session_id: &str) -> ConversationSession;

    fn save(&self, session: ConversationSession);

    fn delete(&self, session_id: &str) -> bool;

    /// Drops sessions idle for longer than the store's TTL.
    fn prune_expired(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, ConversationSession>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn is_expired(&self, session: &ConversationSession) -> bool {
        session.last_activity + self.ttl < Utc::now()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ConversationSession>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, session_id: &str) -> ConversationSession {
        let mut sessions = self.lock();
        let expired = match sessions.get(session_id) {
            Some(session) if !self.is_expired(session) => return session.clone(),
            Some(_) => true,
            None => false,
        };
        if expired {
            tracing::debug!(session_id, "session expired, starting over");
            sessions.remove(session_id);
        }
        ConversationSession::new(session_id)
    }

    fn save(&self, session: ConversationSession) {
        self.lock().insert(session.session_id.clone(), session);
    }

    fn delete(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    fn prune_expired(&self) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_expired(session));
        before - sessions.len()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
