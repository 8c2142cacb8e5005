//! Registry of connected client sessions.
//!
//! Sessions live in a sharded concurrent map. A fan-out pass works on a
//! snapshot: the `Arc`s are copied out and every shard lock is released
//! before any message is sent, so connects and disconnects never wait on
//! client I/O and never disturb a pass already in progress.

use crate::session::{ClientSession, SessionId};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// The set of currently connected sessions.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    sessions: DashMap<SessionId, Arc<ClientSession>>,
}

impl ClientRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session.
    ///
    /// Returns `false` if a session with the same id was already present, in
    /// which case it is replaced.
    pub fn register(&self, session: Arc<ClientSession>) -> bool {
        let id = session.id();
        let is_new = self.sessions.insert(id, session).is_none();
        debug!(session = %id, sessions = self.sessions.len(), "Session registered");
        is_new
    }

    /// Remove a session.
    ///
    /// Returns the removed session, if it was registered.
    pub fn unregister(&self, id: SessionId) -> Option<Arc<ClientSession>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_some() {
            debug!(session = %id, sessions = self.sessions.len(), "Session unregistered");
        }
        removed
    }

    /// Copy out the current sessions, ordered by registration.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        let mut sessions: Vec<Arc<ClientSession>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        sessions.sort_by_key(|session| session.id());
        sessions
    }

    /// Look up a session.
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<ClientSession>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
