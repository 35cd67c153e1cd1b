//! In-memory registry of live verification sessions.
//!
//! Keeps sessions in creation order. Removing an entry stops its session.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use vigil_core::SessionId;
use vigil_engine::VerificationSession;

use crate::push::ScoreSlot;

/// A registered session and the slot its providers read from.
#[derive(Debug)]
pub struct SessionEntry {
    pub session: VerificationSession,
    pub scores: Arc<ScoreSlot>,
    pub created_at: DateTime<Utc>,
}

/// Thread-safe registry of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: RwLock<IndexMap<SessionId, Arc<SessionEntry>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its own ID.
    pub fn insert(&self, session: VerificationSession, scores: Arc<ScoreSlot>) -> SessionId {
        let id = session.id();
        let entry = Arc::new(SessionEntry { session, scores, created_at: Utc::now() });
        self.entries.write().unwrap_or_else(PoisonError::into_inner).insert(id, entry);
        id
    }

    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<Arc<SessionEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).get(&id).cloned()
    }

    /// Unregister and stop a session. Returns `false` if it was unknown.
    pub fn remove(&self, id: SessionId) -> bool {
        let removed = self.entries.write().unwrap_or_else(PoisonError::into_inner).shift_remove(&id);
        match removed {
            Some(entry) => {
                entry.session.stop();
                true
            }
            None => false,
        }
    }

    /// Registered IDs, oldest first.
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
