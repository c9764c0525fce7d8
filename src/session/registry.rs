//! Process-wide table of open sessions

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Weak},
};

use parking_lot::RwLock;
use tracing::debug;

use super::{CloseReason, Session, SessionId, SessionObserver};

/// Owns every open session, keyed by its id.
///
/// Cloning yields another handle onto the same table.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl RegistryInner {
    fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }
}

impl SessionObserver for RegistryInner {
    fn session_closed(&self, id: &SessionId, reason: CloseReason) {
        if self.remove(id).is_some() {
            debug!(session_id = %id, reason = %reason, "session deregistered");
        }
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fresh session in `Initializing` under a newly generated id.
    pub fn create(&self) -> (SessionId, Arc<Session>) {
        let mut sessions = self.inner.sessions.write();
        loop {
            let id = SessionId::generate();
            if let Entry::Vacant(slot) = sessions.entry(id.clone()) {
                let session = Arc::new(Session::new(id.clone()));
                slot.insert(Arc::clone(&session));
                debug!(session_id = %id, active = sessions.len(), "session created");
                return (id, session);
            }
        }
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.inner.sessions.read().get(id).cloned()
    }

    /// Removes `id`; removing an unknown id is a no-op.
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.inner.remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observer that deregisters sessions from this registry when they close.
    pub fn observer(&self) -> Weak<dyn SessionObserver> {
        let inner: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        inner
    }

    /// Closes every open session and returns how many were closed.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let sessions: Vec<Arc<Session>> = self
            .inner
            .sessions
            .write()
            .drain()
            .map(|(_, session)| session)
            .collect();
        sessions
            .iter()
            .filter(|session| session.close(reason))
            .count()
    }
}
