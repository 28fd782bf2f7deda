//! Registry of live sessions.
//!
//! `SessionRegistry` stores non-owning weak references to session state so
//! handlers can reach other sessions without keeping them alive. Dead
//! entries are pruned lazily at lookup time or by [`SessionRegistry::prune`].

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::{SessionCore, SessionId};

/// Concurrent registry keyed by [`SessionId`].
#[derive(Default)]
pub(crate) struct SessionRegistry(DashMap<SessionId, Weak<SessionCore>>);

impl SessionRegistry {
    /// Retrieve the session for `id` if it is still alive and open.
    pub(crate) fn get(&self, id: SessionId) -> Option<Arc<SessionCore>> {
        let guard = self.0.get(&id);
        let core = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        match core {
            Some(core) if !core.is_closed() => Some(core),
            _ => {
                self.0.remove_if(&id, |_, weak| {
                    weak.upgrade().is_none_or(|core| core.is_closed())
                });
                None
            }
        }
    }

    /// Insert a newly created session.
    pub(crate) fn insert(&self, core: &Arc<SessionCore>) { self.0.insert(core.id(), Arc::downgrade(core)); }

    /// Remove a session, typically when its driver exits.
    pub(crate) fn remove(&self, id: SessionId) { self.0.remove(&id); }

    /// Remove entries whose session was dropped or closed.
    pub(crate) fn prune(&self) {
        self.0
            .retain(|_, weak| weak.upgrade().is_some_and(|core| !core.is_closed()));
    }

    /// Prune, then return the ids of the open sessions.
    pub(crate) fn active_ids(&self) -> Vec<SessionId> {
        self.prune();
        self.0.iter().map(|entry| *entry.key()).collect()
    }
}
