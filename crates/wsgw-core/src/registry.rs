//! Process-local registry of live connections.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::error::PushError;
use crate::id::ConnectionId;
use crate::session::SessionHandle;

/// Thread-safe map from connection identifier to session handle.
///
/// One lock guards the map; every operation is O(1) and holds the lock only
/// across the map access. The registry owns membership, never the sessions'
/// I/O tasks: the accept flow inserts after backend authorization and
/// removes as the last step of teardown.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, SessionHandle>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a handle, keyed by its identifier.
    ///
    /// Last writer wins: a second registration under the same identifier
    /// displaces the prior handle, which then receives no further pushes.
    /// Fresh identifiers are globally unique, so displacement does not
    /// occur outside of deliberate reuse in tests.
    pub fn add(&self, handle: SessionHandle) {
        let id = handle.id.clone();
        self.connections.lock().insert(id.clone(), handle);
        debug!(connection_id = %id, "connection registered");
    }

    /// Removes the entry for `id`; absent entries are not an error.
    pub fn remove(&self, id: &ConnectionId) {
        self.connections.lock().remove(id);
        debug!(connection_id = %id, "connection removed");
    }

    /// Returns the current handle for `id`, if any.
    pub fn get(&self, id: &ConnectionId) -> Option<SessionHandle> {
        self.connections.lock().get(id).cloned()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Whether the registry holds no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Enqueues `payload` on the outbound buffer of connection `id`.
    ///
    /// Never blocks: a full buffer sheds the payload and reports
    /// [`PushError::Overload`]. A handle whose session already tore down
    /// behaves like a missing entry.
    pub fn push(&self, id: &ConnectionId, payload: String) -> Result<(), PushError> {
        let handle = self.get(id).ok_or(PushError::ConnectionNotFound)?;
        match handle.outbound.try_send(payload) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PushError::Overload {
                reason: "fromApp channel full".to_string(),
            }),
            Err(TrySendError::Closed(_)) => Err(PushError::ConnectionNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    fn session(id: &str) -> Session {
        Session::new(ConnectionId::from(id), Vec::new())
    }

    #[test]
    fn membership_follows_add_and_remove() {
        let registry = ConnectionRegistry::new();
        let a = session("a");
        let b = session("b");

        registry.add(a.handle());
        registry.add(b.handle());
        assert_eq!(registry.len(), 2);
        assert!(registry.get(a.id()).is_some());

        registry.remove(a.id());
        assert!(registry.get(a.id()).is_none());
        assert!(registry.get(b.id()).is_some());

        // Removing twice is fine.
        registry.remove(a.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn add_replaces_existing_handle() {
        let registry = ConnectionRegistry::new();
        let first = session("dup");
        let mut second = session("dup");

        registry.add(first.handle());
        registry.add(second.handle());
        assert_eq!(registry.len(), 1);

        registry
            .push(&ConnectionId::from("dup"), "hello".to_string())
            .unwrap();
        assert_eq!(second.try_next_outbound().as_deref(), Some("hello"));
        drop(first);
    }

    #[test]
    fn push_to_unknown_id_is_not_found() {
        let registry = ConnectionRegistry::new();
        assert_eq!(
            registry.push(&ConnectionId::from("nope"), "x".to_string()),
            Err(PushError::ConnectionNotFound)
        );
    }

    #[test]
    fn push_sheds_load_when_buffer_is_full() {
        let registry = ConnectionRegistry::new();
        let target = Session::with_outbound_buffer(ConnectionId::from("slow"), Vec::new(), 4);
        registry.add(target.handle());

        let id = ConnectionId::from("slow");
        for n in 0..4 {
            registry.push(&id, format!("msg-{n}")).unwrap();
        }
        let overflow = registry.push(&id, "msg-4".to_string());
        assert_eq!(
            overflow,
            Err(PushError::Overload {
                reason: "fromApp channel full".to_string()
            })
        );
    }

    #[test]
    fn push_to_torn_down_session_is_not_found() {
        let registry = ConnectionRegistry::new();
        let gone = session("gone");
        registry.add(gone.handle());
        drop(gone);

        assert_eq!(
            registry.push(&ConnectionId::from("gone"), "x".to_string()),
            Err(PushError::ConnectionNotFound)
        );
    }
}
