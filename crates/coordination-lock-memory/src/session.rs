//! Session clients of the in-process store.

use std::sync::Arc;

use coordination_lock_core::error::StoreResult;
use coordination_lock_core::store::{CoordinationStore, CreateMode, NodeStat, SessionState, Watcher};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

use crate::tree::Tree;

/// Per-session request counters.
///
/// Used to observe how often a contender re-lists the lock queue and how
/// many of its watches fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Number of `children` calls issued by the session.
    pub children_calls: u64,
    /// Number of watches registered by the session that have fired.
    pub watches_fired: u64,
}

/// A client session of a [`MemoryStore`](crate::MemoryStore).
///
/// Ephemeral nodes created through the session disappear when it expires
/// or is closed. Dropping the session closes it.
#[derive(Debug)]
pub struct MemorySession {
    id: u64,
    tree: Arc<Mutex<Tree>>,
    events: broadcast::Sender<SessionState>,
}

impl MemorySession {
    pub(crate) fn new(
        id: u64,
        tree: Arc<Mutex<Tree>>,
        events: broadcast::Sender<SessionState>,
    ) -> Self {
        Self { id, tree, events }
    }

    /// Returns the session id. Ephemeral nodes report it as their owner.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        self.tree
            .lock()
            .sessions
            .get(&self.id)
            .map(|s| s.state)
            .unwrap_or(SessionState::Closed)
    }

    /// Expires the session as if the store stopped hearing from it.
    #[instrument(skip(self), fields(session = self.id, backend = "memory"))]
    pub fn expire(&self) {
        debug!("expiring session");
        self.tree.lock().end_session(self.id, SessionState::Expired);
    }

    /// Closes the session.
    #[instrument(skip(self), fields(session = self.id, backend = "memory"))]
    pub fn close(&self) {
        debug!("closing session");
        self.tree.lock().end_session(self.id, SessionState::Closed);
    }

    /// Simulates a dropped connection. Requests fail with
    /// `StoreError::ConnectionLoss` until [`reconnect`](Self::reconnect).
    pub fn disconnect(&self) {
        self.tree
            .lock()
            .set_connection(self.id, SessionState::Disconnected);
    }

    /// Restores a dropped connection.
    pub fn reconnect(&self) {
        self.tree
            .lock()
            .set_connection(self.id, SessionState::Connected);
    }

    /// Returns the session's request counters.
    pub fn stats(&self) -> SessionStats {
        self.tree
            .lock()
            .sessions
            .get(&self.id)
            .map(|s| s.stats)
            .unwrap_or_default()
    }
}

impl CoordinationStore for MemorySession {
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> StoreResult<String> {
        let mut tree = self.tree.lock();
        tree.check_session(self.id)?;
        tree.create(self.id, path, data, mode)
    }

    async fn exists(&self, path: &str, watcher: Option<Watcher>) -> StoreResult<Option<NodeStat>> {
        let mut tree = self.tree.lock();
        tree.check_session(self.id)?;
        tree.exists(self.id, path, watcher)
    }

    async fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        let mut tree = self.tree.lock();
        tree.check_session(self.id)?;
        if let Some(stats) = tree.stats_mut(self.id) {
            stats.children_calls += 1;
        }
        tree.children(path)
    }

    async fn delete(&self, path: &str, version: Option<i32>) -> StoreResult<()> {
        let mut tree = self.tree.lock();
        tree.check_session(self.id)?;
        tree.delete(path, version)
    }

    async fn get_data(
        &self,
        path: &str,
        watcher: Option<Watcher>,
    ) -> StoreResult<(Vec<u8>, NodeStat)> {
        let mut tree = self.tree.lock();
        tree.check_session(self.id)?;
        tree.get_data(self.id, path, watcher)
    }

    async fn set_data(&self, path: &str, data: &[u8], version: Option<i32>) -> StoreResult<NodeStat> {
        let mut tree = self.tree.lock();
        tree.check_session(self.id)?;
        tree.set_data(path, data, version)
    }

    fn session_events(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.tree.lock().end_session(self.id, SessionState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use coordination_lock_core::error::StoreError;
    use coordination_lock_core::store::WatchEventKind;

    #[tokio::test]
    async fn test_ephemeral_nodes_vanish_with_session() {
        let store = MemoryStore::new();
        let owner = store.connect();
        let observer = store.connect();

        owner.ensure_path("/locks/job").await.unwrap();
        let path = owner
            .create("/locks/job/lock-", b"me", CreateMode::EphemeralSequential)
            .await
            .unwrap();
        let durable = owner
            .create("/locks/job/lock-", b"me", CreateMode::PersistentSequential)
            .await
            .unwrap();

        let (watcher, mut events) = Watcher::channel();
        assert!(observer.exists(&path, Some(watcher)).await.unwrap().is_some());

        let mut session_events = owner.session_events();
        owner.expire();

        assert_eq!(session_events.recv().await.unwrap(), SessionState::Expired);
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, WatchEventKind::NodeDeleted);
        assert_eq!(event.path, path);
        assert!(observer.exists(&path, None).await.unwrap().is_none());
        assert!(observer.exists(&durable, None).await.unwrap().is_some());

        let err = owner.children("/locks/job").await.unwrap_err();
        assert_eq!(err, StoreError::SessionExpired);
    }

    #[tokio::test]
    async fn test_watches_fire_once() {
        let store = MemoryStore::new();
        let session = store.connect();
        session.create("/node", b"a", CreateMode::Persistent).await.unwrap();

        let (watcher, mut events) = Watcher::channel();
        session.get_data("/node", Some(watcher)).await.unwrap();

        session.set_data("/node", b"b", None).await.unwrap();
        session.set_data("/node", b"c", None).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, WatchEventKind::NodeDataChanged);
        assert!(events.try_recv().is_err());
        assert_eq!(session.stats().watches_fired, 1);
    }

    #[tokio::test]
    async fn test_version_checked_writes() {
        let store = MemoryStore::new();
        let session = store.connect();
        session.create("/node", b"a", CreateMode::Persistent).await.unwrap();

        let (_, stat) = session.get_data("/node", None).await.unwrap();
        assert_eq!(stat.version, 0);

        let stat = session.set_data("/node", b"b", Some(0)).await.unwrap();
        assert_eq!(stat.version, 1);

        let err = session.set_data("/node", b"c", Some(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::BadVersion(_)));

        let err = session.delete("/node", Some(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::BadVersion(_)));
        session.delete("/node", Some(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_refuses_non_empty_node() {
        let store = MemoryStore::new();
        let session = store.connect();
        session.ensure_path("/a/b").await.unwrap();

        let err = session.delete("/a", None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotEmpty(_)));
        assert_eq!(session.children("/a").await.unwrap(), vec!["b".to_string()]);
        assert_eq!(session.stats().children_calls, 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_not_terminal() {
        let store = MemoryStore::new();
        let session = store.connect();
        let mut events = session.session_events();

        session.disconnect();
        assert_eq!(events.recv().await.unwrap(), SessionState::Disconnected);
        let err = session.children("/").await.unwrap_err();
        assert!(matches!(err, StoreError::ConnectionLoss(_)));

        session.reconnect();
        assert_eq!(events.recv().await.unwrap(), SessionState::Connected);
        assert!(session.children("/").await.is_ok());
        assert_eq!(store.live_sessions(), 1);
    }
}
