//! Coordination store client abstraction.
//!
//! Locks are built on a hierarchical store offering ordered (sequential)
//! child nodes, session-scoped ephemeral nodes, atomic create/delete,
//! version-checked writes and one-shot change watches. This module defines
//! the client surface the lock engine consumes; backends implement
//! [`CoordinationStore`].

use std::future::Future;

use tokio::sync::{broadcast, mpsc};

use crate::error::{StoreError, StoreResult};

// ============================================================================
// Node Model
// ============================================================================

/// How a node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Survives the creating session; the store appends a sequence suffix.
    PersistentSequential,
    /// Removed by the store when the creating session ends.
    Ephemeral,
    /// Removed when the session ends; the store appends a sequence suffix.
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::PersistentSequential | Self::EphemeralSequential)
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }
}

/// Node metadata returned by reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStat {
    /// Data version, incremented on every write.
    pub version: i32,
    /// Number of children.
    pub num_children: usize,
    /// Owning session for ephemeral nodes.
    pub ephemeral_owner: Option<u64>,
}

// ============================================================================
// Watches
// ============================================================================

/// Kind of change reported by a node watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
}

/// A fired node watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

/// Session state transitions delivered by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connected,
    Disconnected,
    Expired,
    Closed,
}

impl SessionState {
    /// Returns true if the session can never come back.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Closed)
    }
}

/// Delivery endpoint for one-shot node watches.
///
/// A watcher registered with a read fires at most once for that
/// registration. The same watcher may be registered many times; every
/// registration funnels into the receiver returned by [`Watcher::channel`],
/// so notifications never run on the store's dispatch path.
#[derive(Debug, Clone)]
pub struct Watcher {
    sender: mpsc::UnboundedSender<WatchedEvent>,
}

impl Watcher {
    /// Creates a watcher and the receiver its events are delivered to.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WatchedEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Delivers an event. Returns false if nobody is listening anymore.
    pub fn notify(&self, event: WatchedEvent) -> bool {
        self.sender.send(event).is_ok()
    }

    /// Returns true once the receiving side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ============================================================================
// Client Trait
// ============================================================================

/// Client for a hierarchical coordination store.
///
/// One client corresponds to one store session. Ephemeral nodes created
/// through a client are owned by its session. Paths are absolute,
/// `/`-separated and carry no trailing separator.
pub trait CoordinationStore: Send + Sync + 'static {
    /// Creates a node and returns its actual path (which includes the
    /// store-assigned suffix for sequential modes).
    fn create(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> impl Future<Output = StoreResult<String>> + Send;

    /// Returns the node's stat if it exists. A watcher, if given, fires on
    /// the node's next creation, deletion or data change.
    fn exists(
        &self,
        path: &str,
        watcher: Option<Watcher>,
    ) -> impl Future<Output = StoreResult<Option<NodeStat>>> + Send;

    /// Lists child names (not paths) of a node. Never sets a watch.
    fn children(&self, path: &str) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    /// Deletes a node. `version` of `None` matches any version.
    fn delete(&self, path: &str, version: Option<i32>) -> impl Future<Output = StoreResult<()>> + Send;

    /// Reads a node's data and stat. A watcher, if given, fires on the
    /// node's next deletion or data change.
    fn get_data(
        &self,
        path: &str,
        watcher: Option<Watcher>,
    ) -> impl Future<Output = StoreResult<(Vec<u8>, NodeStat)>> + Send;

    /// Writes a node's data. `version` of `None` matches any version.
    fn set_data(
        &self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> impl Future<Output = StoreResult<NodeStat>> + Send;

    /// Subscribes to session state transitions.
    fn session_events(&self) -> broadcast::Receiver<SessionState>;

    /// Creates every missing persistent node along `path`.
    fn ensure_path(&self, path: &str) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            let mut current = String::with_capacity(path.len());
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                current.push('/');
                current.push_str(segment);
                match self.create(&current, &[], CreateMode::Persistent).await {
                    Ok(_) | Err(StoreError::NodeExists(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
    }
}

/// Returns the last segment of a node path.
pub fn node_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}
