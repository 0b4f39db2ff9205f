//! In-process coordination store.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::MemorySession;
use crate::tree::Tree;

/// An in-process hierarchical coordination store.
///
/// Plays the role of the coordination service: it owns the node tree and
/// hands out [`MemorySession`] clients. Every session sees the same tree,
/// so several sessions stand in for several processes contending for the
/// same locks.
///
/// # Example
///
/// ```rust,ignore
/// let store = MemoryStore::new();
/// let process_a = Arc::new(store.connect());
/// let process_b = Arc::new(store.connect());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryStore {
    /// Creates an empty store containing only the root node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session.
    pub fn connect(&self) -> MemorySession {
        let (id, events) = self.tree.lock().open_session();
        MemorySession::new(id, self.tree.clone(), events)
    }

    /// Returns the number of sessions that are still usable.
    pub fn live_sessions(&self) -> usize {
        self.tree
            .lock()
            .sessions
            .values()
            .filter(|s| !s.state.is_terminal())
            .count()
    }
}
