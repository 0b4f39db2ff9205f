//! Node tree shared by every session of a [`MemoryStore`](crate::MemoryStore).

use std::collections::{BTreeSet, HashMap};

use coordination_lock_core::error::{StoreError, StoreResult};
use coordination_lock_core::store::{
    CreateMode, NodeStat, SessionState, WatchEventKind, WatchedEvent, Watcher,
};
use tokio::sync::broadcast;
use tracing::trace;

use crate::session::SessionStats;

/// Width of the zero-padded sequence suffix on sequential nodes.
const SEQUENCE_WIDTH: usize = 10;

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    version: i32,
    children: BTreeSet<String>,
    next_sequence: u64,
    ephemeral_owner: Option<u64>,
}

impl Node {
    fn new(data: Vec<u8>, ephemeral_owner: Option<u64>) -> Self {
        Self {
            data,
            version: 0,
            children: BTreeSet::new(),
            next_sequence: 0,
            ephemeral_owner,
        }
    }

    fn stat(&self) -> NodeStat {
        NodeStat {
            version: self.version,
            num_children: self.children.len(),
            ephemeral_owner: self.ephemeral_owner,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchKind {
    /// Registered by `exists`: fires on create, delete and data change.
    Exists,
    /// Registered by `get_data`: fires on delete and data change.
    Data,
}

#[derive(Debug)]
struct Registration {
    session: u64,
    kind: WatchKind,
    watcher: Watcher,
}

#[derive(Debug)]
pub(crate) struct SessionEntry {
    pub(crate) state: SessionState,
    pub(crate) events: broadcast::Sender<SessionState>,
    pub(crate) stats: SessionStats,
}

/// All nodes, sessions and pending watches.
#[derive(Debug)]
pub(crate) struct Tree {
    nodes: HashMap<String, Node>,
    watches: HashMap<String, Vec<Registration>>,
    pub(crate) sessions: HashMap<u64, SessionEntry>,
    next_session: u64,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), None));
        Self {
            nodes,
            watches: HashMap::new(),
            sessions: HashMap::new(),
            next_session: 1,
        }
    }

    pub(crate) fn open_session(&mut self) -> (u64, broadcast::Sender<SessionState>) {
        let id = self.next_session;
        self.next_session += 1;
        let (events, _) = broadcast::channel(16);
        self.sessions.insert(
            id,
            SessionEntry {
                state: SessionState::Connected,
                events: events.clone(),
                stats: SessionStats::default(),
            },
        );
        (id, events)
    }

    /// Fails unless the session can issue requests.
    pub(crate) fn check_session(&self, session: u64) -> StoreResult<()> {
        match self.sessions.get(&session).map(|s| s.state) {
            Some(SessionState::Connected) => Ok(()),
            Some(SessionState::Disconnected) => Err(StoreError::ConnectionLoss(format!(
                "session {session} is disconnected"
            ))),
            _ => Err(StoreError::SessionExpired),
        }
    }

    pub(crate) fn create(
        &mut self,
        session: u64,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> StoreResult<String> {
        validate_path(path)?;
        if path == "/" {
            return Err(StoreError::NodeExists(path.to_string()));
        }
        let (parent_path, base) = split_path(path);

        let parent = self
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| StoreError::NoNode(parent_path.to_string()))?;

        let name = if mode.is_sequential() {
            let sequence = parent.next_sequence;
            parent.next_sequence += 1;
            format!("{base}{sequence:0width$}", width = SEQUENCE_WIDTH)
        } else {
            base.to_string()
        };

        if parent.children.contains(&name) {
            return Err(StoreError::NodeExists(join_path(parent_path, &name)));
        }
        parent.children.insert(name.clone());

        let actual = join_path(parent_path, &name);
        let owner = mode.is_ephemeral().then_some(session);
        self.nodes.insert(actual.clone(), Node::new(data.to_vec(), owner));
        trace!(path = %actual, ?mode, session, "created node");

        self.fire(&actual, WatchEventKind::NodeCreated);
        Ok(actual)
    }

    pub(crate) fn exists(
        &mut self,
        session: u64,
        path: &str,
        watcher: Option<Watcher>,
    ) -> StoreResult<Option<NodeStat>> {
        validate_path(path)?;
        if let Some(watcher) = watcher {
            self.register(session, path, WatchKind::Exists, watcher);
        }
        Ok(self.nodes.get(path).map(Node::stat))
    }

    pub(crate) fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        validate_path(path)?;
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        Ok(node.children.iter().cloned().collect())
    }

    pub(crate) fn get_data(
        &mut self,
        session: u64,
        path: &str,
        watcher: Option<Watcher>,
    ) -> StoreResult<(Vec<u8>, NodeStat)> {
        validate_path(path)?;
        let (data, stat) = {
            let node = self
                .nodes
                .get(path)
                .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
            (node.data.clone(), node.stat())
        };
        if let Some(watcher) = watcher {
            self.register(session, path, WatchKind::Data, watcher);
        }
        Ok((data, stat))
    }

    pub(crate) fn set_data(
        &mut self,
        path: &str,
        data: &[u8],
        version: Option<i32>,
    ) -> StoreResult<NodeStat> {
        validate_path(path)?;
        let node = self
            .nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        if let Some(expected) = version {
            if expected != node.version {
                return Err(StoreError::BadVersion(path.to_string()));
            }
        }
        node.data = data.to_vec();
        node.version += 1;
        let stat = node.stat();

        self.fire(path, WatchEventKind::NodeDataChanged);
        Ok(stat)
    }

    pub(crate) fn delete(&mut self, path: &str, version: Option<i32>) -> StoreResult<()> {
        validate_path(path)?;
        if path == "/" {
            return Err(StoreError::BadArguments("cannot delete the root node".to_string()));
        }
        let node = self
            .nodes
            .get(path)
            .ok_or_else(|| StoreError::NoNode(path.to_string()))?;
        if let Some(expected) = version {
            if expected != node.version {
                return Err(StoreError::BadVersion(path.to_string()));
            }
        }
        if !node.children.is_empty() {
            return Err(StoreError::NotEmpty(path.to_string()));
        }

        self.nodes.remove(path);
        let (parent_path, name) = split_path(path);
        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.children.remove(name);
        }
        trace!(path, "deleted node");

        self.fire(path, WatchEventKind::NodeDeleted);
        Ok(())
    }

    /// Ends a session: removes its ephemeral nodes and pending watches, then
    /// tells its subscribers.
    pub(crate) fn end_session(&mut self, session: u64, state: SessionState) {
        let Some(entry) = self.sessions.get_mut(&session) else {
            return;
        };
        if entry.state.is_terminal() {
            return;
        }
        entry.state = state;
        let events = entry.events.clone();

        for registrations in self.watches.values_mut() {
            registrations.retain(|r| r.session != session);
        }

        let mut owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        owned.sort();
        for path in owned {
            // Ephemeral nodes have no children, so this cannot fail on
            // NotEmpty; a concurrent delete is fine too.
            let _ = self.delete(&path, None);
        }

        let _ = events.send(state);
    }

    pub(crate) fn set_connection(&mut self, session: u64, state: SessionState) {
        if let Some(entry) = self.sessions.get_mut(&session) {
            if entry.state.is_terminal() || entry.state == state {
                return;
            }
            entry.state = state;
            let _ = entry.events.send(state);
        }
    }

    pub(crate) fn stats_mut(&mut self, session: u64) -> Option<&mut SessionStats> {
        self.sessions.get_mut(&session).map(|s| &mut s.stats)
    }

    fn register(&mut self, session: u64, path: &str, kind: WatchKind, watcher: Watcher) {
        self.watches
            .entry(path.to_string())
            .or_default()
            .push(Registration {
                session,
                kind,
                watcher,
            });
    }

    /// Fires and removes every registration on `path` interested in `kind`.
    fn fire(&mut self, path: &str, kind: WatchEventKind) {
        let Some(registrations) = self.watches.remove(path) else {
            return;
        };
        let (fired, kept): (Vec<_>, Vec<_>) = registrations.into_iter().partition(|r| match kind {
            WatchEventKind::NodeCreated => r.kind == WatchKind::Exists,
            WatchEventKind::NodeDeleted | WatchEventKind::NodeDataChanged => true,
        });
        if !kept.is_empty() {
            self.watches.insert(path.to_string(), kept);
        }

        for registration in fired {
            if let Some(stats) = self.stats_mut(registration.session) {
                stats.watches_fired += 1;
            }
            registration.watcher.notify(WatchedEvent {
                kind,
                path: path.to_string(),
            });
        }
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_path(path: &str) -> StoreResult<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path.contains("//") {
        return Err(StoreError::BadArguments(format!("invalid node path '{path}'")));
    }
    Ok(())
}

/// Splits `/a/b/c` into (`/a/b`, `c`) and `/a` into (`/`, `a`).
fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/", name),
        Some((parent, name)) => (parent, name),
        None => ("/", path),
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
