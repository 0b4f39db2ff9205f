//! Acquire, recover and kill protocol for one lock instance.
//!
//! Each contender creates a sequential node `lock-<seq>` under the lock's
//! parent path and owns the lock while its node has the lowest sequence.
//! A contender that is not at the head watches only its immediate
//! predecessor, so a release wakes exactly one waiter. After every wake-up
//! the queue is listed again from scratch rather than trusting the watch.
//!
//! All store-mutating steps of an instance (create, recover, each queue
//! check, delete) run on the instance's [`SerialExecutor`]. Remote kill
//! notifications (node deleted, node content changed, session ended) are
//! queued onto the same executor, so they never interleave with an
//! in-progress step.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use coordination_lock_core::error::{LockError, LockResult, StoreError};
use coordination_lock_core::monitor::{LockInfo, LockKind, LockMonitor};
use coordination_lock_core::store::{
    CoordinationStore, CreateMode, SessionState, WatchEventKind, WatchedEvent, Watcher, node_name,
};
use coordination_lock_core::timeout::TimeoutValue;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::executor::SerialExecutor;
use crate::kill::{KillReason, Notification};
use crate::name::{LOCK_NODE_PREFIX, predecessor, sort_lock_names};
use crate::recovery::{NodeIdentity, RecoveryKey};

/// Lifecycle phase of a lock instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LockPhase {
    #[default]
    Idle,
    Creating,
    Recovering,
    Acquiring,
    Held,
    /// Closed by its owner.
    Released,
    /// Closed locally by its owner; the durable node stays for recovery.
    Detached,
    /// Closed for any other reason.
    Killed,
}

#[derive(Debug, Default)]
struct EngineState {
    phase: LockPhase,
    my_lock_name: Option<String>,
    active_lock_name: Option<String>,
    node_content: Option<String>,
    kill_reason: Option<KillReason>,
    acquired_notified: bool,
    closed: bool,
}

/// Outcome of one pass over the lock queue.
enum Turn {
    Acquired,
    /// The predecessor vanished before its watch was set; list again.
    Retry,
    Wait {
        predecessor: String,
        events: mpsc::UnboundedReceiver<WatchedEvent>,
    },
}

enum Reaction {
    Kill(KillReason),
    Rearm,
}

type PendingWatch = (
    mpsc::UnboundedReceiver<WatchedEvent>,
    broadcast::Receiver<SessionState>,
);

struct EngineInner<S> {
    id: String,
    kind: LockKind,
    parent_path: String,
    store: Arc<S>,
    identity: NodeIdentity,
    monitor: Arc<dyn LockMonitor>,
    executor: SerialExecutor,
    state: Mutex<EngineState>,
    closed: watch::Sender<bool>,
    /// Registered on our own node to observe deletion and content changes.
    node_watcher: Watcher,
    /// Receivers handed to the watch task once a node is established.
    pending_watch: Mutex<Option<PendingWatch>>,
}

/// One lock instance: a single attempt to own a lock, and the ownership
/// that follows.
pub(crate) struct LockEngine<S: CoordinationStore> {
    inner: Arc<EngineInner<S>>,
}

impl<S: CoordinationStore> LockEngine<S> {
    /// Creates an idle instance. Must be called within a tokio runtime.
    pub(crate) fn new(
        id: String,
        kind: LockKind,
        parent_path: String,
        store: Arc<S>,
        identity: NodeIdentity,
        monitor: Arc<dyn LockMonitor>,
    ) -> Self {
        let (node_watcher, node_events) = Watcher::channel();
        let session_events = store.session_events();
        let (closed, _) = watch::channel(false);
        let executor = SerialExecutor::spawn(&id);

        Self {
            inner: Arc::new(EngineInner {
                id,
                kind,
                parent_path,
                store,
                identity,
                monitor,
                executor,
                state: Mutex::new(EngineState::default()),
                closed,
                node_watcher,
                pending_watch: Mutex::new(Some((node_events, session_events))),
            }),
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.inner.id
    }

    pub(crate) fn kind(&self) -> LockKind {
        self.inner.kind
    }

    pub(crate) fn phase(&self) -> LockPhase {
        self.inner.state.lock().phase
    }

    pub(crate) fn lock_name(&self) -> Option<String> {
        self.inner.state.lock().my_lock_name.clone()
    }

    /// True iff this instance owns a node and that node heads the queue.
    pub(crate) fn is_valid(&self) -> bool {
        let state = self.inner.state.lock();
        !state.closed && state.my_lock_name.is_some() && state.my_lock_name == state.active_lock_name
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub(crate) fn recovery_key(&self) -> Option<String> {
        let state = self.inner.state.lock();
        self.inner.recovery_key_locked(&state)
    }

    pub(crate) fn lost_token(&self) -> watch::Receiver<bool> {
        self.inner.closed.subscribe()
    }

    /// Queues a new node and waits until it heads the queue.
    pub(crate) async fn acquire(&self, timeout: Option<Duration>) -> LockResult<()> {
        let timeout = TimeoutValue::from(timeout);
        let deadline = timeout.deadline_from(Instant::now());
        let establish = self.inner.clone().create_lock_node();
        self.run_attempt(timeout, deadline, establish).await
    }

    /// Reclaims an existing durable node and waits until it heads the queue.
    pub(crate) async fn recover(&self, key: RecoveryKey, timeout: Option<Duration>) -> LockResult<()> {
        let timeout = TimeoutValue::from(timeout);
        let deadline = timeout.deadline_from(Instant::now());
        let establish = self.inner.clone().recover_lock_node(key);
        self.run_attempt(timeout, deadline, establish).await
    }

    /// Releases the lock and waits for its node to be removed.
    pub(crate) async fn release(&self) -> LockResult<()> {
        self.kill(KillReason::RegularRelease).await
    }

    /// Releases the lock in the background.
    pub(crate) fn dispatch_release(&self) {
        self.inner.dispatch_kill(KillReason::RegularRelease);
    }

    /// Closes the instance without touching its node and returns the key
    /// that recovers it.
    pub(crate) async fn detach(&self) -> LockResult<Option<String>> {
        let inner = self.inner.clone();
        self.inner
            .executor
            .run(async move { Ok(inner.detach_lock()) })
            .await
    }

    /// Detaches the instance in the background.
    pub(crate) fn dispatch_detach(&self) {
        let inner = self.inner.clone();
        self.inner.executor.dispatch(async move {
            inner.detach_lock();
        });
    }

    pub(crate) async fn kill(&self, reason: KillReason) -> LockResult<()> {
        let inner = self.inner.clone();
        self.inner
            .executor
            .run(async move {
                inner.kill_lock(reason).await;
                Ok(())
            })
            .await
    }

    async fn run_attempt<F>(
        &self,
        timeout: TimeoutValue,
        deadline: Option<Instant>,
        establish: F,
    ) -> LockResult<()>
    where
        F: Future<Output = LockResult<()>> + Send + 'static,
    {
        let mut guard = AbandonGuard {
            inner: &self.inner,
            armed: true,
        };
        let result = async {
            with_deadline(deadline, timeout, self.inner.executor.run(establish)).await?;
            self.acquire_loop(timeout, deadline).await
        }
        .await;
        guard.armed = false;

        if let Err(error) = &result {
            debug!(lock.id = %self.inner.id, error = %error, "lock attempt failed");
            // Rejected preconditions never touched the store.
            if matches!(error, LockError::InvalidArgument(_)) {
                return result;
            }
            // The kill job queues behind any step still running, so a node
            // created after the deadline is still cleaned up.
            if let Err(kill_error) = self.kill(KillReason::AcquireFailed).await {
                warn!(lock.id = %self.inner.id, error = %kill_error, "failed to clean up lock attempt");
            }
        }
        result
    }

    async fn acquire_loop(&self, timeout: TimeoutValue, deadline: Option<Instant>) -> LockResult<()> {
        let mut closed = self.inner.closed.subscribe();
        loop {
            let check = self.inner.executor.run(self.inner.clone().check_turn());
            match with_deadline(deadline, timeout, check).await? {
                Turn::Acquired => return Ok(()),
                Turn::Retry => continue,
                Turn::Wait {
                    predecessor,
                    mut events,
                } => {
                    trace!(lock.id = %self.inner.id, lock.predecessor = %predecessor, "waiting for predecessor");
                    tokio::select! {
                        event = events.recv() => {
                            trace!(lock.id = %self.inner.id, ?event, "predecessor watch fired");
                        }
                        _ = wait_closed(&mut closed) => return Err(self.inner.killed_error()),
                        _ = sleep_until(deadline) => return Err(timeout_error(timeout)),
                    }
                }
            }
        }
    }
}

impl<S: CoordinationStore> EngineInner<S> {
    fn node_path(&self, lock_name: &str) -> String {
        format!("{}/{}", self.parent_path, lock_name)
    }

    fn create_mode(&self) -> CreateMode {
        match self.kind {
            LockKind::Exclusive => CreateMode::EphemeralSequential,
            LockKind::Durable => CreateMode::PersistentSequential,
        }
    }

    fn recovery_key_locked(&self, state: &EngineState) -> Option<String> {
        if !self.kind.is_recoverable() {
            return None;
        }
        match (&state.my_lock_name, &state.node_content) {
            (Some(name), Some(content)) => Some(RecoveryKey::new(name.as_str(), content.as_str()).to_string()),
            _ => None,
        }
    }

    fn info_locked(&self, state: &EngineState) -> LockInfo {
        LockInfo {
            id: self.id.clone(),
            kind: self.kind,
            lock_name: state.my_lock_name.clone(),
            recovery_key: self.recovery_key_locked(state),
        }
    }

    fn killed_error(&self) -> LockError {
        match self.state.lock().kill_reason {
            Some(KillReason::CoordinationDisconnect) => LockError::SessionLoss(format!(
                "lock {} lost its coordination session while queued",
                self.id
            )),
            Some(reason) => LockError::AcquisitionFailed(format!(
                "lock {} was killed while queued: {reason}",
                self.id
            )),
            None => LockError::AcquisitionFailed(format!("lock {} is closed", self.id)),
        }
    }

    /// Checks the preconditions shared by create and recover.
    fn begin(&self, phase: LockPhase) -> LockResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(LockError::AcquisitionFailed(format!(
                "lock {} instance is already closed",
                self.id
            )));
        }
        if state.my_lock_name.is_some() {
            return Err(LockError::InvalidArgument(format!(
                "lock {} instance already owns a lock node",
                self.id
            )));
        }
        state.phase = phase;
        Ok(())
    }

    async fn create_lock_node(self: Arc<Self>) -> LockResult<()> {
        self.begin(LockPhase::Creating)?;
        self.store.ensure_path(&self.parent_path).await?;

        let content = self.identity.generate();
        let prefix = self.node_path(LOCK_NODE_PREFIX);
        let path = self
            .store
            .create(&prefix, content.as_bytes(), self.create_mode())
            .await?;
        let lock_name = node_name(&path).to_string();
        debug!(lock.id = %self.id, lock.name = %lock_name, "created lock node");

        self.establish(lock_name, content).await
    }

    async fn recover_lock_node(self: Arc<Self>, key: RecoveryKey) -> LockResult<()> {
        if !self.kind.is_recoverable() {
            return Err(LockError::InvalidArgument(format!(
                "lock {} is not recoverable",
                self.id
            )));
        }
        self.begin(LockPhase::Recovering)?;

        let path = self.node_path(key.lock_name());
        let (data, stat) = match self.store.get_data(&path, None).await {
            Ok(found) => found,
            Err(StoreError::NoNode(_)) => {
                return Err(LockError::AcquisitionFailed(format!(
                    "lock node {path} no longer exists"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        if data != key.content().as_bytes() {
            return Err(LockError::AcquisitionFailed(format!(
                "lock node {path} does not match the recovery key"
            )));
        }

        // Writing a fresh key with the version we read fences off any other
        // process recovering the same node with the same key.
        let content = RecoveryKey::new(key.lock_name(), self.identity.generate()).to_string();
        match self
            .store
            .set_data(&path, content.as_bytes(), Some(stat.version))
            .await
        {
            Ok(_) => {}
            Err(StoreError::BadVersion(_)) => {
                return Err(LockError::AcquisitionFailed(format!(
                    "lock node {path} was recovered concurrently"
                )));
            }
            Err(StoreError::NoNode(_)) => {
                return Err(LockError::AcquisitionFailed(format!(
                    "lock node {path} was deleted during recovery"
                )));
            }
            Err(e) => return Err(e.into()),
        }
        debug!(lock.id = %self.id, lock.name = %key.lock_name(), "recovered lock node");

        self.establish(key.lock_name().to_string(), content).await
    }

    /// Records ownership of `lock_name` and starts watching it.
    async fn establish(self: &Arc<Self>, lock_name: String, content: String) -> LockResult<()> {
        {
            let mut state = self.state.lock();
            state.my_lock_name = Some(lock_name.clone());
            state.node_content = Some(content);
        }
        self.arm_node_watch(&lock_name).await?;
        self.spawn_watch_task();
        Ok(())
    }

    async fn arm_node_watch(&self, lock_name: &str) -> LockResult<()> {
        let path = self.node_path(lock_name);
        match self
            .store
            .exists(&path, Some(self.node_watcher.clone()))
            .await?
        {
            Some(_) => Ok(()),
            None => Err(LockError::AcquisitionFailed(format!(
                "lock node {path} vanished"
            ))),
        }
    }

    fn spawn_watch_task(self: &Arc<Self>) {
        let Some((events, session)) = self.pending_watch.lock().take() else {
            return;
        };
        let closed = self.closed.subscribe();
        tokio::spawn(watch_lock_node(Arc::downgrade(self), events, session, closed));
    }

    /// One pass over the queue: list, sort, and either take the lock or
    /// watch the immediate predecessor.
    async fn check_turn(self: Arc<Self>) -> LockResult<Turn> {
        let my_name = {
            let mut state = self.state.lock();
            if state.closed {
                drop(state);
                return Err(self.killed_error());
            }
            let name = state.my_lock_name.clone().ok_or_else(|| {
                LockError::AcquisitionFailed(format!("lock {} has no node to queue with", self.id))
            })?;
            state.phase = LockPhase::Acquiring;
            name
        };

        let mut contenders = self.store.children(&self.parent_path).await?;
        sort_lock_names(&mut contenders);
        let active = contenders.first().cloned();
        let is_head = active.as_deref() == Some(my_name.as_str());

        let first_acquisition = {
            let mut state = self.state.lock();
            state.active_lock_name = active;
            if is_head {
                state.phase = LockPhase::Held;
            }
            let first = is_head && !state.acquired_notified;
            if first {
                state.acquired_notified = true;
            }
            first.then(|| self.info_locked(&state))
        };

        if is_head {
            debug!(lock.id = %self.id, lock.name = %my_name, "lock acquired");
            if let Some(info) = first_acquisition {
                self.monitor.lock_acquired(&info);
            }
            return Ok(Turn::Acquired);
        }

        let predecessor = predecessor(&contenders, &my_name)
            .ok_or_else(|| {
                LockError::AcquisitionFailed(format!(
                    "lock node {my_name} is not queued under {}",
                    self.parent_path
                ))
            })?
            .to_string();

        let (watcher, events) = Watcher::channel();
        let predecessor_path = self.node_path(&predecessor);
        match self.store.exists(&predecessor_path, Some(watcher)).await? {
            Some(_) => Ok(Turn::Wait {
                predecessor,
                events,
            }),
            None => Ok(Turn::Retry),
        }
    }

    /// Tears the instance down. A no-op if it never owned a node or is
    /// already closed.
    async fn kill_lock(&self, reason: KillReason) {
        let lock_name = {
            let state = self.state.lock();
            if state.closed {
                return;
            }
            match &state.my_lock_name {
                Some(name) => name.clone(),
                None => return,
            }
        };

        let policy = reason.policy(self.kind.is_recoverable());
        debug!(
            lock.id = %self.id,
            lock.name = %lock_name,
            %reason,
            delete_node = policy.delete_node,
            "killing lock"
        );

        if policy.delete_node {
            let path = self.node_path(&lock_name);
            match self.store.delete(&path, None).await {
                Ok(()) => trace!(path = %path, "deleted lock node"),
                Err(StoreError::NoNode(_)) | Err(StoreError::SessionExpired) => {
                    trace!(path = %path, "lock node already gone");
                }
                Err(error) => {
                    warn!(path = %path, error = %error, "failed to delete lock node");
                }
            }
        }

        let info = {
            let mut state = self.state.lock();
            let info = self.info_locked(&state);
            state.closed = true;
            state.kill_reason = Some(reason);
            state.phase = match policy.notify {
                Notification::Released => LockPhase::Released,
                Notification::Lost => LockPhase::Killed,
            };
            state.my_lock_name = None;
            state.active_lock_name = None;
            info
        };

        match policy.notify {
            Notification::Released => self.monitor.lock_released(&info),
            Notification::Lost => self.monitor.lock_lost(&info),
        }
        self.closed.send_replace(true);
    }

    /// Closes a durable instance locally. The node, its content and its
    /// place in the queue are left for a later recovery, and no monitor
    /// callback fires.
    fn detach_lock(&self) -> Option<String> {
        let key = {
            let mut state = self.state.lock();
            if state.closed || !self.kind.is_recoverable() {
                return None;
            }
            let key = self.recovery_key_locked(&state)?;
            state.closed = true;
            state.phase = LockPhase::Detached;
            state.my_lock_name = None;
            state.active_lock_name = None;
            key
        };
        debug!(lock.id = %self.id, "detached lock node");
        self.closed.send_replace(true);
        Some(key)
    }

    fn dispatch_kill(self: &Arc<Self>, reason: KillReason) {
        let inner = self.clone();
        self.executor.dispatch(async move { inner.kill_lock(reason).await });
    }

    fn dispatch_rearm(self: &Arc<Self>) {
        let inner = self.clone();
        self.executor.dispatch(async move {
            let lock_name = {
                let state = inner.state.lock();
                if state.closed {
                    return;
                }
                state.my_lock_name.clone()
            };
            let Some(lock_name) = lock_name else {
                return;
            };
            match inner.arm_node_watch(&lock_name).await {
                Ok(()) => {}
                Err(LockError::AcquisitionFailed(_)) => inner.kill_lock(KillReason::LockDeleted).await,
                Err(error) => warn!(lock.id = %inner.id, error = %error, "failed to re-arm lock node watch"),
            }
        });
    }
}

/// Turns store notifications into kill requests on the instance's executor.
///
/// Holds only a weak reference so an abandoned instance can be dropped.
async fn watch_lock_node<S: CoordinationStore>(
    engine: Weak<EngineInner<S>>,
    mut events: mpsc::UnboundedReceiver<WatchedEvent>,
    mut session: broadcast::Receiver<SessionState>,
    mut closed: watch::Receiver<bool>,
) {
    let mut session_open = true;
    loop {
        let reaction = tokio::select! {
            _ = wait_closed(&mut closed) => break,
            event = events.recv() => match event {
                Some(event) => match event.kind {
                    WatchEventKind::NodeDeleted => Reaction::Kill(KillReason::LockDeleted),
                    WatchEventKind::NodeDataChanged => Reaction::Kill(KillReason::LockStolen),
                    WatchEventKind::NodeCreated => Reaction::Rearm,
                },
                None => break,
            },
            state = session.recv(), if session_open => match state {
                Ok(state) if state.is_terminal() => Reaction::Kill(KillReason::CoordinationDisconnect),
                Ok(state) => {
                    trace!(?state, "coordination session state changed");
                    continue;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "session events lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    session_open = false;
                    continue;
                }
            },
        };

        let Some(inner) = engine.upgrade() else {
            break;
        };
        match reaction {
            Reaction::Kill(reason) => inner.dispatch_kill(reason),
            Reaction::Rearm => inner.dispatch_rearm(),
        }
    }
    trace!("lock node watch stopped");
}

/// Kills an attempt whose future was dropped before it finished.
struct AbandonGuard<'a, S: CoordinationStore> {
    inner: &'a Arc<EngineInner<S>>,
    armed: bool,
}

impl<S: CoordinationStore> Drop for AbandonGuard<'_, S> {
    fn drop(&mut self) {
        if self.armed {
            debug!(lock.id = %self.inner.id, "lock attempt abandoned");
            self.inner.dispatch_kill(KillReason::AcquireFailed);
        }
    }
}

async fn with_deadline<T>(
    deadline: Option<Instant>,
    timeout: TimeoutValue,
    future: impl Future<Output = LockResult<T>>,
) -> LockResult<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future)
            .await
            .map_err(|_| timeout_error(timeout))?,
        None => future.await,
    }
}

fn timeout_error(timeout: TimeoutValue) -> LockError {
    LockError::Timeout(timeout.as_duration().unwrap_or_default())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Resolves once the instance is closed (or can no longer report it).
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use coordination_lock_core::error::StoreResult;
    use coordination_lock_core::monitor::NoopMonitor;
    use coordination_lock_core::store::NodeStat;
    use coordination_lock_memory::{MemorySession, MemoryStore};

    /// Session whose listings never include the lock nodes it created.
    struct HidingSession {
        session: MemorySession,
        created: Mutex<Vec<String>>,
        children_calls: AtomicUsize,
    }

    impl HidingSession {
        fn new(session: MemorySession) -> Self {
            Self {
                session,
                created: Mutex::new(Vec::new()),
                children_calls: AtomicUsize::new(0),
            }
        }
    }

    impl CoordinationStore for HidingSession {
        async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> StoreResult<String> {
            let created = self.session.create(path, data, mode).await?;
            if mode.is_sequential() {
                self.created.lock().push(node_name(&created).to_string());
            }
            Ok(created)
        }

        async fn exists(&self, path: &str, watcher: Option<Watcher>) -> StoreResult<Option<NodeStat>> {
            self.session.exists(path, watcher).await
        }

        async fn children(&self, path: &str) -> StoreResult<Vec<String>> {
            self.children_calls.fetch_add(1, Ordering::SeqCst);
            let mut names = self.session.children(path).await?;
            let created = self.created.lock();
            names.retain(|name| !created.contains(name));
            Ok(names)
        }

        async fn delete(&self, path: &str, version: Option<i32>) -> StoreResult<()> {
            self.session.delete(path, version).await
        }

        async fn get_data(
            &self,
            path: &str,
            watcher: Option<Watcher>,
        ) -> StoreResult<(Vec<u8>, NodeStat)> {
            self.session.get_data(path, watcher).await
        }

        async fn set_data(&self, path: &str, data: &[u8], version: Option<i32>) -> StoreResult<NodeStat> {
            self.session.set_data(path, data, version).await
        }

        fn session_events(&self) -> broadcast::Receiver<SessionState> {
            self.session.session_events()
        }
    }

    #[derive(Default)]
    struct CountingMonitor {
        lost: AtomicUsize,
        released: AtomicUsize,
    }

    impl LockMonitor for CountingMonitor {
        fn lock_released(&self, _lock: &LockInfo) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }

        fn lock_lost(&self, _lock: &LockInfo) {
            self.lost.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn engine(store: &MemoryStore, kind: LockKind) -> LockEngine<MemorySession> {
        LockEngine::new(
            "unit".to_string(),
            kind,
            "/locks/unit".to_string(),
            Arc::new(store.connect()),
            NodeIdentity::new("unit", "local").unwrap(),
            Arc::new(NoopMonitor),
        )
    }

    #[tokio::test]
    async fn test_instance_owns_at_most_one_node() {
        let store = MemoryStore::new();
        let engine = engine(&store, LockKind::Exclusive);

        engine.acquire(None).await.unwrap();
        assert_eq!(engine.phase(), LockPhase::Held);
        let first = engine.lock_name();

        let again = engine.acquire(None).await;
        assert!(matches!(again, Err(LockError::InvalidArgument(_))));
        assert!(engine.is_valid());
        assert_eq!(engine.lock_name(), first);
    }

    #[tokio::test]
    async fn test_kill_without_node_is_a_no_op() {
        let store = MemoryStore::new();
        let engine = engine(&store, LockKind::Durable);

        engine.kill(KillReason::RegularRelease).await.unwrap();
        assert!(!engine.is_closed());
        assert_eq!(engine.phase(), LockPhase::Idle);
        assert!(!*engine.lost_token().borrow());
    }

    #[tokio::test]
    async fn test_closed_instance_cannot_be_reused() {
        let store = MemoryStore::new();
        let engine = engine(&store, LockKind::Durable);

        engine.acquire(Some(Duration::from_secs(1))).await.unwrap();
        assert!(engine.recovery_key().is_some());
        engine.release().await.unwrap();
        assert_eq!(engine.phase(), LockPhase::Released);
        assert!(engine.recovery_key().is_none());

        let result = engine.acquire(None).await;
        assert!(matches!(result, Err(LockError::AcquisitionFailed(_))));
    }

    #[tokio::test]
    async fn test_node_missing_from_listing_fails_without_retry() {
        let store = MemoryStore::new();
        let observer = store.connect();
        let session = Arc::new(HidingSession::new(store.connect()));
        let monitor = Arc::new(CountingMonitor::default());
        let engine = LockEngine::new(
            "unit".to_string(),
            LockKind::Exclusive,
            "/locks/unit".to_string(),
            session.clone(),
            NodeIdentity::new("unit", "local").unwrap(),
            monitor.clone(),
        );

        let result = engine.acquire(Some(Duration::from_secs(1))).await;

        assert!(matches!(result, Err(LockError::AcquisitionFailed(_))), "got {result:?}");
        assert_eq!(session.children_calls.load(Ordering::SeqCst), 1);
        assert!(observer.children("/locks/unit").await.unwrap().is_empty());
        assert_eq!(monitor.lost.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.released.load(Ordering::SeqCst), 0);
        assert_eq!(engine.phase(), LockPhase::Killed);
    }

    #[tokio::test]
    async fn test_detach_keeps_durable_node() {
        let store = MemoryStore::new();
        let observer = store.connect();
        let engine = engine(&store, LockKind::Durable);

        engine.acquire(None).await.unwrap();
        let lock_name = engine.lock_name().unwrap();
        let key = engine.recovery_key();

        assert_eq!(engine.detach().await.unwrap(), key);
        assert_eq!(engine.phase(), LockPhase::Detached);
        assert!(engine.is_closed());
        assert!(*engine.lost_token().borrow());
        assert_eq!(
            observer.children("/locks/unit").await.unwrap(),
            vec![lock_name]
        );

        // Already closed, so a second detach has nothing to hand back.
        assert_eq!(engine.detach().await.unwrap(), None);
    }
}
