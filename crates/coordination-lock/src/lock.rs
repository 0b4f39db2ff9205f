//! Coordination-store lock implementation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use coordination_lock_core::error::LockResult;
use coordination_lock_core::monitor::{LockKind, LockMonitor, NoopMonitor};
use coordination_lock_core::store::CoordinationStore;
use coordination_lock_core::traits::DistributedLock;
use tracing::{Span, field, instrument};

use crate::engine::LockEngine;
use crate::handle::CoordinationLockHandle;
use crate::recovery::{NodeIdentity, RecoveryKey};

/// A named lock backed by sequential nodes in a coordination store.
///
/// Each call to [`acquire`](DistributedLock::acquire) or
/// [`recover`](Self::recover) starts a fresh lock instance with its own
/// node; the lock value itself holds only configuration and can be reused.
pub struct CoordinationLock<S: CoordinationStore> {
    id: String,
    kind: LockKind,
    parent_path: String,
    store: Arc<S>,
    identity: NodeIdentity,
    monitor: Arc<dyn LockMonitor>,
    recovery_timeout: Duration,
}

impl<S: CoordinationStore> CoordinationLock<S> {
    pub(crate) fn new(
        id: String,
        kind: LockKind,
        parent_path: String,
        store: Arc<S>,
        identity: NodeIdentity,
        recovery_timeout: Duration,
    ) -> Self {
        Self {
            id,
            kind,
            parent_path,
            store,
            identity,
            monitor: Arc::new(NoopMonitor),
            recovery_timeout,
        }
    }

    /// Sets the monitor notified about every instance of this lock.
    pub fn with_monitor(mut self, monitor: Arc<dyn LockMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn kind(&self) -> LockKind {
        self.kind
    }

    /// Path of the node under which contenders queue.
    pub fn parent_path(&self) -> &str {
        &self.parent_path
    }

    fn instance(&self) -> LockEngine<S> {
        LockEngine::new(
            self.id.clone(),
            self.kind,
            self.parent_path.clone(),
            self.store.clone(),
            self.identity.clone(),
            self.monitor.clone(),
        )
    }

    /// Resumes ownership of a durable lock node after a restart.
    ///
    /// The key must match the node's current content. On success the node
    /// holds a new key, available from the returned handle; the old key is
    /// no longer valid. The call is bounded by the provider's recovery
    /// timeout, which also covers waiting for the node to reach the head of
    /// the queue.
    ///
    /// # Errors
    ///
    /// * `LockError::InvalidArgument` - malformed key, or the lock is not durable
    /// * `LockError::AcquisitionFailed` - the node is gone or the key is stale
    /// * `LockError::Timeout` - the recovery timeout expired
    #[instrument(
        skip(self, recovery_key),
        fields(lock.id = %self.id, lock.kind = %self.kind, backend = "coordination", acquired = field::Empty, lock.name = field::Empty)
    )]
    pub async fn recover(&self, recovery_key: &str) -> LockResult<CoordinationLockHandle<S>> {
        let key = RecoveryKey::parse(recovery_key)?;
        let engine = self.instance();
        match engine.recover(key, Some(self.recovery_timeout)).await {
            Ok(()) => {
                Span::current().record("acquired", true);
                if let Some(name) = engine.lock_name() {
                    Span::current().record("lock.name", name.as_str());
                }
                Ok(CoordinationLockHandle::new(engine))
            }
            Err(e) => {
                Span::current().record("acquired", false);
                Err(e)
            }
        }
    }
}

impl<S: CoordinationStore> DistributedLock for CoordinationLock<S> {
    type Handle = CoordinationLockHandle<S>;

    fn name(&self) -> &str {
        &self.id
    }

    #[instrument(
        skip(self),
        fields(lock.id = %self.id, lock.kind = %self.kind, timeout = ?timeout, backend = "coordination", acquired = field::Empty, elapsed_ms = field::Empty, lock.name = field::Empty)
    )]
    async fn acquire(&self, timeout: Option<Duration>) -> LockResult<Self::Handle> {
        let start = Instant::now();
        let engine = self.instance();
        let result = engine.acquire(timeout).await;

        Span::current().record("elapsed_ms", start.elapsed().as_millis() as u64);
        match result {
            Ok(()) => {
                Span::current().record("acquired", true);
                if let Some(name) = engine.lock_name() {
                    Span::current().record("lock.name", name.as_str());
                }
                Ok(CoordinationLockHandle::new(engine))
            }
            Err(e) => {
                Span::current().record("acquired", false);
                Err(e)
            }
        }
    }
}
