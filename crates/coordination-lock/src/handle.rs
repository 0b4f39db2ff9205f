//! Handle for a held coordination lock.

use std::fmt;

use coordination_lock_core::error::LockResult;
use coordination_lock_core::monitor::LockKind;
use coordination_lock_core::store::CoordinationStore;
use coordination_lock_core::traits::LockHandle;
use tokio::sync::watch;
use tracing::instrument;

use crate::engine::{LockEngine, LockPhase};

/// Handle to a held coordination lock.
///
/// Dropping the handle of an exclusive lock releases it. Dropping the handle
/// of a durable lock only closes it locally: the node stays queued so the
/// lock can be recovered with its [`recovery_key`](Self::recovery_key).
/// Call [`release`](LockHandle::release) to delete the node and wait for it.
pub struct CoordinationLockHandle<S: CoordinationStore> {
    engine: LockEngine<S>,
    lost_token: watch::Receiver<bool>,
    released: bool,
}

impl<S: CoordinationStore> CoordinationLockHandle<S> {
    pub(crate) fn new(engine: LockEngine<S>) -> Self {
        let lost_token = engine.lost_token();
        Self {
            engine,
            lost_token,
            released: false,
        }
    }

    pub fn id(&self) -> &str {
        self.engine.id()
    }

    pub fn kind(&self) -> LockKind {
        self.engine.kind()
    }

    pub fn phase(&self) -> LockPhase {
        self.engine.phase()
    }

    /// Name of the owned lock node, or `None` once the lock is closed.
    pub fn lock_name(&self) -> Option<String> {
        self.engine.lock_name()
    }

    /// Returns `true` while this handle's node heads the lock queue and the
    /// lock has not been lost or released.
    pub fn is_valid(&self) -> bool {
        self.engine.is_valid()
    }

    /// Returns `true` once the lock has been lost or released.
    pub fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    /// Token to persist for [`recover`](crate::CoordinationLock::recover)
    /// after a restart. Always `None` for exclusive locks.
    pub fn recovery_key(&self) -> Option<String> {
        self.engine.recovery_key()
    }

    /// Steps away from a durable lock without deleting its node and returns
    /// the key that recovers it. Exclusive locks are released instead and
    /// yield `None`.
    #[instrument(skip(self), fields(lock.id = %self.engine.id(), backend = "coordination"))]
    pub async fn detach(mut self) -> LockResult<Option<String>> {
        self.released = true;
        match self.engine.kind() {
            LockKind::Durable => self.engine.detach().await,
            LockKind::Exclusive => self.engine.release().await.map(|()| None),
        }
    }
}

impl<S: CoordinationStore> LockHandle for CoordinationLockHandle<S> {
    fn lost_token(&self) -> &watch::Receiver<bool> {
        &self.lost_token
    }

    #[instrument(skip(self), fields(lock.id = %self.engine.id(), backend = "coordination"))]
    async fn release(mut self) -> LockResult<()> {
        self.released = true;
        self.engine.release().await
    }
}

impl<S: CoordinationStore> Drop for CoordinationLockHandle<S> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.engine.kind() {
            LockKind::Durable => self.engine.dispatch_detach(),
            LockKind::Exclusive => self.engine.dispatch_release(),
        }
    }
}

impl<S: CoordinationStore> fmt::Debug for CoordinationLockHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinationLockHandle")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("lock_name", &self.lock_name())
            .field("phase", &self.phase())
            .finish()
    }
}
