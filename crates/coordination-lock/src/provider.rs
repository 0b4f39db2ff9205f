//! Lock service facade.

use std::sync::Arc;
use std::time::Duration;

use coordination_lock_core::error::{LockError, LockResult};
use coordination_lock_core::monitor::{LockKind, LockMonitor};
use coordination_lock_core::store::CoordinationStore;
use coordination_lock_core::traits::{DistributedLock, LockProvider};

use crate::handle::CoordinationLockHandle;
use crate::lock::CoordinationLock;
use crate::name::validate_lock_id;
use crate::options::CoordinationLockOptions;
use crate::recovery::NodeIdentity;

/// Builder for coordination lock provider configuration.
pub struct CoordinationLockProviderBuilder<S> {
    store: Option<Arc<S>>,
    options: CoordinationLockOptions,
}

impl<S: CoordinationStore> CoordinationLockProviderBuilder<S> {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            store: None,
            options: CoordinationLockOptions::default(),
        }
    }

    /// Sets the store session every lock of the provider uses.
    pub fn store(self, store: S) -> Self {
        self.shared_store(Arc::new(store))
    }

    /// Sets a store session shared with other components.
    pub fn shared_store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces every option at once.
    pub fn options(mut self, options: CoordinationLockOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the namespace node under which lock ids are created.
    pub fn root_path(mut self, root_path: impl Into<String>) -> Self {
        self.options.root_path = root_path.into();
        self
    }

    pub fn node_id(mut self, node_id: impl Into<String>) -> Self {
        self.options.node_id = node_id.into();
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.options.location = location.into();
        self
    }

    /// Sets the deadline for recovering a durable lock.
    pub fn recovery_timeout(mut self, timeout: Duration) -> Self {
        self.options.recovery_timeout = timeout;
        self
    }

    /// Builds the provider.
    pub fn build(self) -> LockResult<CoordinationLockProvider<S>> {
        let store = self
            .store
            .ok_or_else(|| LockError::InvalidArgument("store not specified".to_string()))?;
        self.options.validate()?;
        let identity = NodeIdentity::new(&self.options.node_id, &self.options.location)?;

        Ok(CoordinationLockProvider {
            store,
            options: self.options,
            identity,
        })
    }
}

impl<S: CoordinationStore> Default for CoordinationLockProviderBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider for coordination-store locks.
///
/// Holds one shared store session; every lock it creates queues under
/// `<root_path>/<id>`.
pub struct CoordinationLockProvider<S> {
    store: Arc<S>,
    options: CoordinationLockOptions,
    identity: NodeIdentity,
}

impl<S: CoordinationStore> CoordinationLockProvider<S> {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> CoordinationLockProviderBuilder<S> {
        CoordinationLockProviderBuilder::new()
    }

    /// Creates a provider with default options.
    pub fn new(store: S) -> LockResult<Self> {
        Self::builder().store(store).build()
    }

    pub fn options(&self) -> &CoordinationLockOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn lock(&self, id: &str, kind: LockKind) -> LockResult<CoordinationLock<S>> {
        validate_lock_id(id)?;
        Ok(CoordinationLock::new(
            id.to_string(),
            kind,
            self.options.lock_parent_path(id),
            self.store.clone(),
            self.identity.clone(),
            self.options.recovery_timeout,
        ))
    }

    /// Creates a durable lock whose node survives the session.
    pub fn create_durable_lock(&self, id: &str) -> LockResult<CoordinationLock<S>> {
        self.lock(id, LockKind::Durable)
    }

    /// Acquires an exclusive lock that dies with the store session.
    ///
    /// `None` or a zero timeout waits indefinitely.
    pub async fn acquire_exclusive_lock(
        &self,
        id: &str,
        monitor: Arc<dyn LockMonitor>,
        timeout: Option<Duration>,
    ) -> LockResult<CoordinationLockHandle<S>> {
        self.lock(id, LockKind::Exclusive)?
            .with_monitor(monitor)
            .acquire(timeout)
            .await
    }

    /// Acquires a durable lock. Persist the handle's
    /// [`recovery_key`](CoordinationLockHandle::recovery_key) to resume
    /// ownership after a restart.
    pub async fn acquire_durable_lock(
        &self,
        id: &str,
        monitor: Arc<dyn LockMonitor>,
        timeout: Option<Duration>,
    ) -> LockResult<CoordinationLockHandle<S>> {
        self.create_durable_lock(id)?
            .with_monitor(monitor)
            .acquire(timeout)
            .await
    }

    /// Resumes ownership of a durable lock from a recovery key.
    pub async fn recover_durable_lock(
        &self,
        id: &str,
        monitor: Arc<dyn LockMonitor>,
        recovery_key: &str,
    ) -> LockResult<CoordinationLockHandle<S>> {
        self.create_durable_lock(id)?
            .with_monitor(monitor)
            .recover(recovery_key)
            .await
    }
}

impl<S: CoordinationStore> LockProvider for CoordinationLockProvider<S> {
    type Lock = CoordinationLock<S>;

    fn create_lock(&self, name: &str) -> LockResult<Self::Lock> {
        self.lock(name, LockKind::Exclusive)
    }
}
