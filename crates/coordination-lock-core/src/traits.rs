//! Core traits for distributed locks.

use std::future::Future;
use std::time::Duration;

use crate::error::LockResult;

// ============================================================================
// Lock Handle Trait
// ============================================================================

/// Handle to a held distributed lock.
///
/// Dropping this handle releases the lock. For proper error handling in async
/// contexts, call `release()` explicitly.
///
/// # Example
///
/// ```rust,ignore
/// let handle = lock.acquire(None).await?;
/// // Critical section - we hold the lock
/// do_work().await;
/// // Explicit release with error handling
/// handle.release().await?;
/// ```
pub trait LockHandle: Send + Sync + Sized {
    /// Returns a receiver that signals when the lock is lost.
    ///
    /// The receiver yields `true` once the lock is no longer held, whether
    /// because the coordination session ended, the lock node was deleted or
    /// overwritten by someone else, or the lock was released.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let mut lost = handle.lost_token().clone();
    /// tokio::select! {
    ///     _ = lost.wait_for(|lost| *lost) => {
    ///         eprintln!("Lock was lost!");
    ///     }
    ///     _ = do_work() => {
    ///         // Work completed while still holding lock
    ///     }
    /// }
    /// ```
    fn lost_token(&self) -> &tokio::sync::watch::Receiver<bool>;

    /// Explicitly releases the lock.
    ///
    /// This is also triggered on drop, but the async version waits for the
    /// lock node to be removed.
    fn release(self) -> impl Future<Output = LockResult<()>> + Send;
}

// ============================================================================
// Distributed Lock Trait
// ============================================================================

/// A distributed mutual exclusion lock.
///
/// Provides exclusive access to a resource identified by `name` across
/// processes and machines. Contenders are queued and served in the order
/// the coordination store sequenced their requests.
///
/// # Example
///
/// ```rust,ignore
/// use coordination_lock_core::DistributedLock;
///
/// async fn protected_operation(lock: &impl DistributedLock) -> Result<(), Error> {
///     // Acquire with 5 second timeout
///     let handle = lock.acquire(Some(Duration::from_secs(5))).await?;
///
///     // We have exclusive access
///     perform_critical_section().await?;
///
///     handle.release().await?;
///     Ok(())
/// }
/// ```
pub trait DistributedLock: Send + Sync {
    /// The handle type returned when the lock is acquired.
    type Handle: LockHandle + Send;

    /// Returns the unique name identifying this lock.
    fn name(&self) -> &str;

    /// Acquires the lock, waiting up to `timeout`.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time to wait. `None` or zero means wait indefinitely.
    ///
    /// # Returns
    ///
    /// * `Ok(handle)` - Lock acquired successfully
    /// * `Err(LockError::Timeout)` - Timeout expired before lock acquired
    /// * `Err(LockError::AcquisitionFailed)` - The lock queue was inconsistent
    ///   or the attempt was killed while waiting
    /// * `Err(LockError::StoreUnavailable)` - Backend connection failed
    ///
    /// # Cancellation
    ///
    /// Dropping the returned future abandons the attempt; the queued lock
    /// node is removed in the background.
    fn acquire(
        &self,
        timeout: Option<Duration>,
    ) -> impl Future<Output = LockResult<Self::Handle>> + Send;
}

// ============================================================================
// Provider Traits
// ============================================================================

/// Factory for creating distributed locks by name.
///
/// Providers encapsulate backend configuration, allowing application code
/// to be backend-agnostic.
///
/// # Example
///
/// ```rust,ignore
/// // Configure once at startup
/// let provider = CoordinationLockProvider::new(session)?;
///
/// // Create locks by name anywhere in the application
/// let lock = provider.create_lock("my-resource")?;
/// let handle = lock.acquire(None).await?;
/// ```
pub trait LockProvider: Send + Sync {
    /// The lock type created by this provider.
    type Lock: DistributedLock;

    /// Creates a lock with the given name.
    ///
    /// Fails with `LockError::InvalidArgument` if the name is not a safe
    /// lock identifier.
    fn create_lock(&self, name: &str) -> LockResult<Self::Lock>;
}

// ============================================================================
// Convenience Extensions
// ============================================================================

/// Extension trait providing convenience methods for lock providers.
pub trait LockProviderExt: LockProvider {
    /// Acquires a lock by name, returning the handle.
    ///
    /// Convenience method combining `create_lock` and `acquire`.
    fn acquire_lock(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> impl Future<Output = LockResult<<Self::Lock as DistributedLock>::Handle>> + Send
    where
        Self: Sync,
    {
        async move {
            let lock = self.create_lock(name)?;
            lock.acquire(timeout).await
        }
    }
}

// Blanket implementation for all LockProviders
impl<T: LockProvider> LockProviderExt for T {}
