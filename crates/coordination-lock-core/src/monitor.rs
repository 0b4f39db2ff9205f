//! Lock lifecycle callbacks.

use std::fmt;

/// Whether a lock's node outlives the session that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// Ephemeral node; the lock dies with the session.
    Exclusive,
    /// Persistent node; the lock can be recovered after a restart.
    Durable,
}

impl LockKind {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Durable)
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exclusive => f.write_str("exclusive"),
            Self::Durable => f.write_str("durable"),
        }
    }
}

/// Snapshot of a lock passed to [`LockMonitor`] callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    /// Caller-supplied lock identifier.
    pub id: String,
    pub kind: LockKind,
    /// Name of the lock node this instance owned, e.g. `lock-0000000004`.
    pub lock_name: Option<String>,
    /// Recovery key at the time of the callback (durable locks only).
    pub recovery_key: Option<String>,
}

/// Receives lock lifecycle notifications.
///
/// Each callback is invoked at most once per lock instance, and callbacks
/// for the same instance never run concurrently. They run on the lock's
/// serialized executor, so implementations must return promptly.
pub trait LockMonitor: Send + Sync + 'static {
    /// The lock became held.
    fn lock_acquired(&self, _lock: &LockInfo) {}

    /// The lock was given up by its owner.
    fn lock_released(&self, _lock: &LockInfo) {}

    /// The lock was taken away: session loss, external deletion, a steal,
    /// or a failed acquisition.
    fn lock_lost(&self, _lock: &LockInfo) {}
}

/// Monitor that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl LockMonitor for NoopMonitor {}
