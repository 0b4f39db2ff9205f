//! Kill reasons and the teardown policy table.

use std::fmt;

/// Why a lock instance is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KillReason {
    /// The coordination session expired or was closed.
    CoordinationDisconnect,
    /// The lock node was deleted by someone else.
    LockDeleted,
    /// The lock node's content was overwritten by someone else.
    LockStolen,
    /// The owner released the lock.
    RegularRelease,
    /// Acquisition or recovery failed, timed out or was abandoned.
    AcquireFailed,
}

/// Which monitor callback a kill ends with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notification {
    Released,
    Lost,
}

/// What the kill procedure does for a given reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KillPolicy {
    /// Whether the lock node is deleted from the store.
    pub delete_node: bool,
    pub notify: Notification,
}

impl KillReason {
    pub const ALL: [KillReason; 5] = [
        KillReason::CoordinationDisconnect,
        KillReason::LockDeleted,
        KillReason::LockStolen,
        KillReason::RegularRelease,
        KillReason::AcquireFailed,
    ];

    /// Looks up the teardown policy for this reason.
    ///
    /// | Reason                 | Delete node?            | Notify as |
    /// |------------------------|-------------------------|-----------|
    /// | RegularRelease         | yes                     | released  |
    /// | LockDeleted            | no (already gone)       | lost      |
    /// | LockStolen             | no (someone else's now) | lost      |
    /// | AcquireFailed          | yes                     | lost      |
    /// | CoordinationDisconnect | only if not recoverable | lost      |
    ///
    /// A disconnect only ever arrives from the session watch, never from an
    /// explicit release, so it always notifies lost.
    pub fn policy(self, recoverable: bool) -> KillPolicy {
        match self {
            KillReason::RegularRelease => KillPolicy {
                delete_node: true,
                notify: Notification::Released,
            },
            KillReason::LockDeleted | KillReason::LockStolen => KillPolicy {
                delete_node: false,
                notify: Notification::Lost,
            },
            KillReason::AcquireFailed => KillPolicy {
                delete_node: true,
                notify: Notification::Lost,
            },
            KillReason::CoordinationDisconnect => KillPolicy {
                delete_node: !recoverable,
                notify: Notification::Lost,
            },
        }
    }
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            KillReason::CoordinationDisconnect => "coordination session lost",
            KillReason::LockDeleted => "lock node deleted",
            KillReason::LockStolen => "lock node content changed",
            KillReason::RegularRelease => "lock released",
            KillReason::AcquireFailed => "acquisition failed",
        };
        f.write_str(text)
    }
}
