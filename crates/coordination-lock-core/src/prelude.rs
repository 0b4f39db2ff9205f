//! Convenience prelude for distributed lock types.

pub use crate::error::{LockError, LockResult, StoreError, StoreResult};
pub use crate::monitor::{LockInfo, LockKind, LockMonitor, NoopMonitor};
pub use crate::store::{
    CoordinationStore, CreateMode, NodeStat, SessionState, WatchEventKind, WatchedEvent, Watcher,
};
pub use crate::traits::{DistributedLock, LockHandle, LockProvider, LockProviderExt};
