//! Distributed mutual-exclusion locks on a ZooKeeper-style coordination store.
//!
//! Contenders for a lock create sequential nodes under
//! `<root_path>/<lock id>`; the lowest sequence holds the lock and every
//! other contender watches only its immediate predecessor. Two kinds of
//! lock are available:
//!
//! - **Exclusive** locks use ephemeral nodes and die with the store session.
//! - **Durable** locks use persistent nodes. A handle exposes a recovery key
//!   that a restarted process can present to resume ownership of the same
//!   node without re-queueing behind newer contenders.
//!
//! Holders learn about lock loss through the handle's lost token and through
//! an optional [`LockMonitor`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use coordination_lock::{CoordinationLockProvider, LockHandle, NoopMonitor};
//! use coordination_lock_memory::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryStore::new();
//!     let provider = CoordinationLockProvider::builder()
//!         .store(store.connect())
//!         .node_id("worker-1")
//!         .build()?;
//!
//!     let handle = provider
//!         .acquire_durable_lock("nightly-report", Arc::new(NoopMonitor), Some(Duration::from_secs(5)))
//!         .await?;
//!
//!     // Persist this somewhere that survives a restart.
//!     let key = handle.recovery_key();
//!     println!("holding {:?}, recovery key {:?}", handle.lock_name(), key);
//!
//!     handle.release().await?;
//!     Ok(())
//! }
//! ```

mod engine;
mod executor;
pub mod handle;
pub mod kill;
pub mod lock;
pub mod name;
pub mod options;
pub mod provider;
pub mod recovery;

pub use coordination_lock_core::*;
pub use engine::LockPhase;
pub use handle::CoordinationLockHandle;
pub use kill::{KillPolicy, KillReason, Notification};
pub use lock::CoordinationLock;
pub use options::{CoordinationLockOptions, DEFAULT_ROOT_PATH};
pub use provider::{CoordinationLockProvider, CoordinationLockProviderBuilder};
pub use recovery::{NodeIdentity, RecoveryKey};
