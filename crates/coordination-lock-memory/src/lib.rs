//! In-process coordination store backend.
//!
//! Implements [`CoordinationStore`](coordination_lock_core::store::CoordinationStore)
//! without an external service: sequential, ephemeral and persistent nodes,
//! version-checked writes, one-shot watches and session expiry all behave as
//! they would against a ZooKeeper-style ensemble, which makes this backend
//! suitable for tests, demos and single-process deployments.

pub mod session;
pub mod store;
mod tree;

pub use session::{MemorySession, SessionStats};
pub use store::MemoryStore;
