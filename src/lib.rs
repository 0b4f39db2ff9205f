//! Coordination-store locks with the in-process backend bundled.
//!
//! Hosts the workspace's integration tests, benches and demos.

pub use coordination_lock::*;
pub use coordination_lock_memory as memory;
