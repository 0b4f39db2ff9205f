//! Core traits and types for coordination-store distributed locks.

pub mod error;
pub mod monitor;
pub mod prelude;
pub mod store;
pub mod timeout;
pub mod traits;

pub use error::{LockError, LockResult, StoreError, StoreResult};
pub use prelude::*;
