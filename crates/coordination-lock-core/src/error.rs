//! Error types for coordination-store locks.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by a coordination store client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The node does not exist.
    #[error("node does not exist: {0}")]
    NoNode(String),

    /// The node already exists.
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// A version-checked write or delete saw a different version.
    #[error("version mismatch on node: {0}")]
    BadVersion(String),

    /// The node still has children.
    #[error("node has children: {0}")]
    NotEmpty(String),

    /// The request itself was malformed (bad path, etc.).
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// The client session has expired or was closed.
    #[error("coordination session expired")]
    SessionExpired,

    /// The connection to the store is currently down.
    #[error("connection to coordination store lost: {0}")]
    ConnectionLoss(String),
}

/// Result type for coordination store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Lock acquisition timed out.
    #[error("lock acquisition timed out after {0:?}")]
    Timeout(Duration),

    /// Lock operation was cancelled.
    #[error("lock operation was cancelled")]
    Cancelled,

    /// A lock identifier, recovery key, or configuration value was rejected
    /// before any store call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The acquisition protocol could not complete.
    ///
    /// Raised when the lock queue is inconsistent (our node has no
    /// predecessor and is not the head), when a recovery key no longer
    /// matches its node, or when the lock is killed while still queued.
    #[error("lock acquisition failed: {0}")]
    AcquisitionFailed(String),

    /// The coordination store reported that our session is gone.
    #[error("coordination session lost: {0}")]
    SessionLoss(String),

    /// Transient or unexpected store error.
    #[error("coordination store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

impl From<StoreError> for LockError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::SessionExpired => {
                LockError::SessionLoss("coordination session expired".to_string())
            }
            other => LockError::StoreUnavailable(other),
        }
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry_maps_to_session_loss() {
        let error: LockError = StoreError::SessionExpired.into();
        assert!(matches!(error, LockError::SessionLoss(_)));
    }

    #[test]
    fn test_other_store_errors_are_unavailable() {
        let error: LockError = StoreError::ConnectionLoss("reset".to_string()).into();
        match error {
            LockError::StoreUnavailable(StoreError::ConnectionLoss(msg)) => assert_eq!(msg, "reset"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
