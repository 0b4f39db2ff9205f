//! Provider configuration.

use std::time::Duration;

use coordination_lock_core::error::{LockError, LockResult};

/// Default namespace node under which every lock lives.
pub const DEFAULT_ROOT_PATH: &str = "/locks";

/// Options shared by every lock created from one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationLockOptions {
    /// Namespace node; each lock id gets a child `<root_path>/<id>`.
    pub root_path: String,
    /// First component of the identity written into lock nodes.
    pub node_id: String,
    /// Second component of the identity written into lock nodes.
    pub location: String,
    /// Upper bound on a durable-lock recovery, including the queue wait.
    pub recovery_timeout: Duration,
}

impl Default for CoordinationLockOptions {
    fn default() -> Self {
        Self {
            root_path: DEFAULT_ROOT_PATH.to_string(),
            node_id: std::process::id().to_string(),
            location: "local".to_string(),
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CoordinationLockOptions {
    /// Returns the parent path of every contender node for `id`.
    pub fn lock_parent_path(&self, id: &str) -> String {
        if self.root_path == "/" {
            format!("/{id}")
        } else {
            format!("{}/{}", self.root_path, id)
        }
    }

    pub(crate) fn validate(&self) -> LockResult<()> {
        let root = &self.root_path;
        let malformed = !root.starts_with('/')
            || (root.len() > 1 && root.ends_with('/'))
            || root.contains("//");
        if malformed {
            return Err(LockError::InvalidArgument(format!(
                "root path '{root}' must be absolute without a trailing '/'"
            )));
        }
        if self.recovery_timeout.is_zero() {
            return Err(LockError::InvalidArgument(
                "recovery timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
