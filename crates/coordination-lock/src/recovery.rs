//! Recovery keys and lock-node identity content.

use std::fmt;
use std::str::FromStr;

use coordination_lock_core::error::{LockError, LockResult};
use rand::Rng;

use crate::name::is_lock_node_name;

/// Separator between the lock name and the node content in a recovery key.
pub const RECOVERY_KEY_SEPARATOR: char = '_';

/// Token that lets a restarted process reclaim a durable lock node.
///
/// Wire format: `<lockName>_<nodeContent>`. Parsing splits on the first
/// `_`; both halves must be non-blank and the lock name must be a lock node
/// name. Anything else is rejected with `LockError::InvalidArgument`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecoveryKey {
    lock_name: String,
    content: String,
}

impl RecoveryKey {
    pub fn new(lock_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            lock_name: lock_name.into(),
            content: content.into(),
        }
    }

    /// Parses a recovery key.
    pub fn parse(key: &str) -> LockResult<Self> {
        let (lock_name, content) = key.split_once(RECOVERY_KEY_SEPARATOR).ok_or_else(|| {
            LockError::InvalidArgument(format!("recovery key '{key}' has no separator"))
        })?;
        if lock_name.trim().is_empty() || content.trim().is_empty() {
            return Err(LockError::InvalidArgument(format!(
                "recovery key '{key}' has a blank segment"
            )));
        }
        if !is_lock_node_name(lock_name) {
            return Err(LockError::InvalidArgument(format!(
                "recovery key '{key}' does not name a lock node"
            )));
        }
        Ok(Self::new(lock_name, content))
    }

    pub fn lock_name(&self) -> &str {
        &self.lock_name
    }

    /// Content the lock node must hold for this key to be valid.
    pub fn content(&self) -> &str {
        &self.content
    }
}

impl fmt::Display for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.lock_name, RECOVERY_KEY_SEPARATOR, self.content)
    }
}

impl FromStr for RecoveryKey {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Generates the identity content written into lock nodes.
///
/// Format: `{node_id}-{location}-{random:016x}`. Neither component may
/// contain the recovery key separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    node_id: String,
    location: String,
}

impl NodeIdentity {
    pub fn new(node_id: impl Into<String>, location: impl Into<String>) -> LockResult<Self> {
        let node_id = node_id.into();
        let location = location.into();
        validate_identity_component("node id", &node_id)?;
        validate_identity_component("location", &location)?;
        Ok(Self { node_id, location })
    }

    /// Produces fresh identity content for a new lock node.
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let random: u64 = rng.r#gen();
        format!("{}-{}-{:016x}", self.node_id, self.location, random)
    }
}

fn validate_identity_component(what: &str, value: &str) -> LockResult<()> {
    if value.is_empty() {
        return Err(LockError::InvalidArgument(format!("{what} cannot be empty")));
    }
    if let Some(ch) = value
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '.')))
    {
        return Err(LockError::InvalidArgument(format!(
            "{what} '{value}' contains invalid character {ch:?}"
        )));
    }
    Ok(())
}
