//! Lock identifier validation and lock-node ordering.

use std::cmp::Ordering;

use coordination_lock_core::error::{LockError, LockResult};

/// Prefix of every lock node created under a lock's parent path.
pub const LOCK_NODE_PREFIX: &str = "lock-";

/// Maximum length of a lock identifier.
const MAX_LOCK_ID_LENGTH: usize = 255;

/// Validates a caller-supplied lock identifier.
///
/// # Rules
///
/// - Must be non-empty and at most 255 bytes
/// - Only ASCII alphanumerics, `-`, `_` and `.` are allowed
/// - `.` and `..` are rejected since they are path components
pub fn validate_lock_id(id: &str) -> LockResult<()> {
    if id.is_empty() {
        return Err(LockError::InvalidArgument(
            "lock id cannot be empty".to_string(),
        ));
    }
    if id.len() > MAX_LOCK_ID_LENGTH {
        return Err(LockError::InvalidArgument(format!(
            "lock id is too long ({} bytes, max {MAX_LOCK_ID_LENGTH})",
            id.len()
        )));
    }
    if id == "." || id == ".." {
        return Err(LockError::InvalidArgument(format!(
            "lock id '{id}' is a reserved path component"
        )));
    }
    if let Some(ch) = id
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')))
    {
        return Err(LockError::InvalidArgument(format!(
            "lock id '{id}' contains invalid character {ch:?}"
        )));
    }
    Ok(())
}

/// Returns true if `name` looks like a lock node name we could have created.
pub fn is_lock_node_name(name: &str) -> bool {
    name.len() > LOCK_NODE_PREFIX.len() && name.starts_with(LOCK_NODE_PREFIX) && !name.contains('/')
}

/// Parses the store-assigned sequence number of a lock node name.
pub fn parse_sequence(name: &str) -> Option<u64> {
    let suffix = name.strip_prefix(LOCK_NODE_PREFIX)?;
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Orders lock node names by sequence number.
///
/// Names with a parseable sequence come first in numeric order. Names that
/// do not parse sort after every valid name, in lexical order among
/// themselves. Equal sequences fall back to lexical order.
pub fn compare_lock_names(a: &str, b: &str) -> Ordering {
    match (parse_sequence(a), parse_sequence(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Sorts lock node names into queue order.
pub fn sort_lock_names(names: &mut [String]) {
    names.sort_by(|a, b| compare_lock_names(a, b));
}

/// Returns the entry queued immediately before `name`, or `None` if `name`
/// is the head or not queued at all.
pub fn predecessor<'a>(sorted: &'a [String], name: &str) -> Option<&'a str> {
    let position = sorted.iter().position(|n| n == name)?;
    position.checked_sub(1).map(|i| sorted[i].as_str())
}
