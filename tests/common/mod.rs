//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod monitor;

use std::sync::Arc;
use std::time::Duration;

use coordination_lock::{CoordinationLockProvider, CoordinationStore, LockHandle};
use coordination_lock_memory::{MemorySession, MemoryStore};

pub use monitor::{Event, RecordingMonitor};

/// Upper bound on any wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// One simulated process: a store session and a provider using it.
pub struct Process {
    pub session: Arc<MemorySession>,
    pub provider: CoordinationLockProvider<MemorySession>,
}

impl Process {
    pub fn connect(store: &MemoryStore) -> Self {
        let session = Arc::new(store.connect());
        let provider = CoordinationLockProvider::builder()
            .shared_store(session.clone())
            .node_id("test-node")
            .build()
            .unwrap();
        Self { session, provider }
    }

    pub fn with_recovery_timeout(store: &MemoryStore, timeout: Duration) -> Self {
        let session = Arc::new(store.connect());
        let provider = CoordinationLockProvider::builder()
            .shared_store(session.clone())
            .node_id("test-node")
            .recovery_timeout(timeout)
            .build()
            .unwrap();
        Self { session, provider }
    }
}

/// Returns the path of a lock node under the default root.
pub fn node_path(id: &str, lock_name: &str) -> String {
    format!("/locks/{id}/{lock_name}")
}

/// Lists the contenders queued for `id`, treating a missing parent as empty.
pub async fn contenders(observer: &MemorySession, id: &str) -> Vec<String> {
    observer
        .children(&format!("/locks/{id}"))
        .await
        .unwrap_or_default()
}

/// Waits until exactly `count` contenders are queued for `id`.
pub async fn wait_for_contenders(observer: &MemorySession, id: &str, count: usize) {
    tokio::time::timeout(WAIT, async {
        while contenders(observer, id).await.len() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("lock {id} never reached {count} contenders"));
}

/// Waits until the handle's lost token fires.
pub async fn wait_lost(handle: &impl LockHandle) {
    let mut lost = handle.lost_token().clone();
    tokio::time::timeout(WAIT, lost.wait_for(|lost| *lost))
        .await
        .expect("lock was not lost in time")
        .expect("lost token sender dropped");
}

/// Reads a node's content as a string.
pub async fn node_content(observer: &MemorySession, path: &str) -> String {
    let (data, _) = observer.get_data(path, None).await.unwrap();
    String::from_utf8(data).unwrap()
}
