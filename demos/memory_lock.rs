//! Example: exclusive and durable locks on the in-process store
//!
//! Run with: `RUST_LOG=coordination_lock=debug cargo run --example memory_lock`

use std::sync::Arc;
use std::time::Duration;

use coordination_lock::prelude::*;
use coordination_lock::{CoordinationLockProvider, LockInfo};
use coordination_lock_memory::MemoryStore;
use tracing_subscriber::EnvFilter;

/// Prints every lifecycle notification.
struct PrintingMonitor;

impl LockMonitor for PrintingMonitor {
    fn lock_acquired(&self, lock: &LockInfo) {
        println!("  [monitor] acquired {} ({:?})", lock.id, lock.lock_name);
    }

    fn lock_released(&self, lock: &LockInfo) {
        println!("  [monitor] released {} ({:?})", lock.id, lock.lock_name);
    }

    fn lock_lost(&self, lock: &LockInfo) {
        println!("  [monitor] lost {} ({:?})", lock.id, lock.lock_name);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // One store, two "processes".
    let store = MemoryStore::new();
    let worker_a = CoordinationLockProvider::builder()
        .store(store.connect())
        .node_id("worker-a")
        .build()?;
    let worker_b = CoordinationLockProvider::builder()
        .store(store.connect())
        .node_id("worker-b")
        .build()?;
    let monitor: Arc<dyn LockMonitor> = Arc::new(PrintingMonitor);

    println!("Exclusive lock handoff");
    let handle = worker_a
        .acquire_exclusive_lock("example-resource", monitor.clone(), None)
        .await?;
    println!("worker-a holds {:?}", handle.lock_name());

    let waiting = tokio::spawn({
        let monitor = monitor.clone();
        async move {
            let handle = worker_b
                .acquire_exclusive_lock("example-resource", monitor, Some(Duration::from_secs(5)))
                .await?;
            println!("worker-b holds {:?}", handle.lock_name());
            handle.release().await
        }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.release().await?;
    waiting.await??;

    println!("\nDurable lock recovery");
    let crashed = store.connect();
    let crashed = Arc::new(crashed);
    let before_crash = CoordinationLockProvider::builder()
        .shared_store(crashed.clone())
        .node_id("worker-c")
        .build()?;
    let handle = before_crash
        .acquire_durable_lock("nightly-report", monitor.clone(), None)
        .await?;
    let key = handle.recovery_key().ok_or("durable locks carry a recovery key")?;
    println!("worker-c holds {:?}, key {key}", handle.lock_name());

    crashed.expire();
    let mut lost = handle.lost_token().clone();
    lost.wait_for(|lost| *lost).await?;
    println!("worker-c lost its session; the node stays behind");

    let restarted = CoordinationLockProvider::builder()
        .store(store.connect())
        .node_id("worker-c")
        .build()?;
    let recovered = restarted
        .recover_durable_lock("nightly-report", monitor.clone(), &key)
        .await?;
    println!(
        "restarted worker-c recovered {:?}, new key {:?}",
        recovered.lock_name(),
        recovered.recovery_key()
    );
    recovered.release().await?;

    Ok(())
}
