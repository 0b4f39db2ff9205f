//! Monitor that records every callback.

use std::sync::Arc;

use coordination_lock::{LockInfo, LockMonitor};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquired(LockInfo),
    Released(LockInfo),
    Lost(LockInfo),
}

impl Event {
    pub fn info(&self) -> &LockInfo {
        match self {
            Event::Acquired(info) | Event::Released(info) | Event::Lost(info) => info,
        }
    }
}

#[derive(Debug, Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<Event>>,
}

impl RecordingMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn acquired(&self) -> usize {
        self.count(|e| matches!(e, Event::Acquired(_)))
    }

    pub fn released(&self) -> usize {
        self.count(|e| matches!(e, Event::Released(_)))
    }

    pub fn lost(&self) -> usize {
        self.count(|e| matches!(e, Event::Lost(_)))
    }

    fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }
}

impl LockMonitor for RecordingMonitor {
    fn lock_acquired(&self, lock: &LockInfo) {
        self.events.lock().push(Event::Acquired(lock.clone()));
    }

    fn lock_released(&self, lock: &LockInfo) {
        self.events.lock().push(Event::Released(lock.clone()));
    }

    fn lock_lost(&self, lock: &LockInfo) {
        self.events.lock().push(Event::Lost(lock.clone()));
    }
}
