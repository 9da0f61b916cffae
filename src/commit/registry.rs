//! Registry of running tasks
//!
//! A task registers itself when it starts and holds an `ActiveTaskGuard`;
//! dropping the guard removes it, on success, error, or unwinding panic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct ActiveTaskRegistry {
    tasks: Mutex<BTreeMap<u64, String>>,
    next_id: AtomicU64,
}

impl ActiveTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task until the returned guard is dropped.
    pub fn begin(self: &Arc<Self>, description: impl Into<String>) -> ActiveTaskGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.lock().insert(id, description.into());
        ActiveTaskGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Descriptions of running tasks, oldest first.
    pub fn active(&self) -> Vec<String> {
        self.tasks.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct ActiveTaskGuard {
    registry: Arc<ActiveTaskRegistry>,
    id: u64,
}

impl Drop for ActiveTaskGuard {
    fn drop(&mut self) {
        self.registry.tasks.lock().remove(&self.id);
    }
}
