//! Per-thread memo of recent UUID resolutions
//!
//! UUID → nid never changes once assigned, so entries never go stale.
//! Entries are keyed by index instance so isolated indexes in one process
//! never see each other's nids.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static RECENT: RefCell<VecDeque<(u64, Uuid, i32)>> = const { RefCell::new(VecDeque::new()) };
}

pub(crate) fn next_instance_id() -> u64 {
    NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)
}

pub(crate) fn lookup(instance: u64, uuid: &Uuid) -> Option<i32> {
    RECENT.with(|recent| {
        recent
            .borrow()
            .iter()
            .find(|(i, u, _)| *i == instance && u == uuid)
            .map(|(_, _, nid)| *nid)
    })
}

pub(crate) fn remember(instance: u64, uuid: Uuid, nid: i32, capacity: usize) {
    if capacity == 0 {
        return;
    }
    RECENT.with(|recent| {
        let mut recent = recent.borrow_mut();
        if recent.iter().any(|(i, u, _)| *i == instance && *u == uuid) {
            return;
        }
        recent.push_front((instance, uuid, nid));
        recent.truncate(capacity);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_and_lookup() {
        let instance = next_instance_id();
        let uuid = Uuid::new_v4();
        assert_eq!(lookup(instance, &uuid), None);
        remember(instance, uuid, -3, 4);
        assert_eq!(lookup(instance, &uuid), Some(-3));
    }

    #[test]
    fn test_instances_are_isolated() {
        let first = next_instance_id();
        let second = next_instance_id();
        let uuid = Uuid::new_v4();
        remember(first, uuid, -1, 4);
        assert_eq!(lookup(second, &uuid), None);
    }

    #[test]
    fn test_capacity_bounds_entries() {
        let instance = next_instance_id();
        let uuids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (n, uuid) in uuids.iter().enumerate() {
            remember(instance, *uuid, -(n as i32) - 1, 2);
        }
        assert_eq!(lookup(instance, &uuids[0]), None);
        assert_eq!(lookup(instance, &uuids[2]), Some(-3));
    }
}
