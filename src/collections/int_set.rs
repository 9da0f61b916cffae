//! Concurrent ordered set of sequences
//!
//! Backs the uncommitted-component sets. Shared read, exclusive write.

use std::collections::BTreeSet;

use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct ConcurrentIntSet {
    members: RwLock<BTreeSet<u32>>,
}

impl ConcurrentIntSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value`, returning true if it was not already present.
    pub fn add(&self, value: u32) -> bool {
        self.members.write().insert(value)
    }

    pub fn add_all<I: IntoIterator<Item = u32>>(&self, values: I) {
        self.members.write().extend(values);
    }

    pub fn remove(&self, value: u32) -> bool {
        self.members.write().remove(&value)
    }

    pub fn contains(&self, value: u32) -> bool {
        self.members.read().contains(&value)
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Returns a copy of the current members.
    pub fn snapshot(&self) -> BTreeSet<u32> {
        self.members.read().clone()
    }

    /// Removes and returns every member in one step.
    pub fn take(&self) -> BTreeSet<u32> {
        std::mem::take(&mut *self.members.write())
    }
}

impl FromIterator<u32> for ConcurrentIntSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            members: RwLock::new(iter.into_iter().collect()),
        }
    }
}
