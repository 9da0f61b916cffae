//! Pending (uncommitted) stamps
//!
//! Edits sharing one `(status, author, module, path)` tuple share one
//! provisional stamp sequence until the next commit.
//!
//! A commit moves the current entries into an in-flight batch. The batch
//! stays resolvable by sequence until it is either completed (the stamps
//! are now committed) or reverted (the entries are pending again). Edits
//! made while a commit is in flight accumulate for the next commit.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use super::stamp::StampKey;

/// One pending stamp as handed to a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UncommittedStamp {
    pub sequence: u32,
    pub key: StampKey,
}

#[derive(Debug, Default)]
struct PendingState {
    by_key: HashMap<StampKey, u32>,
    by_sequence: BTreeMap<u32, StampKey>,
    in_flight: BTreeMap<u32, StampKey>,
}

#[derive(Debug, Default)]
pub struct PendingStampMap {
    state: RwLock<PendingState>,
}

impl PendingStampMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pending sequence for `key`, calling `allocate` for a new
    /// one only if the tuple is not pending yet.
    pub fn add_uncommitted_stamp<F>(&self, key: StampKey, allocate: F) -> u32
    where
        F: FnOnce() -> u32,
    {
        if let Some(&sequence) = self.state.read().by_key.get(&key) {
            return sequence;
        }

        let mut state = self.state.write();
        if let Some(&sequence) = state.by_key.get(&key) {
            return sequence;
        }
        let sequence = allocate();
        state.by_key.insert(key, sequence);
        state.by_sequence.insert(sequence, key);
        sequence
    }

    pub fn get(&self, key: &StampKey) -> Option<u32> {
        self.state.read().by_key.get(key).copied()
    }

    /// Looks a pending or in-flight sequence up.
    pub fn key_for_sequence(&self, sequence: u32) -> Option<StampKey> {
        let state = self.state.read();
        state
            .by_sequence
            .get(&sequence)
            .or_else(|| state.in_flight.get(&sequence))
            .copied()
    }

    pub fn contains_sequence(&self, sequence: u32) -> bool {
        self.key_for_sequence(sequence).is_some()
    }

    /// Number of pending sequences, not counting an in-flight batch.
    pub fn len(&self) -> usize {
        self.state.read().by_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending entries ordered by sequence.
    pub fn snapshot(&self) -> Vec<UncommittedStamp> {
        self.state
            .read()
            .by_sequence
            .iter()
            .map(|(&sequence, &key)| UncommittedStamp { sequence, key })
            .collect()
    }

    /// Moves every pending entry into the in-flight batch and returns it.
    ///
    /// # Panics
    ///
    /// Panics if a batch is already in flight; commits are serialized.
    pub fn begin_commit(&self) -> Vec<UncommittedStamp> {
        let mut state = self.state.write();
        assert!(state.in_flight.is_empty(), "a commit is already in flight");
        state.by_key.clear();
        state.in_flight = std::mem::take(&mut state.by_sequence);
        state
            .in_flight
            .iter()
            .map(|(&sequence, &key)| UncommittedStamp { sequence, key })
            .collect()
    }

    /// Drops the in-flight batch; its sequences are committed now.
    pub fn complete_commit(&self) {
        self.state.write().in_flight.clear();
    }

    /// Makes the in-flight batch pending again. If the same tuple was added
    /// while the commit ran, the in-flight sequence is the one kept for the
    /// tuple; the newer sequence stays pending under its own number.
    pub fn revert_commit(&self) {
        let mut state = self.state.write();
        let in_flight = std::mem::take(&mut state.in_flight);
        for (sequence, key) in in_flight {
            state.by_key.insert(key, sequence);
            state.by_sequence.insert(sequence, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::Status;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn key(author: u32) -> StampKey {
        StampKey::new(Status::Active, author, 6, 7)
    }

    #[test]
    fn test_identical_tuple_reuses_sequence() {
        let map = PendingStampMap::new();
        let next = AtomicU32::new(0);
        let allocate = || next.fetch_add(1, Ordering::SeqCst);

        assert_eq!(map.add_uncommitted_stamp(key(5), allocate), 0);
        assert_eq!(map.add_uncommitted_stamp(key(5), allocate), 0);
        assert_eq!(map.add_uncommitted_stamp(key(8), allocate), 1);
        assert_eq!(next.load(Ordering::SeqCst), 2);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_in_flight_batch_stays_resolvable() {
        let map = PendingStampMap::new();
        map.add_uncommitted_stamp(key(5), || 3);

        let batch = map.begin_commit();
        assert_eq!(batch, vec![UncommittedStamp { sequence: 3, key: key(5) }]);
        assert!(map.is_empty());
        assert_eq!(map.key_for_sequence(3), Some(key(5)));

        map.complete_commit();
        assert_eq!(map.key_for_sequence(3), None);
    }

    #[test]
    fn test_revert_restores_entries() {
        let map = PendingStampMap::new();
        map.add_uncommitted_stamp(key(5), || 0);
        map.add_uncommitted_stamp(key(6), || 1);
        let before = map.snapshot();

        map.begin_commit();
        map.revert_commit();
        assert_eq!(map.snapshot(), before);
        assert_eq!(map.get(&key(5)), Some(0));
    }

    #[test]
    fn test_revert_keeps_in_flight_sequence_for_tuple() {
        let map = PendingStampMap::new();
        map.add_uncommitted_stamp(key(5), || 0);
        map.begin_commit();
        assert_eq!(map.add_uncommitted_stamp(key(5), || 1), 1);

        map.revert_commit();
        assert_eq!(map.get(&key(5)), Some(0));
        assert!(map.contains_sequence(1));
        assert_eq!(map.len(), 2);
    }
}
