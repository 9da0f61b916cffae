//! Bidirectional nid ↔ sequence map for one component namespace
//!
//! Both directions live in sparse `AtomicIntArray`s, so memory follows the
//! mapped nids however far apart they are:
//! - `nid_to_sequence[-nid - 1] = sequence + 1` (0 = unmapped)
//! - `sequence_to_nid[sequence] = nid` (0 = unmapped; nids are negative)
//!
//! Reads touch one atomic each and never lock. Writers serialize on
//! `write_lock`, re-check under it, publish `sequence → nid` before
//! `nid → sequence`, and keep the two cardinalities equal.
//!
//! File layout: `i32 size | i32 nextSequence | size × (i32 nid, i32 sequence)`.

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::collections::AtomicIntArray;
use crate::observability::{log_event_with_fields, Event};
use crate::store::codec::{count_to_i32, read_count, read_i32, write_i32};
use crate::store::files::{open_if_exists, write_atomically};
use crate::store::{StoreError, StoreResult};

/// Dense sequence numbering for the nids of one component kind.
#[derive(Debug)]
pub struct SequenceMap {
    name: String,
    nid_to_sequence: AtomicIntArray,
    sequence_to_nid: AtomicIntArray,
    next_sequence: AtomicU32,
    nid_count: AtomicUsize,
    sequence_count: AtomicUsize,
    write_lock: Mutex<()>,
}

fn nid_index(nid: i32) -> usize {
    assert!(nid < 0, "nid must be negative, got {}", nid);
    (-(nid as i64) - 1) as usize
}

impl SequenceMap {
    /// Creates an empty map for the namespace `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nid_to_sequence: AtomicIntArray::new(),
            sequence_to_nid: AtomicIntArray::new(),
            next_sequence: AtomicU32::new(0),
            nid_count: AtomicUsize::new(0),
            sequence_count: AtomicUsize::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the sequence for `nid`, assigning the next one if it has none.
    ///
    /// # Panics
    ///
    /// Panics if `nid` is not negative.
    pub fn add_nid_if_missing(&self, nid: i32) -> u32 {
        if let Some(sequence) = self.get_sequence(nid) {
            return sequence;
        }

        let _guard = self.write_lock.lock();
        if let Some(sequence) = self.get_sequence(nid) {
            return sequence;
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::AcqRel);
        assert!(
            sequence < i32::MAX as u32,
            "sequence space exhausted for {}",
            self.name
        );
        self.publish(nid, sequence);
        sequence
    }

    fn publish(&self, nid: i32, sequence: u32) {
        self.sequence_to_nid.set(sequence as usize, nid);
        self.nid_to_sequence.set(nid_index(nid), sequence as i32 + 1);
        self.nid_count.fetch_add(1, Ordering::AcqRel);
        self.sequence_count.fetch_add(1, Ordering::AcqRel);
        self.check_cardinality();
    }

    fn check_cardinality(&self) {
        let nids = self.nid_count.load(Ordering::Acquire);
        let sequences = self.sequence_count.load(Ordering::Acquire);
        assert_eq!(
            nids, sequences,
            "{}: nid→sequence and sequence→nid tables diverged",
            self.name
        );
    }

    /// Returns the sequence assigned to `nid`.
    ///
    /// # Panics
    ///
    /// Panics if `nid` is not negative.
    pub fn get_sequence(&self, nid: i32) -> Option<u32> {
        match self.nid_to_sequence.get(nid_index(nid)) {
            0 => None,
            stored => Some((stored - 1) as u32),
        }
    }

    /// Returns the nid holding `sequence`.
    pub fn get_nid(&self, sequence: u32) -> Option<i32> {
        match self.sequence_to_nid.get(sequence as usize) {
            0 => None,
            nid => Some(nid),
        }
    }

    pub fn contains_nid(&self, nid: i32) -> bool {
        self.get_sequence(nid).is_some()
    }

    /// Drops the mapping for `nid`, returning the sequence it held.
    ///
    /// Used to discard sequences whose component was never persisted. The
    /// sequence is not reused.
    pub fn remove_nid(&self, nid: i32) -> Option<u32> {
        let _guard = self.write_lock.lock();
        let sequence = self.get_sequence(nid)?;
        self.nid_to_sequence.set(nid_index(nid), 0);
        self.sequence_to_nid.set(sequence as usize, 0);
        self.nid_count.fetch_sub(1, Ordering::AcqRel);
        self.sequence_count.fetch_sub(1, Ordering::AcqRel);
        self.check_cardinality();
        Some(sequence)
    }

    /// Number of mapped nids.
    pub fn len(&self) -> usize {
        self.nid_count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sequence the next new nid will receive.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence.load(Ordering::Acquire)
    }

    /// Returns `(nid, sequence)` pairs in sequence order.
    pub fn entries(&self) -> Vec<(i32, u32)> {
        (0..self.next_sequence())
            .filter_map(|sequence| self.get_nid(sequence).map(|nid| (nid, sequence)))
            .collect()
    }

    /// Returns mapped sequences in ascending order.
    pub fn sequences(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.next_sequence()).filter(move |sequence| self.get_nid(*sequence).is_some())
    }

    /// Persists the map to `path`.
    pub fn write(&self, path: &Path) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let entries = self.entries();
        let size = count_to_i32(entries.len(), "sequence map entry")?;
        let next = self.next_sequence() as i32;

        write_atomically(path, |w| {
            write_i32(w, size)?;
            write_i32(w, next)?;
            for (nid, sequence) in &entries {
                write_i32(w, *nid)?;
                write_i32(w, *sequence as i32)?;
            }
            Ok(())
        })?;

        log_event_with_fields(
            Event::SequenceMapWritten,
            &[("map", &self.name), ("entries", &entries.len().to_string())],
        );
        Ok(())
    }

    /// Loads a map from `path`; a missing file yields an empty map.
    pub fn read(name: impl Into<String>, path: &Path) -> StoreResult<Self> {
        let map = Self::new(name);
        let mut reader = match open_if_exists(path)? {
            Some(reader) => reader,
            None => return Ok(map),
        };

        let corrupt = |reason: String| StoreError::corruption_in_file(path, reason);
        let size = read_count(&mut reader, "sequence map entry").map_err(|e| e.with_path(path))?;
        let next = read_i32(&mut reader)
            .map_err(|e| corrupt(format!("cannot read next sequence: {}", e)))?;
        if next < 0 {
            return Err(corrupt(format!("negative next sequence {}", next)));
        }

        for _ in 0..size {
            let nid = read_i32(&mut reader)
                .map_err(|e| corrupt(format!("truncated entry: {}", e)))?;
            let sequence = read_i32(&mut reader)
                .map_err(|e| corrupt(format!("truncated entry: {}", e)))?;
            if nid >= 0 || sequence < 0 || sequence >= next {
                return Err(corrupt(format!(
                    "invalid entry nid {} sequence {} (next {})",
                    nid, sequence, next
                )));
            }
            if map.contains_nid(nid) || map.get_nid(sequence as u32).is_some() {
                return Err(corrupt(format!("duplicate entry nid {} sequence {}", nid, sequence)));
            }
            map.publish(nid, sequence as u32);
        }
        map.next_sequence.store(next as u32, Ordering::Release);

        log_event_with_fields(
            Event::SequenceMapLoaded,
            &[("map", &map.name), ("entries", &size.to_string())],
        );
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::CHUNK_SIZE;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_sequences_start_at_zero_and_are_dense() {
        let map = SequenceMap::new("concept");
        assert_eq!(map.add_nid_if_missing(-1), 0);
        assert_eq!(map.add_nid_if_missing(-7), 1);
        assert_eq!(map.add_nid_if_missing(-3), 2);
        assert_eq!(map.next_sequence(), 3);
    }

    #[test]
    fn test_add_is_idempotent() {
        let map = SequenceMap::new("concept");
        let first = map.add_nid_if_missing(-5);
        assert_eq!(map.add_nid_if_missing(-5), first);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_bidirectional_lookup() {
        let map = SequenceMap::new("semantic");
        let sequence = map.add_nid_if_missing(-42);
        assert_eq!(map.get_sequence(-42), Some(sequence));
        assert_eq!(map.get_nid(sequence), Some(-42));
        assert!(map.contains_nid(-42));
        assert!(!map.contains_nid(-43));
        assert_eq!(map.get_nid(99), None);
    }

    #[test]
    #[should_panic(expected = "nid must be negative")]
    fn test_positive_nid_fails_fast() {
        SequenceMap::new("concept").add_nid_if_missing(5);
    }

    #[test]
    fn test_far_nids_stay_sparse() {
        let map = SequenceMap::new("concept");
        assert_eq!(map.add_nid_if_missing(-50_000_000), 0);
        assert_eq!(map.add_nid_if_missing(i32::MIN), 1);
        assert_eq!(map.add_nid_if_missing(-1), 2);

        assert_eq!(map.get_sequence(i32::MIN), Some(1));
        assert_eq!(map.get_nid(0), Some(-50_000_000));
        assert_eq!(map.get_sequence(-49_999_999), None);
        assert_eq!(map.nid_to_sequence.capacity(), 3 * CHUNK_SIZE);
        assert_eq!(map.sequence_to_nid.capacity(), CHUNK_SIZE);
    }

    #[test]
    fn test_remove_nid_does_not_reuse_sequence() {
        let map = SequenceMap::new("concept");
        map.add_nid_if_missing(-1);
        let removed = map.add_nid_if_missing(-2);
        assert_eq!(map.remove_nid(-2), Some(removed));
        assert_eq!(map.remove_nid(-2), None);
        assert_eq!(map.get_nid(removed), None);
        assert_eq!(map.len(), 1);
        assert_eq!(map.add_nid_if_missing(-3), 2);
    }

    #[test]
    fn test_write_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("concept-sequence.map");

        let map = SequenceMap::new("concept");
        for nid in [-1, -4, -9] {
            map.add_nid_if_missing(nid);
        }
        map.remove_nid(-4);
        map.write(&path).unwrap();

        let reloaded = SequenceMap::read("concept", &path).unwrap();
        assert_eq!(reloaded.entries(), map.entries());
        assert_eq!(reloaded.next_sequence(), 3);
        assert_eq!(reloaded.add_nid_if_missing(-10), 3);
    }

    #[test]
    fn test_read_rejects_positive_nid() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.map");
        let mut bytes = Vec::new();
        for value in [1i32, 1, 5, 0] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        std::fs::write(&path, bytes).unwrap();

        let err = SequenceMap::read("concept", &path).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_concurrent_adds_assign_each_nid_once() {
        let map = Arc::new(SequenceMap::new("concept"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let map = Arc::clone(&map);
                std::thread::spawn(move || {
                    (1..=500).map(|n| map.add_nid_if_missing(-n)).collect::<Vec<_>>()
                })
            })
            .collect();
        let results: Vec<Vec<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for result in &results[1..] {
            assert_eq!(result, &results[0]);
        }
        assert_eq!(map.len(), 500);
        let mut sequences: Vec<u32> = map.sequences().collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (0..500).collect::<Vec<_>>());
    }
}
