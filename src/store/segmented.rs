//! Segmented object store
//!
//! Maps a dense non-negative sequence to a serialized value. The sequence
//! space is cut into fixed-length segments; the segment array only grows.
//!
//! # Concurrency
//!
//! - Reads load the current segment array from an `ArcSwap` and never lock.
//! - Growth copies the array under `grow_lock` and swaps the pointer only
//!   after the new array is fully built, so readers of the old array keep
//!   seeing the same `Segment` objects the new array shares.
//! - Slot writes go straight to the shared `Segment`.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::codec::StoreCodec;
use super::errors::{StoreError, StoreResult};
use super::files::{open_if_exists, write_atomically};
use super::segment::Segment;
use crate::observability::{log_event_with_fields, Event};

/// Default number of slots per segment.
pub const DEFAULT_SEGMENT_SIZE: usize = 12_800;

/// A concurrent sequence → value store persisted one file per segment.
#[derive(Debug)]
pub struct SegmentedObjectStore<T> {
    folder: PathBuf,
    suffix: String,
    segment_size: usize,
    segments: ArcSwap<Vec<Arc<Segment>>>,
    grow_lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: StoreCodec> SegmentedObjectStore<T> {
    /// Creates an empty store whose segment files are
    /// `{folder}/{segmentIndex}{suffix}`.
    ///
    /// # Panics
    ///
    /// Panics if `segment_size` is zero.
    pub fn new(folder: impl Into<PathBuf>, suffix: impl Into<String>, segment_size: usize) -> Self {
        assert!(segment_size > 0, "segment size must be positive");
        Self {
            folder: folder.into(),
            suffix: suffix.into(),
            segment_size,
            segments: ArcSwap::from_pointee(Vec::new()),
            grow_lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// Returns the folder holding the segment files.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Returns the number of slots per segment.
    pub fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// Returns the number of allocated segments.
    pub fn segment_count(&self) -> usize {
        self.segments.load().len()
    }

    fn locate(&self, sequence: u32) -> (usize, usize) {
        let sequence = sequence as usize;
        (sequence / self.segment_size, sequence % self.segment_size)
    }

    fn segment_path(&self, index: usize) -> PathBuf {
        self.folder.join(format!("{}{}", index, self.suffix))
    }

    /// Returns the segment at `index`, growing the segment array if needed.
    fn segment_for_write(&self, index: usize) -> Arc<Segment> {
        if let Some(segment) = self.segments.load().get(index) {
            return Arc::clone(segment);
        }

        let _guard = self.grow_lock.lock();
        let current = self.segments.load_full();
        if let Some(segment) = current.get(index) {
            return Arc::clone(segment);
        }

        let mut grown = Vec::with_capacity(index + 1);
        grown.extend(current.iter().cloned());
        for new_index in current.len()..=index {
            let segment = Segment::new(new_index, self.segment_size);
            // New segments change the segment count every file records.
            segment.mark_dirty();
            grown.push(Arc::new(segment));
        }
        let segment = Arc::clone(&grown[index]);
        self.segments.store(Arc::new(grown));
        segment
    }

    /// Stores `value` at `sequence`, replacing any previous value.
    pub fn put(&self, sequence: u32, value: &T) {
        self.put_bytes(sequence, value.encode());
    }

    /// Stores already serialized bytes at `sequence`.
    pub fn put_bytes(&self, sequence: u32, bytes: Vec<u8>) {
        let (segment_index, offset) = self.locate(sequence);
        self.segment_for_write(segment_index).set(offset, bytes);
    }

    /// Removes the value at `sequence`, if any.
    pub fn remove(&self, sequence: u32) {
        let (segment_index, offset) = self.locate(sequence);
        if let Some(segment) = self.segments.load().get(segment_index) {
            if segment.is_set(offset) {
                segment.clear(offset);
            }
        }
    }

    /// Returns the serialized bytes at `sequence`.
    pub fn get_bytes(&self, sequence: u32) -> Option<Arc<Vec<u8>>> {
        let (segment_index, offset) = self.locate(sequence);
        self.segments
            .load()
            .get(segment_index)
            .and_then(|segment| segment.get(offset))
    }

    /// Returns the decoded value at `sequence`.
    pub fn get(&self, sequence: u32) -> StoreResult<Option<T>> {
        match self.get_bytes(sequence) {
            Some(bytes) => T::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Returns true if a value is stored at `sequence`.
    pub fn contains_key(&self, sequence: u32) -> bool {
        let (segment_index, offset) = self.locate(sequence);
        self.segments
            .load()
            .get(segment_index)
            .map(|segment| segment.is_set(offset))
            .unwrap_or(false)
    }

    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.segments.load().iter().map(|s| s.occupied()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the highest occupied sequence.
    pub fn last_sequence(&self) -> Option<u32> {
        let segments = self.segments.load();
        for segment in segments.iter().rev() {
            for offset in (0..segment.len()).rev() {
                if segment.is_set(offset) {
                    let sequence = segment.index() * self.segment_size + offset;
                    return u32::try_from(sequence).ok();
                }
            }
        }
        None
    }

    /// Lazily iterates `(sequence, value)` pairs in sequence order.
    ///
    /// The iterator walks the segment array as it was when `stream` was
    /// called; values written into those segments later may or may not be
    /// seen.
    pub fn stream(&self) -> impl Iterator<Item = StoreResult<(u32, T)>> {
        self.stream_where(|_| true)
    }

    /// Like `stream`, yielding only sequences accepted by `predicate`.
    /// Rejected slots are never decoded.
    pub fn stream_where<P>(&self, mut predicate: P) -> impl Iterator<Item = StoreResult<(u32, T)>>
    where
        P: FnMut(u32) -> bool,
    {
        let segments = self.segments.load_full();
        let segment_size = self.segment_size;

        (0..segments.len())
            .flat_map(move |segment_index| {
                let segment = Arc::clone(&segments[segment_index]);
                let base = segment_index * segment_size;
                (0..segment.len()).filter_map(move |offset| {
                    segment
                        .get(offset)
                        .map(|bytes| ((base + offset) as u32, bytes))
                })
            })
            .filter(move |(sequence, _)| predicate(*sequence))
            .map(|(sequence, bytes)| T::decode(&bytes).map(|value| (sequence, value)))
    }

    /// Writes every dirty segment to its file.
    pub fn write(&self) -> StoreResult<usize> {
        let segments = self.segments.load_full();
        let total = segments.len();
        let mut written = 0;

        for segment in segments.iter() {
            if !segment.take_dirty() {
                continue;
            }
            let path = self.segment_path(segment.index());
            if let Err(e) = write_atomically(&path, |w| segment.write_to(w, total)) {
                segment.mark_dirty();
                return Err(e);
            }
            written += 1;
        }

        if written > 0 {
            log_event_with_fields(
                Event::SegmentsWritten,
                &[
                    ("folder", &self.folder.display().to_string()),
                    ("segments", &written.to_string()),
                    ("total", &total.to_string()),
                ],
            );
        }
        Ok(written)
    }

    /// Replaces the in-memory contents with the segment files on disk.
    ///
    /// A missing folder means an empty store. A segment file that is
    /// missing while a later one exists is corruption.
    pub fn read(&self) -> StoreResult<()> {
        let _guard = self.grow_lock.lock();

        if !self.folder.exists() {
            self.segments.store(Arc::new(Vec::new()));
            return Ok(());
        }

        let mut loaded = Vec::new();
        let mut total = 1;
        let mut index = 0;
        while index < total {
            let path = self.segment_path(index);
            let mut reader = match open_if_exists(&path)? {
                Some(reader) => reader,
                None if index == 0 => break,
                None => {
                    return Err(StoreError::corruption_in_file(
                        &path,
                        format!("segment {} of {} is missing", index, total),
                    ))
                }
            };
            let (recorded_total, segment) =
                Segment::read_from(&mut reader, &path, index, self.segment_size)?;
            total = total.max(recorded_total);
            loaded.push(Arc::new(segment));
            index += 1;
        }

        let count = loaded.len();
        self.segments.store(Arc::new(loaded));
        log_event_with_fields(
            Event::SegmentsRead,
            &[
                ("folder", &self.folder.display().to_string()),
                ("segments", &count.to_string()),
            ],
        );
        Ok(())
    }

    /// Creates the store and loads whatever is on disk.
    pub fn open(folder: impl Into<PathBuf>, suffix: impl Into<String>, segment_size: usize) -> StoreResult<Self> {
        let store = Self::new(folder, suffix, segment_size);
        store.read()?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store(dir: &Path, segment_size: usize) -> SegmentedObjectStore<Vec<u8>> {
        SegmentedObjectStore::new(dir.join("objects"), ".obj", segment_size)
    }

    #[test]
    fn test_put_get_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(temp_dir.path(), 4);

        store.put(3, &vec![1]);
        store.put(3, &vec![2]);
        assert_eq!(store.get(3).unwrap(), Some(vec![2]));
        assert_eq!(store.get(4).unwrap(), None);
        assert!(store.contains_key(3));
        assert!(!store.contains_key(100));
    }

    #[test]
    fn test_growth_spans_segments() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(temp_dir.path(), 4);

        store.put(0, &vec![0]);
        store.put(9, &vec![9]);
        assert_eq!(store.segment_count(), 3);
        assert_eq!(store.len(), 2);
        assert_eq!(store.last_sequence(), Some(9));
    }

    #[test]
    fn test_stream_is_ordered_and_filtered() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(temp_dir.path(), 2);
        for sequence in [5u32, 1, 3, 0] {
            store.put(sequence, &vec![sequence as u8]);
        }

        let all: Vec<u32> = store.stream().map(|r| r.unwrap().0).collect();
        assert_eq!(all, vec![0, 1, 3, 5]);

        let odd: Vec<u32> = store
            .stream_where(|s| s % 2 == 1)
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(odd, vec![1, 3, 5]);
    }

    #[test]
    fn test_write_only_dirty_segments() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(temp_dir.path(), 2);

        store.put(0, &vec![1]);
        store.put(5, &vec![2]);
        assert_eq!(store.write().unwrap(), 3);
        assert_eq!(store.write().unwrap(), 0);

        store.put(1, &vec![3]);
        assert_eq!(store.write().unwrap(), 1);
    }

    #[test]
    fn test_read_missing_folder_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(temp_dir.path(), 2);
        store.read().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_middle_segment_is_corruption() {
        let temp_dir = TempDir::new().unwrap();
        let writer = store(temp_dir.path(), 2);
        writer.put(0, &vec![1]);
        writer.put(5, &vec![2]);
        writer.write().unwrap();

        fs::remove_file(temp_dir.path().join("objects").join("1.obj")).unwrap();

        let reader = store(temp_dir.path(), 2);
        let err = reader.read().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_remove_clears_slot() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(temp_dir.path(), 2);
        store.put(1, &vec![1]);
        store.remove(1);
        assert!(!store.contains_key(1));
        store.remove(99);
    }

    #[test]
    fn test_concurrent_puts_across_growth() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(store(temp_dir.path(), 8));

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..200u32 {
                        let sequence = i * 4 + t;
                        store.put(sequence, &sequence.to_be_bytes().to_vec());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.len(), 800);
        for sequence in 0..800u32 {
            assert_eq!(
                store.get(sequence).unwrap(),
                Some(sequence.to_be_bytes().to_vec())
            );
        }
    }
}
