//! One fixed-length segment of a segmented object store
//!
//! Slots hold serialized values behind `ArcSwapOption`, so a reader never
//! takes a lock and always sees either the old or the new buffer whole.
//!
//! On-disk layout of one segment file:
//!
//! ```text
//! i32 totalSegments | i32 thisSegmentIndex | i32 segmentLength
//! segmentLength × ( i32 byteLength | byteLength bytes )   // -1 = empty slot
//! ```

use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::codec::{read_i32, write_i32};
use super::errors::{StoreError, StoreResult};

const EMPTY_SLOT: i32 = -1;

#[derive(Debug)]
pub(crate) struct Segment {
    index: usize,
    slots: Box<[ArcSwapOption<Vec<u8>>]>,
    dirty: AtomicBool,
}

impl Segment {
    pub(crate) fn new(index: usize, length: usize) -> Self {
        let slots: Vec<_> = (0..length).map(|_| ArcSwapOption::empty()).collect();
        Self {
            index,
            slots: slots.into_boxed_slice(),
            dirty: AtomicBool::new(false),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn get(&self, offset: usize) -> Option<Arc<Vec<u8>>> {
        self.slots.get(offset).and_then(|slot| slot.load_full())
    }

    pub(crate) fn is_set(&self, offset: usize) -> bool {
        self.slots
            .get(offset)
            .map(|slot| slot.load().is_some())
            .unwrap_or(false)
    }

    pub(crate) fn set(&self, offset: usize, bytes: Vec<u8>) {
        self.slots[offset].store(Some(Arc::new(bytes)));
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn clear(&self, offset: usize) {
        self.slots[offset].store(None);
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.load().is_some()).count()
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Clears the dirty flag, returning whether it was set.
    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn write_to<W: Write>(&self, writer: &mut W, total_segments: usize) -> io::Result<()> {
        write_i32(writer, to_i32(total_segments)?)?;
        write_i32(writer, to_i32(self.index)?)?;
        write_i32(writer, to_i32(self.slots.len())?)?;

        for slot in self.slots.iter() {
            match slot.load_full() {
                Some(bytes) => {
                    write_i32(writer, to_i32(bytes.len())?)?;
                    writer.write_all(&bytes)?;
                }
                None => write_i32(writer, EMPTY_SLOT)?,
            }
        }
        Ok(())
    }

    /// Reads one segment file, returning the total segment count it records
    /// alongside the segment.
    pub(crate) fn read_from<R: Read>(
        reader: &mut R,
        path: &Path,
        expected_index: usize,
        expected_length: usize,
    ) -> StoreResult<(usize, Segment)> {
        let corrupt = |reason: String| StoreError::corruption_in_file(path, reason);
        let header = |reader: &mut R, what: &str| {
            read_i32(reader).map_err(|e| corrupt(format!("cannot read {}: {}", what, e)))
        };

        let total = header(reader, "segment count")?;
        let index = header(reader, "segment index")?;
        let length = header(reader, "segment length")?;

        if total < 1 || index < 0 || index >= total {
            return Err(corrupt(format!(
                "invalid segment header: index {} of {}",
                index, total
            )));
        }
        if index as usize != expected_index {
            return Err(corrupt(format!(
                "segment index {} does not match file index {}",
                index, expected_index
            )));
        }
        if length as usize != expected_length {
            return Err(corrupt(format!(
                "segment length {} does not match configured length {}",
                length, expected_length
            )));
        }

        let segment = Segment::new(expected_index, expected_length);
        for offset in 0..expected_length {
            let byte_length = read_i32(reader)
                .map_err(|e| corrupt(format!("cannot read slot {} length: {}", offset, e)))?;
            if byte_length == EMPTY_SLOT {
                continue;
            }
            if byte_length < 0 {
                return Err(corrupt(format!(
                    "invalid length {} for slot {}",
                    byte_length, offset
                )));
            }
            let mut bytes = vec![0u8; byte_length as usize];
            reader
                .read_exact(&mut bytes)
                .map_err(|e| corrupt(format!("truncated slot {}: {}", offset, e)))?;
            segment.slots[offset].store(Some(Arc::new(bytes)));
        }

        Ok((total as usize, segment))
    }
}

fn to_i32(value: usize) -> io::Result<i32> {
    i32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} does not fit the i32 segment format", value),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    #[test]
    fn test_empty_segment_round_trip() {
        let segment = Segment::new(2, 4);
        let mut buf = Vec::new();
        segment.write_to(&mut buf, 3).unwrap();

        // header + one -1 per slot
        assert_eq!(buf.len(), 12 + 4 * 4);

        let (total, read) =
            Segment::read_from(&mut Cursor::new(buf), &PathBuf::from("2.seg"), 2, 4).unwrap();
        assert_eq!(total, 3);
        assert_eq!(read.occupied(), 0);
    }

    #[test]
    fn test_slot_bytes_survive_round_trip() {
        let segment = Segment::new(0, 3);
        segment.set(1, vec![9, 8, 7]);
        segment.set(2, Vec::new());

        let mut buf = Vec::new();
        segment.write_to(&mut buf, 1).unwrap();
        let (_, read) =
            Segment::read_from(&mut Cursor::new(buf), &PathBuf::from("0.seg"), 0, 3).unwrap();

        assert!(read.get(0).is_none());
        assert_eq!(read.get(1).unwrap().as_slice(), &[9, 8, 7]);
        assert_eq!(read.get(2).unwrap().len(), 0);
    }

    #[test]
    fn test_mismatched_length_is_corruption() {
        let segment = Segment::new(0, 3);
        let mut buf = Vec::new();
        segment.write_to(&mut buf, 1).unwrap();

        let err = Segment::read_from(&mut Cursor::new(buf), &PathBuf::from("0.seg"), 0, 5)
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_truncated_slot_is_corruption() {
        let segment = Segment::new(0, 1);
        segment.set(0, vec![1, 2, 3, 4]);
        let mut buf = Vec::new();
        segment.write_to(&mut buf, 1).unwrap();
        buf.truncate(buf.len() - 2);

        let result = Segment::read_from(&mut Cursor::new(buf), &PathBuf::from("0.seg"), 0, 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_dirty_tracking() {
        let segment = Segment::new(0, 2);
        assert!(!segment.is_dirty());
        segment.set(0, vec![1]);
        assert!(segment.take_dirty());
        assert!(!segment.is_dirty());
        assert!(!segment.take_dirty());
    }
}
