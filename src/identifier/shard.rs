//! One of the 256 UUID → nid partitions
//!
//! File layout: `i32 size | size × (i64 msb, i64 lsb, i32 nid)`.

use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use uuid::Uuid;

use crate::store::codec::{count_to_i32, read_count, read_i32, read_i64, write_i32, write_i64};
use crate::store::files::{open_if_exists, write_atomically};
use crate::store::{StoreError, StoreResult};

pub(crate) struct UuidShard {
    pub(crate) entries: RwLock<HashMap<Uuid, i32>>,
    dirty: AtomicBool,
}

impl UuidShard {
    pub(crate) fn empty() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dirty: AtomicBool::new(false),
        }
    }

    pub(crate) fn get(&self, uuid: &Uuid) -> Option<i32> {
        self.entries.read().get(uuid).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub(crate) fn min_nid(&self) -> Option<i32> {
        self.entries.read().values().copied().min()
    }

    pub(crate) fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Loads the shard at `path`; a missing file yields an empty shard.
    pub(crate) fn read(path: &Path) -> StoreResult<Self> {
        let shard = Self::empty();
        let mut reader = match open_if_exists(path)? {
            Some(reader) => reader,
            None => return Ok(shard),
        };

        let size = read_count(&mut reader, "uuid shard entry").map_err(|e| e.with_path(path))?;
        {
            let mut entries = shard.entries.write();
            entries.reserve(size);
            for _ in 0..size {
                let (msb, lsb, nid) = read_entry(&mut reader).map_err(|e| {
                    StoreError::corruption_in_file(path, format!("truncated entry: {}", e))
                })?;
                if nid >= 0 {
                    return Err(StoreError::corruption_in_file(
                        path,
                        format!("non-negative nid {}", nid),
                    ));
                }
                entries.insert(uuid_from_halves(msb, lsb), nid);
            }
        }
        Ok(shard)
    }

    /// Writes the shard to `path`, returning the number of entries written.
    pub(crate) fn write(&self, path: &Path) -> StoreResult<usize> {
        let mut entries: Vec<(Uuid, i32)> =
            self.entries.read().iter().map(|(u, n)| (*u, *n)).collect();
        entries.sort_unstable();
        let size = count_to_i32(entries.len(), "uuid shard entry")?;

        write_atomically(path, |w| {
            write_i32(w, size)?;
            for (uuid, nid) in &entries {
                let (msb, lsb) = uuid_halves(uuid);
                write_i64(w, msb)?;
                write_i64(w, lsb)?;
                write_i32(w, *nid)?;
            }
            Ok(())
        })?;
        Ok(entries.len())
    }
}

fn read_entry<R: Read>(reader: &mut R) -> io::Result<(i64, i64, i32)> {
    Ok((read_i64(reader)?, read_i64(reader)?, read_i32(reader)?))
}

pub(crate) fn uuid_halves(uuid: &Uuid) -> (i64, i64) {
    let value = uuid.as_u128();
    ((value >> 64) as u64 as i64, value as u64 as i64)
}

pub(crate) fn uuid_from_halves(msb: i64, lsb: i64) -> Uuid {
    Uuid::from_u128(((msb as u64 as u128) << 64) | lsb as u64 as u128)
}
