//! Sparse array of atomic `i32` slots
//!
//! Slots default to zero. The index space `0..MAX_SLOTS` is split three ways:
//! a fixed top level of directories, each directory holding chunk pointers,
//! each chunk holding `CHUNK_SIZE` atomics. Directories and chunks are
//! allocated on first write, so memory follows the set of written indexes
//! rather than the largest one.
//!
//! Reads are lock-free: two `ArcSwapOption` loads and one atomic. Writers that
//! need a new directory or chunk allocate it under a mutex, re-checking first.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

const CHUNK_BITS: usize = 12;
const DIRECTORY_BITS: usize = 10;
const TOP_BITS: usize = 9;

/// Slots per chunk.
pub const CHUNK_SIZE: usize = 1 << CHUNK_BITS;
const DIRECTORY_SIZE: usize = 1 << DIRECTORY_BITS;
const TOP_SIZE: usize = 1 << TOP_BITS;

/// Number of addressable slots; enough for every non-negative `i32` index.
pub const MAX_SLOTS: usize = 1 << (CHUNK_BITS + DIRECTORY_BITS + TOP_BITS);

struct Chunk {
    slots: Box<[AtomicI32]>,
}

impl Chunk {
    fn new() -> Self {
        Self {
            slots: (0..CHUNK_SIZE).map(|_| AtomicI32::new(0)).collect(),
        }
    }
}

struct Directory {
    chunks: Box<[ArcSwapOption<Chunk>]>,
}

impl Directory {
    fn new() -> Self {
        Self {
            chunks: (0..DIRECTORY_SIZE).map(|_| ArcSwapOption::empty()).collect(),
        }
    }
}

fn split(index: usize) -> (usize, usize, usize) {
    (
        index >> (CHUNK_BITS + DIRECTORY_BITS),
        (index >> CHUNK_BITS) & (DIRECTORY_SIZE - 1),
        index & (CHUNK_SIZE - 1),
    )
}

pub struct AtomicIntArray {
    top: Box<[ArcSwapOption<Directory>]>,
    allocated_chunks: AtomicUsize,
    grow_lock: Mutex<()>,
}

impl AtomicIntArray {
    pub fn new() -> Self {
        Self {
            top: (0..TOP_SIZE).map(|_| ArcSwapOption::empty()).collect(),
            allocated_chunks: AtomicUsize::new(0),
            grow_lock: Mutex::new(()),
        }
    }

    /// Number of slots backed by allocated chunks.
    pub fn capacity(&self) -> usize {
        self.allocated_chunks.load(Ordering::Acquire) * CHUNK_SIZE
    }

    /// Returns the value at `index`, or zero if it was never set.
    pub fn get(&self, index: usize) -> i32 {
        if index >= MAX_SLOTS {
            return 0;
        }
        let (top, directory, offset) = split(index);
        match &*self.top[top].load() {
            Some(dir) => match &*dir.chunks[directory].load() {
                Some(chunk) => chunk.slots[offset].load(Ordering::Acquire),
                None => 0,
            },
            None => 0,
        }
    }

    /// Stores `value` at `index`, allocating its chunk if needed.
    ///
    /// # Panics
    ///
    /// Panics if `index >= MAX_SLOTS`.
    pub fn set(&self, index: usize, value: i32) {
        assert!(index < MAX_SLOTS, "index {} exceeds {} slots", index, MAX_SLOTS);
        let (top, directory, offset) = split(index);
        let chunk = self.chunk_for_write(top, directory);
        chunk.slots[offset].store(value, Ordering::Release);
    }

    fn chunk_for_write(&self, top: usize, directory: usize) -> Arc<Chunk> {
        if let Some(dir) = &*self.top[top].load() {
            if let Some(chunk) = &*dir.chunks[directory].load() {
                return Arc::clone(chunk);
            }
        }

        let _guard = self.grow_lock.lock();
        let dir = match self.top[top].load_full() {
            Some(dir) => dir,
            None => {
                let dir = Arc::new(Directory::new());
                self.top[top].store(Some(Arc::clone(&dir)));
                dir
            }
        };
        if let Some(chunk) = dir.chunks[directory].load_full() {
            return chunk;
        }

        let chunk = Arc::new(Chunk::new());
        dir.chunks[directory].store(Some(Arc::clone(&chunk)));
        self.allocated_chunks.fetch_add(1, Ordering::AcqRel);
        chunk
    }
}

impl Default for AtomicIntArray {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AtomicIntArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicIntArray")
            .field("capacity", &self.capacity())
            .finish()
    }
}
