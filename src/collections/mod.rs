//! Concurrent primitive collections shared by the sequence maps and the
//! commit engine.

mod atomic_array;
mod int_set;

pub use atomic_array::{AtomicIntArray, CHUNK_SIZE, MAX_SLOTS};
pub use int_set::ConcurrentIntSet;
