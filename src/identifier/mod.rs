//! Identifier resolution: stable 128-bit UUIDs to compact negative nids.
//!
//! A component may carry several UUIDs; all of them resolve to the same
//! nid. A UUID's nid never changes once assigned.

mod index;
mod shard;
mod thread_cache;

pub use index::{
    shard_file_name, shard_for, IdentifierIndex, IndexSettings, FIRST_NID, SHARD_COUNT,
};
