//! Sequence maps: dense zero-based numbering per component namespace, so
//! bitsets and arrays can be sized to the live population instead of the
//! sparse nid space.

mod map;

pub use map::SequenceMap;

/// File name of a namespace's persisted sequence map.
pub fn map_file_name(namespace: &str) -> String {
    format!("{}-sequence.map", namespace)
}
