//! Versioned components and their per-kind storage
//!
//! A component is an opaque serialized record (a concept or a semantic)
//! known by its nid. Each kind has its own sequence namespace and its own
//! segmented store of component bytes keyed by that sequence.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::sequence::{map_file_name, SequenceMap};
use crate::store::{SegmentedObjectStore, StoreResult};

/// The two component namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Concept,
    Semantic,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 2] = [ComponentKind::Concept, ComponentKind::Semantic];

    /// Name of the sequence namespace.
    pub fn namespace(&self) -> &'static str {
        match self {
            ComponentKind::Concept => "concept",
            ComponentKind::Semantic => "semantic",
        }
    }

    /// Folder holding this kind's segment files.
    pub fn folder(&self) -> &'static str {
        match self {
            ComponentKind::Concept => "concepts",
            ComponentKind::Semantic => "semantics",
        }
    }

    /// Suffix of this kind's segment files.
    pub fn suffix(&self) -> &'static str {
        match self {
            ComponentKind::Concept => ".concept",
            ComponentKind::Semantic => ".semantic",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace())
    }
}

/// One stored component as handed to change checkers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub kind: ComponentKind,
    pub nid: i32,
    pub sequence: u32,
    pub bytes: Arc<Vec<u8>>,
}

/// Sequence map plus component bytes for one kind.
pub struct ComponentStore {
    kind: ComponentKind,
    sequences: SequenceMap,
    objects: SegmentedObjectStore<Vec<u8>>,
}

impl ComponentStore {
    /// Opens the sequence map and segment files of `kind` under `directory`.
    pub fn open(directory: &Path, kind: ComponentKind, segment_size: usize) -> StoreResult<Self> {
        let sequences = SequenceMap::read(
            kind.namespace(),
            &directory.join(map_file_name(kind.namespace())),
        )?;
        let objects =
            SegmentedObjectStore::open(directory.join(kind.folder()), kind.suffix(), segment_size)?;
        Ok(Self {
            kind,
            sequences,
            objects,
        })
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn sequences(&self) -> &SequenceMap {
        &self.sequences
    }

    /// Stores `bytes` as the current version of `nid` and returns its
    /// sequence.
    pub fn write(&self, nid: i32, bytes: Vec<u8>) -> u32 {
        let sequence = self.sequences.add_nid_if_missing(nid);
        self.objects.put_bytes(sequence, bytes);
        sequence
    }

    pub fn get(&self, sequence: u32) -> Option<Component> {
        let bytes = self.objects.get_bytes(sequence)?;
        let nid = self.sequences.get_nid(sequence)?;
        Some(Component {
            kind: self.kind,
            nid,
            sequence,
            bytes,
        })
    }

    pub fn get_by_nid(&self, nid: i32) -> Option<Component> {
        self.get(self.sequences.get_sequence(nid)?)
    }

    pub fn contains(&self, sequence: u32) -> bool {
        self.objects.contains_key(sequence)
    }

    /// Number of stored components.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Writes the sequence map and dirty segments under `directory`.
    pub fn flush(&self, directory: &Path) -> StoreResult<usize> {
        self.sequences
            .write(&directory.join(map_file_name(self.kind.namespace())))?;
        self.objects.write()
    }
}

impl fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentStore")
            .field("kind", &self.kind)
            .field("sequences", &self.sequences.len())
            .field("components", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_assigns_dense_sequences() {
        let temp_dir = TempDir::new().unwrap();
        let store = ComponentStore::open(temp_dir.path(), ComponentKind::Concept, 8).unwrap();
        assert_eq!(store.write(-1, vec![1]), 0);
        assert_eq!(store.write(-7, vec![2]), 1);
        assert_eq!(store.write(-1, vec![3]), 0);

        let component = store.get(0).unwrap();
        assert_eq!(component.nid, -1);
        assert_eq!(*component.bytes, vec![3]);
        assert_eq!(store.get_by_nid(-7).unwrap().sequence, 1);
    }

    #[test]
    fn test_flush_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = ComponentStore::open(temp_dir.path(), ComponentKind::Semantic, 8).unwrap();
            store.write(-3, b"member".to_vec());
            store.flush(temp_dir.path()).unwrap();
        }
        assert!(temp_dir.path().join("semantic-sequence.map").exists());
        assert!(temp_dir.path().join("semantics").join("0.semantic").exists());

        let store = ComponentStore::open(temp_dir.path(), ComponentKind::Semantic, 8).unwrap();
        let component = store.get(0).unwrap();
        assert_eq!(component.nid, -3);
        assert_eq!(component.kind, ComponentKind::Semantic);
        assert_eq!(*component.bytes, b"member".to_vec());
    }
}
