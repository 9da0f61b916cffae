//! Stamp → comment index
//!
//! File layout: `i32 size | size × (stamp i32, u16-prefixed UTF-8 comment)`.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;

use crate::store::codec::{count_to_i32, read_count, read_i32, read_utf, write_i32, write_utf};
use crate::store::files::{open_if_exists, write_atomically};
use crate::store::{StoreError, StoreResult};

/// Longest comment, in UTF-8 bytes, the comment file can hold.
pub const MAX_COMMENT_BYTES: usize = u16::MAX as usize;

#[derive(Debug, Default)]
pub struct StampCommentMap {
    comments: RwLock<BTreeMap<u32, String>>,
}

impl StampCommentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the comment for `stamp`, replacing any earlier one.
    ///
    /// # Panics
    ///
    /// Panics if `comment` is longer than `MAX_COMMENT_BYTES`.
    pub fn add_comment(&self, stamp: u32, comment: impl Into<String>) {
        let comment = comment.into();
        assert!(
            comment.len() <= MAX_COMMENT_BYTES,
            "comment of {} bytes exceeds {}",
            comment.len(),
            MAX_COMMENT_BYTES
        );
        self.comments.write().insert(stamp, comment);
    }

    pub fn get_comment(&self, stamp: u32) -> Option<String> {
        self.comments.read().get(&stamp).cloned()
    }

    pub fn len(&self) -> usize {
        self.comments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write(&self, path: &Path) -> StoreResult<usize> {
        let comments = self.comments.read().clone();
        let size = count_to_i32(comments.len(), "stamp comment")?;

        write_atomically(path, |w| {
            write_i32(w, size)?;
            for (stamp, comment) in &comments {
                write_i32(w, *stamp as i32)?;
                write_utf(w, comment)?;
            }
            Ok(())
        })?;
        Ok(comments.len())
    }

    pub fn read(path: &Path) -> StoreResult<Self> {
        let map = Self::new();
        let mut reader = match open_if_exists(path)? {
            Some(reader) => reader,
            None => return Ok(map),
        };

        let size = read_count(&mut reader, "stamp comment").map_err(|e| e.with_path(path))?;
        {
            let mut comments = map.comments.write();
            for _ in 0..size {
                let stamp = read_i32(&mut reader).map_err(|e| {
                    StoreError::corruption_in_file(path, format!("truncated comment entry: {}", e))
                })?;
                let comment = read_utf(&mut reader).map_err(|e| {
                    StoreError::corruption_in_file(path, format!("unreadable comment: {}", e))
                })?;
                if stamp < 0 {
                    return Err(StoreError::corruption_in_file(
                        path,
                        format!("negative stamp sequence {}", stamp),
                    ));
                }
                comments.insert(stamp as u32, comment);
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_and_get() {
        let map = StampCommentMap::new();
        map.add_comment(0, "init");
        assert_eq!(map.get_comment(0).as_deref(), Some("init"));
        assert_eq!(map.get_comment(1), None);
    }

    #[test]
    fn test_write_read_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stamp-comment.map");
        let map = StampCommentMap::new();
        map.add_comment(0, "init");
        map.add_comment(4, "fix ancestry · ü");
        map.write(&path).unwrap();

        let read = StampCommentMap::read(&path).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read.get_comment(4).as_deref(), Some("fix ancestry · ü"));
    }

    #[test]
    fn test_longest_comment_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stamp-comment.map");
        let longest = "x".repeat(MAX_COMMENT_BYTES);
        let map = StampCommentMap::new();
        map.add_comment(2, longest.clone());
        map.write(&path).unwrap();

        let read = StampCommentMap::read(&path).unwrap();
        assert_eq!(read.get_comment(2), Some(longest));
    }

    #[test]
    #[should_panic(expected = "comment of 65536 bytes exceeds 65535")]
    fn test_oversized_comment_panics() {
        StampCommentMap::new().add_comment(0, "x".repeat(MAX_COMMENT_BYTES + 1));
    }
}
