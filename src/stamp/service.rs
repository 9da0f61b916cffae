//! Stamp service
//!
//! Owns every stamp-related index: committed stamps (a segmented store keyed
//! by stamp sequence), pending stamps, aliases and comments. All of them
//! share one sequence space.
//!
//! # Visibility
//!
//! Reads of a stamp take the visibility gate shared; a commit finalizes its
//! whole batch while holding it exclusively. A reader therefore sees either
//! none or all of one commit's stamps.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use super::alias::{AliasWalk, StampAliasMap};
use super::comment::StampCommentMap;
use super::pending::{PendingStampMap, UncommittedStamp};
use super::stamp::{Stamp, StampKey, CANCELED_TIME};
use super::status::Status;
use crate::store::{SegmentedObjectStore, StoreResult};

pub const STAMP_FOLDER: &str = "stamps";
pub const STAMP_SUFFIX: &str = ".stamp";
pub const ALIAS_FILE: &str = "stamp-alias.map";
pub const COMMENT_FILE: &str = "stamp-comment.map";

pub struct StampService {
    directory: PathBuf,
    committed: SegmentedObjectStore<Stamp>,
    interned: RwLock<HashMap<Stamp, u32>>,
    pending: PendingStampMap,
    aliases: StampAliasMap,
    comments: StampCommentMap,
    next_sequence: AtomicU32,
    visibility: RwLock<()>,
}

impl StampService {
    /// Opens the stamp indexes under `directory`. Missing files mean empty
    /// indexes.
    pub fn open(directory: impl Into<PathBuf>, segment_size: usize) -> StoreResult<Self> {
        let directory = directory.into();
        let committed =
            SegmentedObjectStore::open(directory.join(STAMP_FOLDER), STAMP_SUFFIX, segment_size)?;

        let mut interned = HashMap::new();
        for entry in committed.stream() {
            let (sequence, stamp) = entry?;
            interned.entry(stamp).or_insert(sequence);
        }
        let next_sequence = committed.last_sequence().map_or(0, |last| last + 1);

        Ok(Self {
            aliases: StampAliasMap::read(&directory.join(ALIAS_FILE))?,
            comments: StampCommentMap::read(&directory.join(COMMENT_FILE))?,
            directory,
            committed,
            interned: RwLock::new(interned),
            pending: PendingStampMap::new(),
            next_sequence: AtomicU32::new(next_sequence),
            visibility: RwLock::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn allocate_sequence(&self) -> u32 {
        self.next_sequence.fetch_add(1, Ordering::AcqRel)
    }

    /// The sequence the next new stamp will receive.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence.load(Ordering::Acquire)
    }

    /// Raises the sequence counter to at least `next`.
    pub fn reserve_sequences_below(&self, next: u32) {
        self.next_sequence.fetch_max(next, Ordering::AcqRel);
    }

    /// Returns the pending sequence for the tuple, allocating one the first
    /// time the tuple is seen since the last commit.
    pub fn add_uncommitted_stamp(&self, status: Status, author: u32, module: u32, path: u32) -> u32 {
        // validates the tuple
        let stamp = Stamp::uncommitted(status, author, module, path);
        self.pending
            .add_uncommitted_stamp(stamp.key(), || self.allocate_sequence())
    }

    /// Returns the sequence of `stamp`. A committed stamp is interned: an
    /// identical one already stored yields the same sequence. An uncommitted
    /// stamp goes through the pending map.
    pub fn get_stamp_sequence(&self, stamp: &Stamp) -> u32 {
        if stamp.is_uncommitted() {
            return self.pending.add_uncommitted_stamp(stamp.key(), || self.allocate_sequence());
        }
        if let Some(&sequence) = self.interned.read().get(stamp) {
            return sequence;
        }

        let mut interned = self.interned.write();
        if let Some(&sequence) = interned.get(stamp) {
            return sequence;
        }
        let sequence = self.allocate_sequence();
        self.committed.put(sequence, stamp);
        interned.insert(*stamp, sequence);
        sequence
    }

    /// Returns the committed stamp at `sequence`, or the uncommitted stamp if
    /// the sequence is still pending.
    pub fn get_stamp(&self, sequence: u32) -> StoreResult<Option<Stamp>> {
        let _visible = self.visibility.read();
        if let Some(stamp) = self.committed.get(sequence)? {
            return Ok(Some(stamp));
        }
        Ok(self
            .pending
            .key_for_sequence(sequence)
            .map(|key| Stamp::uncommitted(key.status, key.author, key.module, key.path)))
    }

    pub fn is_uncommitted(&self, sequence: u32) -> bool {
        let _visible = self.visibility.read();
        !self.committed.contains_key(sequence) && self.pending.contains_sequence(sequence)
    }

    /// Number of committed (including cancelled) stamps.
    pub fn stamp_count(&self) -> usize {
        self.committed.len()
    }

    /// Number of pending stamps.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Pending stamps ordered by sequence.
    pub fn pending_stamps(&self) -> Vec<UncommittedStamp> {
        self.pending.snapshot()
    }

    /// Human-readable form of one stamp, with its comment and aliases.
    pub fn describe_stamp(&self, sequence: u32) -> StoreResult<String> {
        let mut description = match self.get_stamp(sequence)? {
            Some(stamp) => format!("{}: {}", sequence, stamp),
            None => return Ok(format!("{}: <no stamp>", sequence)),
        };
        if let Some(comment) = self.comments.get_comment(sequence) {
            description.push_str(&format!(" comment: {:?}", comment));
        }
        let aliases = self.aliases.get_aliases(sequence);
        if !aliases.is_empty() {
            description.push_str(&format!(" aliases: {:?}", aliases));
        }
        Ok(description)
    }

    pub fn add_alias(&self, stamp: u32, alias: u32) -> AliasWalk {
        self.aliases.add_alias(stamp, alias)
    }

    pub fn get_aliases(&self, stamp: u32) -> Vec<u32> {
        self.aliases.get_aliases(stamp)
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    pub fn add_comment(&self, stamp: u32, comment: impl Into<String>) {
        self.comments.add_comment(stamp, comment);
    }

    pub fn get_comment(&self, stamp: u32) -> Option<String> {
        self.comments.get_comment(stamp)
    }

    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    /// Moves the pending stamps into an in-flight batch for a commit.
    pub(crate) fn begin_commit(&self) -> Vec<UncommittedStamp> {
        self.pending.begin_commit()
    }

    /// Makes the in-flight batch pending again.
    pub(crate) fn revert_commit(&self) {
        self.pending.revert_commit();
    }

    /// Writes every stamp of `batch` at `time` as one visible step and
    /// returns their sequences.
    pub(crate) fn finalize(
        &self,
        batch: &[UncommittedStamp],
        time: i64,
        comment: Option<&str>,
    ) -> Vec<u32> {
        let stamps: Vec<(u32, Stamp)> = batch
            .iter()
            .map(|pending| (pending.sequence, final_stamp(&pending.key, time)))
            .collect();

        let _visible = self.visibility.write();
        {
            let mut interned = self.interned.write();
            for (sequence, stamp) in &stamps {
                self.committed.put(*sequence, stamp);
                interned.entry(*stamp).or_insert(*sequence);
            }
        }
        if let Some(comment) = comment {
            for (sequence, _) in &stamps {
                self.comments.add_comment(*sequence, comment);
            }
        }
        self.pending.complete_commit();

        stamps.into_iter().map(|(sequence, _)| sequence).collect()
    }

    /// Finalizes every pending stamp as cancelled and returns their
    /// sequences.
    pub(crate) fn cancel_pending(&self) -> Vec<u32> {
        let batch = self.pending.begin_commit();
        self.finalize(&batch, CANCELED_TIME, None)
    }

    /// Writes committed stamps, aliases and comments. Returns the number of
    /// stamp segments written.
    pub fn write(&self) -> StoreResult<usize> {
        let segments = self.committed.write()?;
        self.aliases.write(&self.directory.join(ALIAS_FILE))?;
        self.comments.write(&self.directory.join(COMMENT_FILE))?;
        Ok(segments)
    }
}

fn final_stamp(key: &StampKey, time: i64) -> Stamp {
    if time == CANCELED_TIME {
        Stamp::new(Status::Canceled, time, key.author, key.module, key.path)
    } else {
        key.at(time)
    }
}

impl std::fmt::Debug for StampService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StampService")
            .field("directory", &self.directory)
            .field("stamps", &self.stamp_count())
            .field("pending", &self.pending_count())
            .field("next_sequence", &self.next_sequence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(dir: &Path) -> StampService {
        StampService::open(dir, 16).unwrap()
    }

    #[test]
    fn test_first_pending_sequence_is_zero() {
        let temp_dir = TempDir::new().unwrap();
        let stamps = service(temp_dir.path());
        assert_eq!(stamps.add_uncommitted_stamp(Status::Active, 5, 6, 7), 0);
        assert_eq!(stamps.add_uncommitted_stamp(Status::Active, 5, 6, 7), 0);
        assert_eq!(stamps.add_uncommitted_stamp(Status::Inactive, 5, 6, 7), 1);
        assert!(stamps.is_uncommitted(0));
    }

    #[test]
    fn test_out_of_range_tuple_allocates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let stamps = service(temp_dir.path());

        let rejected = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            stamps.add_uncommitted_stamp(Status::Active, i32::MAX as u32 + 1, 6, 7)
        }));
        assert!(rejected.is_err());
        assert_eq!(stamps.next_sequence(), 0);
        assert_eq!(stamps.pending_count(), 0);
        assert_eq!(stamps.add_uncommitted_stamp(Status::Active, i32::MAX as u32, 6, 7), 0);
    }

    #[test]
    fn test_pending_stamp_reads_as_uncommitted() {
        let temp_dir = TempDir::new().unwrap();
        let stamps = service(temp_dir.path());
        let sequence = stamps.add_uncommitted_stamp(Status::Active, 5, 6, 7);
        let stamp = stamps.get_stamp(sequence).unwrap().unwrap();
        assert!(stamp.is_uncommitted());
        assert_eq!(stamps.get_stamp(99).unwrap(), None);
    }

    #[test]
    fn test_finalize_uses_one_time() {
        let temp_dir = TempDir::new().unwrap();
        let stamps = service(temp_dir.path());
        stamps.add_uncommitted_stamp(Status::Active, 5, 6, 7);
        stamps.add_uncommitted_stamp(Status::Active, 5, 6, 8);

        let batch = stamps.begin_commit();
        let finalized = stamps.finalize(&batch, 1_000, Some("init"));
        assert_eq!(finalized, vec![0, 1]);
        for sequence in finalized {
            let stamp = stamps.get_stamp(sequence).unwrap().unwrap();
            assert_eq!(stamp.time(), 1_000);
            assert_eq!(stamps.get_comment(sequence).as_deref(), Some("init"));
            assert!(!stamps.is_uncommitted(sequence));
        }
        assert_eq!(stamps.pending_count(), 0);
    }

    #[test]
    fn test_committed_stamps_are_interned() {
        let temp_dir = TempDir::new().unwrap();
        let stamps = service(temp_dir.path());
        let stamp = Stamp::new(Status::Active, 1_000, 1, 2, 3);
        let sequence = stamps.get_stamp_sequence(&stamp);
        assert_eq!(stamps.get_stamp_sequence(&stamp), sequence);
        assert_ne!(
            stamps.get_stamp_sequence(&Stamp::new(Status::Active, 1_001, 1, 2, 3)),
            sequence
        );
        assert_eq!(stamps.stamp_count(), 2);
    }

    #[test]
    fn test_cancel_marks_pending_canceled() {
        let temp_dir = TempDir::new().unwrap();
        let stamps = service(temp_dir.path());
        let sequence = stamps.add_uncommitted_stamp(Status::Active, 5, 6, 7);
        assert_eq!(stamps.cancel_pending(), vec![sequence]);

        let stamp = stamps.get_stamp(sequence).unwrap().unwrap();
        assert!(stamp.is_canceled());
        assert_eq!(stamp.status(), Status::Canceled);
    }

    #[test]
    fn test_reopen_continues_sequences() {
        let temp_dir = TempDir::new().unwrap();
        {
            let stamps = service(temp_dir.path());
            stamps.add_uncommitted_stamp(Status::Active, 5, 6, 7);
            let batch = stamps.begin_commit();
            stamps.finalize(&batch, 1_000, Some("init"));
            stamps.add_alias(0, 1);
            stamps.write().unwrap();
        }

        let stamps = service(temp_dir.path());
        assert_eq!(stamps.stamp_count(), 1);
        assert_eq!(stamps.next_sequence(), 1);
        assert_eq!(stamps.get_comment(0).as_deref(), Some("init"));
        assert_eq!(stamps.get_aliases(1), vec![0]);
        let interned = stamps.get_stamp_sequence(&Stamp::new(Status::Active, 1_000, 5, 6, 7));
        assert_eq!(interned, 0);
    }

    #[test]
    fn test_describe_stamp() {
        let temp_dir = TempDir::new().unwrap();
        let stamps = service(temp_dir.path());
        let sequence = stamps.get_stamp_sequence(&Stamp::new(Status::Active, 1_000, 5, 6, 7));
        stamps.add_comment(sequence, "init");
        let description = stamps.describe_stamp(sequence).unwrap();
        assert!(description.contains("ACTIVE"));
        assert!(description.contains("init"));
        assert!(stamps.describe_stamp(42).unwrap().contains("<no stamp>"));
    }
}
