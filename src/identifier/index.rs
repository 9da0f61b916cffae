//! UUID → nid resolution index
//!
//! # Sharding
//!
//! The UUID's low byte picks one of 256 shards. Each shard is loaded on
//! first touch with double-checked locking: check the slot, take that
//! shard's load lock, check again, then read the file or start empty. No
//! operation ever holds two shard locks at once.
//!
//! # Allocation
//!
//! New nids come from one atomic counter that counts down from -1, so they
//! are unique across shards without cross-shard coordination. Allocation
//! for a given UUID happens under its shard's write lock, so two threads
//! racing on the same unseen UUID get the same nid.
//!
//! Multi-UUID resolution additionally serializes on `multi_lock`, so
//! overlapping UUID lists agree on one nid whatever their order.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use lru::LruCache;
use parking_lot::Mutex;
use uuid::Uuid;

use super::shard::UuidShard;
use super::thread_cache;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::store::StoreResult;

/// Number of UUID shards.
pub const SHARD_COUNT: usize = 256;

/// The first nid ever handed out.
pub const FIRST_NID: i32 = -1;

/// Tuning knobs for an `IdentifierIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSettings {
    /// Capacity of the nid → UUIDs LRU cache; 0 disables it.
    pub reverse_cache_capacity: usize,
    /// Entries kept in each thread's recent-resolution memo.
    pub thread_cache_capacity: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            reverse_cache_capacity: 10_000,
            thread_cache_capacity: 32,
        }
    }
}

/// Returns the shard a UUID lives in.
pub fn shard_for(uuid: &Uuid) -> usize {
    uuid.as_bytes()[15] as usize
}

/// Returns the file name of shard `index`.
pub fn shard_file_name(index: usize) -> String {
    format!("{}-uuid-nid.map", index)
}

pub struct IdentifierIndex {
    instance_id: u64,
    directory: PathBuf,
    shards: Box<[ArcSwapOption<UuidShard>]>,
    load_locks: Box<[Mutex<()>]>,
    next_nid: AtomicI32,
    multi_lock: Mutex<()>,
    reverse_cache: Option<Mutex<LruCache<i32, Vec<Uuid>>>>,
    thread_cache_capacity: usize,
    metrics: Arc<MetricsRegistry>,
}

impl IdentifierIndex {
    /// Creates an index over the shard files in `directory`. Nothing is
    /// read until a shard is touched.
    pub fn new(
        directory: impl Into<PathBuf>,
        settings: IndexSettings,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let shards: Vec<_> = (0..SHARD_COUNT).map(|_| ArcSwapOption::empty()).collect();
        let load_locks: Vec<_> = (0..SHARD_COUNT).map(|_| Mutex::new(())).collect();

        Self {
            instance_id: thread_cache::next_instance_id(),
            directory: directory.into(),
            shards: shards.into_boxed_slice(),
            load_locks: load_locks.into_boxed_slice(),
            next_nid: AtomicI32::new(FIRST_NID),
            multi_lock: Mutex::new(()),
            reverse_cache: NonZeroUsize::new(settings.reverse_cache_capacity)
                .map(|capacity| Mutex::new(LruCache::new(capacity))),
            thread_cache_capacity: settings.thread_cache_capacity,
            metrics,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The nid the next unseen UUID will receive.
    pub fn next_nid(&self) -> i32 {
        self.next_nid.load(Ordering::Acquire)
    }

    /// Lowers the allocation counter so it stays below `next`. The counter
    /// never moves back up.
    pub fn reserve_below(&self, next: i32) {
        assert!(next < 0, "next nid must be negative, got {}", next);
        self.next_nid.fetch_min(next, Ordering::AcqRel);
    }

    fn shard_path(&self, index: usize) -> PathBuf {
        self.directory.join(shard_file_name(index))
    }

    fn shard_at(&self, index: usize) -> StoreResult<Arc<UuidShard>> {
        if let Some(shard) = self.shards[index].load_full() {
            return Ok(shard);
        }

        let _guard = self.load_locks[index].lock();
        if let Some(shard) = self.shards[index].load_full() {
            return Ok(shard);
        }

        let shard = Arc::new(UuidShard::read(&self.shard_path(index))?);
        if let Some(min) = shard.min_nid() {
            self.next_nid
                .fetch_min(min.saturating_sub(1), Ordering::AcqRel);
        }
        self.shards[index].store(Some(Arc::clone(&shard)));

        self.metrics.increment_shards_loaded();
        log_event_with_fields(
            Event::ShardLoaded,
            &[
                ("shard", &index.to_string()),
                ("entries", &shard.len().to_string()),
            ],
        );
        Ok(shard)
    }

    fn shard(&self, uuid: &Uuid) -> StoreResult<Arc<UuidShard>> {
        self.shard_at(shard_for(uuid))
    }

    fn allocate_nid(&self) -> i32 {
        let nid = self.next_nid.fetch_sub(1, Ordering::AcqRel);
        assert!(nid < 0 && nid > i32::MIN, "nid space exhausted");
        nid
    }

    /// Resolves `uuid`, assigning a fresh nid the first time it is seen.
    pub fn get_nid(&self, uuid: &Uuid) -> StoreResult<i32> {
        if let Some(nid) = thread_cache::lookup(self.instance_id, uuid) {
            return Ok(nid);
        }

        let shard = self.shard(uuid)?;
        let (nid, allocated) = match shard.get(uuid) {
            Some(nid) => (nid, false),
            None => {
                let mut entries = shard.entries.write();
                match entries.get(uuid) {
                    Some(&nid) => (nid, false),
                    None => {
                        let nid = self.allocate_nid();
                        entries.insert(*uuid, nid);
                        shard.mark_dirty();
                        (nid, true)
                    }
                }
            }
        };

        if allocated {
            self.metrics.increment_nids_allocated();
            if let Some(cache) = &self.reverse_cache {
                cache.lock().put(nid, vec![*uuid]);
            }
        }
        thread_cache::remember(self.instance_id, *uuid, nid, self.thread_cache_capacity);
        Ok(nid)
    }

    /// Resolves a component known by several UUIDs to one nid.
    ///
    /// The first UUID that already has a nid decides it; otherwise the first
    /// UUID gets a fresh one. Every other UUID is then mapped to that nid,
    /// unless it already has a different one, which it keeps.
    ///
    /// Concurrent calls run one at a time; single-UUID `get_nid` calls are
    /// not blocked.
    ///
    /// # Panics
    ///
    /// Panics if `uuids` is empty.
    pub fn get_nid_for_uuids(&self, uuids: &[Uuid]) -> StoreResult<i32> {
        assert!(!uuids.is_empty(), "at least one UUID is required");
        let _serial = self.multi_lock.lock();

        let mut existing = None;
        for uuid in uuids {
            if let Some(nid) = self.get_if_present(uuid)? {
                existing = Some(nid);
                break;
            }
        }
        let nid = match existing {
            Some(nid) => nid,
            None => self.get_nid(&uuids[0])?,
        };
        for uuid in uuids {
            self.put(uuid, nid)?;
        }
        Ok(nid)
    }

    /// Returns the nid for `uuid` without assigning one.
    pub fn get_if_present(&self, uuid: &Uuid) -> StoreResult<Option<i32>> {
        if let Some(nid) = thread_cache::lookup(self.instance_id, uuid) {
            return Ok(Some(nid));
        }
        Ok(self.shard(uuid)?.get(uuid))
    }

    pub fn contains_key(&self, uuid: &Uuid) -> StoreResult<bool> {
        Ok(self.get_if_present(uuid)?.is_some())
    }

    /// Maps `uuid` to `nid`. Returns true if the mapping was added; false if
    /// `uuid` already had a nid (an existing, different nid is kept).
    ///
    /// # Panics
    ///
    /// Panics if `nid` is not negative.
    pub fn put(&self, uuid: &Uuid, nid: i32) -> StoreResult<bool> {
        assert!(nid < 0, "nid must be negative, got {}", nid);

        let shard = self.shard(uuid)?;
        {
            let mut entries = shard.entries.write();
            if let Some(&existing) = entries.get(uuid) {
                drop(entries);
                if existing != nid {
                    log_event_with_fields(
                        Event::UuidRemapRejected,
                        &[
                            ("uuid", &uuid.to_string()),
                            ("kept_nid", &existing.to_string()),
                            ("offered_nid", &nid.to_string()),
                        ],
                    );
                }
                return Ok(false);
            }
            entries.insert(*uuid, nid);
            shard.mark_dirty();
        }

        self.next_nid
            .fetch_min(nid.saturating_sub(1), Ordering::AcqRel);
        if let Some(cache) = &self.reverse_cache {
            if let Some(uuids) = cache.lock().get_mut(&nid) {
                if !uuids.contains(uuid) {
                    uuids.push(*uuid);
                }
            }
        }
        thread_cache::remember(self.instance_id, *uuid, nid, self.thread_cache_capacity);
        Ok(true)
    }

    /// Returns every UUID mapped to `nid`, sorted.
    ///
    /// Served from the reverse cache when possible; otherwise every shard is
    /// scanned, one at a time.
    pub fn get_keys_for_value(&self, nid: i32) -> StoreResult<Vec<Uuid>> {
        if let Some(cache) = &self.reverse_cache {
            if let Some(uuids) = cache.lock().get(&nid) {
                let mut uuids = uuids.clone();
                uuids.sort_unstable();
                return Ok(uuids);
            }
        }

        let mut found = Vec::new();
        for index in 0..SHARD_COUNT {
            let shard = self.shard_at(index)?;
            let entries = shard.entries.read();
            found.extend(
                entries
                    .iter()
                    .filter(|(_, value)| **value == nid)
                    .map(|(uuid, _)| *uuid),
            );
        }
        found.sort_unstable();

        if !found.is_empty() {
            if let Some(cache) = &self.reverse_cache {
                cache.lock().put(nid, found.clone());
            }
        }
        Ok(found)
    }

    /// Loads every shard. Afterwards the nid counter is below every
    /// persisted nid.
    pub fn load_all(&self) -> StoreResult<()> {
        for index in 0..SHARD_COUNT {
            self.shard_at(index)?;
        }
        Ok(())
    }

    /// Returns true if any shard file exists on disk.
    pub fn has_shard_files(&self) -> bool {
        (0..SHARD_COUNT).any(|index| self.shard_path(index).exists())
    }

    /// Writes every dirty loaded shard. Returns the number written.
    pub fn flush(&self) -> StoreResult<usize> {
        let mut written = 0;
        for index in 0..SHARD_COUNT {
            let shard = match self.shards[index].load_full() {
                Some(shard) => shard,
                None => continue,
            };
            if !shard.take_dirty() {
                continue;
            }
            match shard.write(&self.shard_path(index)) {
                Ok(entries) => {
                    written += 1;
                    self.metrics.increment_shards_flushed();
                    log_event_with_fields(
                        Event::ShardFlushed,
                        &[
                            ("shard", &index.to_string()),
                            ("entries", &entries.to_string()),
                        ],
                    );
                }
                Err(e) => {
                    shard.mark_dirty();
                    return Err(e);
                }
            }
        }
        Ok(written)
    }

    /// Number of shards currently in memory.
    pub fn loaded_shard_count(&self) -> usize {
        self.shards.iter().filter(|s| s.load().is_some()).count()
    }

    /// Number of UUIDs in loaded shards.
    pub fn loaded_len(&self) -> usize {
        self.shards
            .iter()
            .filter_map(|s| s.load_full())
            .map(|shard| shard.len())
            .sum()
    }
}

impl std::fmt::Debug for IdentifierIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierIndex")
            .field("directory", &self.directory)
            .field("next_nid", &self.next_nid())
            .field("loaded_shards", &self.loaded_shard_count())
            .finish()
    }
}
