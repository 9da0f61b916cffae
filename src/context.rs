//! The store context
//!
//! `TermStore` owns one instance of every index and service over one data
//! directory and is the object callers pass around. Several stores can live
//! in one process; they share nothing.
//!
//! # Lifecycle
//!
//! 1. `open`: create the directory if needed, read the metadata file (or
//!    rebuild the nid counter from the shard files), open every index.
//! 2. Use.
//! 3. `flush` at any point; `shutdown` drains the worker pool and flushes.
//!
//! # Metadata
//!
//! `store-meta.json` records where nid and stamp allocation resume. Flush
//! marks it unclean before writing anything else and clean after the last
//! file is written. An unclean or missing file means the shards are scanned
//! on open.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commit::{
    ActiveTaskRegistry, Alert, ChangeChecker, CommitListener, CommitRecord, CommitResult,
    CommitService,
};
use crate::component::{ComponentKind, ComponentStore};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::identifier::{IdentifierIndex, IndexSettings};
use crate::observability::{
    log_event_with_fields, Event, Logger, MetricsRegistry, MetricsSnapshot, ObservationScope, Timer,
};
use crate::stamp::{StampService, Status};
use crate::store::files::write_atomically;
use crate::store::StoreError;
use crate::worker::{Semaphore, TaskHandle, WorkerPool};

/// Name of the metadata file inside the data directory.
pub const META_FILE: &str = "store-meta.json";

/// Version written to the metadata file.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoreMeta {
    format_version: u32,
    next_nid: i32,
    next_stamp_sequence: u32,
    clean: bool,
}

/// Point-in-time counts for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub data_dir: PathBuf,
    pub loaded_shards: usize,
    pub loaded_uuids: usize,
    pub next_nid: i32,
    pub concept_sequences: usize,
    pub semantic_sequences: usize,
    pub concepts: usize,
    pub semantics: usize,
    pub stamps: usize,
    pub pending_stamps: usize,
    pub aliases: usize,
    pub comments: usize,
    pub active_tasks: usize,
    pub metrics: MetricsSnapshot,
}

pub struct TermStore {
    config: Config,
    metrics: Arc<MetricsRegistry>,
    identifiers: Arc<IdentifierIndex>,
    concepts: Arc<ComponentStore>,
    semantics: Arc<ComponentStore>,
    stamps: Arc<StampService>,
    commits: Arc<CommitService>,
    registry: Arc<ActiveTaskRegistry>,
    pool: WorkerPool,
    write_permits: Arc<Semaphore>,
}

impl TermStore {
    /// True if `data_dir` holds a store that was flushed at least once.
    pub fn is_initialized(data_dir: &Path) -> bool {
        data_dir.join(META_FILE).exists()
    }

    /// Opens (or creates) the store under `config.data_dir`.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        Logger::set_min_severity(config.severity()?);

        let dir = config.data_dir.clone();
        let dir_field = dir.display().to_string();
        let timer = Timer::new();
        log_event_with_fields(Event::StoreOpen, &[("data_dir", &dir_field)]);

        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::io_error(format!("Failed to create data directory {}", dir.display()), e)
        })?;

        let metrics = Arc::new(MetricsRegistry::new());
        let identifiers = Arc::new(IdentifierIndex::new(
            &dir,
            IndexSettings {
                reverse_cache_capacity: config.reverse_cache_capacity,
                thread_cache_capacity: config.thread_cache_capacity,
            },
            Arc::clone(&metrics),
        ));
        let concepts = Arc::new(ComponentStore::open(&dir, ComponentKind::Concept, config.segment_size)?);
        let semantics =
            Arc::new(ComponentStore::open(&dir, ComponentKind::Semantic, config.segment_size)?);
        let stamps = Arc::new(StampService::open(&dir, config.segment_size)?);

        match read_meta(&dir)? {
            Some(meta) if meta.clean => {
                identifiers.reserve_below(meta.next_nid);
                stamps.reserve_sequences_below(meta.next_stamp_sequence);
            }
            meta => {
                if let Some(meta) = meta {
                    stamps.reserve_sequences_below(meta.next_stamp_sequence);
                }
                if identifiers.has_shard_files() {
                    identifiers.load_all()?;
                    log_event_with_fields(
                        Event::NidCounterRecovered,
                        &[("next_nid", &identifiers.next_nid().to_string())],
                    );
                }
            }
        }

        let registry = Arc::new(ActiveTaskRegistry::new());
        let commits = Arc::new(CommitService::new(
            Arc::clone(&stamps),
            Arc::clone(&concepts),
            Arc::clone(&semantics),
            Arc::clone(&registry),
            Arc::clone(&metrics),
        ));
        let pool = WorkerPool::new("termcore-worker", config.worker_threads);
        let write_permits = Arc::new(Semaphore::new(config.max_inflight_writes));

        log_event_with_fields(
            Event::StoreReady,
            &[("data_dir", &dir_field), ("elapsed_ms", &timer.elapsed_ms())],
        );

        Ok(Self {
            config,
            metrics,
            identifiers,
            concepts,
            semantics,
            stamps,
            commits,
            registry,
            pool,
            write_permits,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn identifiers(&self) -> &IdentifierIndex {
        &self.identifiers
    }

    pub fn stamps(&self) -> &StampService {
        &self.stamps
    }

    pub fn commits(&self) -> &CommitService {
        &self.commits
    }

    pub fn components(&self, kind: ComponentKind) -> &ComponentStore {
        match kind {
            ComponentKind::Concept => &self.concepts,
            ComponentKind::Semantic => &self.semantics,
        }
    }

    fn component_arc(&self, kind: ComponentKind) -> Arc<ComponentStore> {
        match kind {
            ComponentKind::Concept => Arc::clone(&self.concepts),
            ComponentKind::Semantic => Arc::clone(&self.semantics),
        }
    }

    /// Resolves `uuid`, assigning a nid on first use.
    pub fn get_nid(&self, uuid: &Uuid) -> Result<i32> {
        Ok(self.identifiers.get_nid(uuid)?)
    }

    /// Resolves a component known by several UUIDs to one nid.
    pub fn get_nid_for_uuids(&self, uuids: &[Uuid]) -> Result<i32> {
        Ok(self.identifiers.get_nid_for_uuids(uuids)?)
    }

    /// UUIDs mapped to `nid`.
    pub fn get_uuids(&self, nid: i32) -> Result<Vec<Uuid>> {
        Ok(self.identifiers.get_keys_for_value(nid)?)
    }

    /// Sequence of `nid` in the namespace of `kind`, assigning one if
    /// missing.
    pub fn sequence_for(&self, kind: ComponentKind, nid: i32) -> u32 {
        let sequences = self.components(kind).sequences();
        let existing = sequences.get_sequence(nid);
        let sequence = sequences.add_nid_if_missing(nid);
        if existing.is_none() {
            self.metrics.increment_sequences_assigned();
        }
        sequence
    }

    /// Returns the pending stamp sequence for the tuple.
    pub fn add_uncommitted_stamp(&self, status: Status, author: u32, module: u32, path: u32) -> u32 {
        self.stamps.add_uncommitted_stamp(status, author, module, path)
    }

    /// Stores a component version and queues it for the next commit.
    pub fn write_component(&self, kind: ComponentKind, nid: i32, bytes: Vec<u8>, needs_check: bool) -> u32 {
        write_and_queue(
            self.components(kind),
            &self.commits,
            &self.metrics,
            nid,
            bytes,
            needs_check,
        )
    }

    /// `write_component` on the worker pool. Blocks while
    /// `max_inflight_writes` writes are already in flight.
    pub fn submit_write(
        &self,
        kind: ComponentKind,
        nid: i32,
        bytes: Vec<u8>,
        needs_check: bool,
    ) -> Result<TaskHandle<u32>> {
        let permit = self.write_permits.acquire();
        let store = self.component_arc(kind);
        let commits = Arc::clone(&self.commits);
        let metrics = Arc::clone(&self.metrics);
        let registry = Arc::clone(&self.registry);
        let label = format!("write {} {}", kind, nid);
        let description = label.clone();

        self.metrics.increment_write_tasks();
        let handle = self.pool.submit(&label, move || {
            let _permit = permit;
            let _active = registry.begin(description);
            write_and_queue(&store, &commits, &metrics, nid, bytes, needs_check)
        })?;
        Ok(handle)
    }

    /// Commits every pending stamp and queued component. `Ok(None)` means
    /// nothing was committed: a checker raised an ERROR alert, or nothing
    /// was pending.
    pub fn commit(&self, comment: Option<&str>) -> Result<Option<CommitRecord>> {
        Ok(self.commits.commit(comment)?)
    }

    /// `commit` on the worker pool.
    pub fn submit_commit(
        &self,
        comment: Option<String>,
    ) -> Result<TaskHandle<CommitResult<Option<CommitRecord>>>> {
        let commits = Arc::clone(&self.commits);
        let handle = self
            .pool
            .submit("commit", move || commits.commit(comment.as_deref()))?;
        Ok(handle)
    }

    /// Discards pending edits; returns the cancelled stamp sequences.
    pub fn cancel(&self) -> Vec<u32> {
        self.commits.cancel()
    }

    /// Runs the registered checkers over the stored version of `nid` in the
    /// edit phase. A nid with no sequence in `kind` has nothing to check.
    pub fn check_component(&self, kind: ComponentKind, nid: i32) -> Result<Vec<Alert>> {
        match self.components(kind).sequences().get_sequence(nid) {
            Some(sequence) => Ok(self.commits.check_edit(kind, sequence)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn add_checker(&self, checker: Arc<dyn ChangeChecker>) {
        self.commits.add_checker(checker);
    }

    pub fn add_listener(&self, listener: Arc<dyn CommitListener>) {
        self.commits.add_listener(listener);
    }

    /// Descriptions of running commit and write tasks.
    pub fn active_tasks(&self) -> Vec<String> {
        self.registry.active()
    }

    /// Writes every dirty index to disk.
    pub fn flush(&self) -> Result<()> {
        let dir = self.data_dir();
        let scope = ObservationScope::new("STORE_FLUSH");

        self.write_meta(false)?;
        let shards = self.identifiers.flush()?;
        let concept_segments = self.concepts.flush(dir)?;
        let semantic_segments = self.semantics.flush(dir)?;
        let stamp_segments = self.stamps.write()?;
        self.write_meta(true)?;

        let fields = [
            ("shards", shards.to_string()),
            ("concept_segments", concept_segments.to_string()),
            ("semantic_segments", semantic_segments.to_string()),
            ("stamp_segments", stamp_segments.to_string()),
        ];
        let fields: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        scope.complete_with_fields(&fields);
        Ok(())
    }

    fn write_meta(&self, clean: bool) -> Result<()> {
        let meta = StoreMeta {
            format_version: FORMAT_VERSION,
            next_nid: self.identifiers.next_nid(),
            next_stamp_sequence: self.stamps.next_sequence(),
            clean,
        };
        let json = serde_json::to_vec_pretty(&meta).map_err(|e| Error::Metadata(e.to_string()))?;
        write_atomically(&self.data_dir().join(META_FILE), |w| {
            std::io::Write::write_all(w, &json)
        })?;
        Ok(())
    }

    /// Waits for background tasks, then flushes. A pool that does not stop
    /// within `shutdown_timeout_ms` is a fatal error; the flush still runs.
    pub fn shutdown(&self) -> Result<()> {
        let timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
        let drained = self.pool.shutdown(timeout);
        self.flush()?;
        drained?;
        log_event_with_fields(
            Event::StoreClosed,
            &[("data_dir", &self.data_dir().display().to_string())],
        );
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            data_dir: self.config.data_dir.clone(),
            loaded_shards: self.identifiers.loaded_shard_count(),
            loaded_uuids: self.identifiers.loaded_len(),
            next_nid: self.identifiers.next_nid(),
            concept_sequences: self.concepts.sequences().len(),
            semantic_sequences: self.semantics.sequences().len(),
            concepts: self.concepts.len(),
            semantics: self.semantics.len(),
            stamps: self.stamps.stamp_count(),
            pending_stamps: self.stamps.pending_count(),
            aliases: self.stamps.alias_count(),
            comments: self.stamps.comment_count(),
            active_tasks: self.registry.len(),
            metrics: self.metrics.snapshot(),
        }
    }
}

impl std::fmt::Debug for TermStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermStore")
            .field("data_dir", &self.config.data_dir)
            .field("identifiers", &self.identifiers)
            .field("stamps", &self.stamps)
            .finish()
    }
}

fn write_and_queue(
    store: &ComponentStore,
    commits: &CommitService,
    metrics: &MetricsRegistry,
    nid: i32,
    bytes: Vec<u8>,
    needs_check: bool,
) -> u32 {
    let fresh = !store.sequences().contains_nid(nid);
    let sequence = store.write(nid, bytes);
    if fresh {
        metrics.increment_sequences_assigned();
    }
    metrics.increment_components_written();
    commits.add_uncommitted(store.kind(), sequence, needs_check);
    sequence
}

fn read_meta(dir: &Path) -> Result<Option<StoreMeta>> {
    let path = dir.join(META_FILE);
    let content = match fs::read(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::read_failed(format!("Failed to read {}", path.display()), e).into())
        }
    };
    let meta: StoreMeta = serde_json::from_slice(&content)
        .map_err(|e| Error::Metadata(format!("{}: {}", path.display(), e)))?;
    if meta.format_version != FORMAT_VERSION {
        return Err(Error::Metadata(format!(
            "unsupported format version {} (expected {})",
            meta.format_version, FORMAT_VERSION
        )));
    }
    if meta.next_nid >= 0 {
        return Err(Error::Metadata(format!("next_nid {} is not negative", meta.next_nid)));
    }
    Ok(Some(meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &Path) -> Config {
        let mut config = Config::for_data_dir(dir.join("data"));
        config.segment_size = 64;
        config.worker_threads = 2;
        config.log_level = "ERROR".into();
        config
    }

    #[test]
    fn test_open_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = TermStore::open(config(temp_dir.path())).unwrap();
        assert!(store.data_dir().is_dir());
        assert!(!TermStore::is_initialized(store.data_dir()));
        store.flush().unwrap();
        assert!(TermStore::is_initialized(store.data_dir()));
    }

    #[test]
    fn test_meta_resumes_allocation_without_loading_shards() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = TermStore::open(config(temp_dir.path())).unwrap();
            for _ in 0..10 {
                store.get_nid(&Uuid::new_v4()).unwrap();
            }
            store.shutdown().unwrap();
        }

        let store = TermStore::open(config(temp_dir.path())).unwrap();
        assert_eq!(store.identifiers().loaded_shard_count(), 0);
        assert_eq!(store.identifiers().next_nid(), -11);
    }

    #[test]
    fn test_unclean_meta_triggers_recovery() {
        let temp_dir = TempDir::new().unwrap();
        let data_dir;
        {
            let store = TermStore::open(config(temp_dir.path())).unwrap();
            data_dir = store.data_dir().to_path_buf();
            for _ in 0..3 {
                store.get_nid(&Uuid::new_v4()).unwrap();
            }
            store.flush().unwrap();
            store.write_meta(false).unwrap();
        }

        let store = TermStore::open(config(temp_dir.path())).unwrap();
        assert_eq!(store.identifiers().next_nid(), -4);
        assert!(data_dir.join(META_FILE).exists());
    }

    #[test]
    fn test_bad_meta_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path());
        fs::create_dir_all(&config.data_dir).unwrap();
        fs::write(config.data_dir.join(META_FILE), "{").unwrap();
        assert!(matches!(TermStore::open(config), Err(Error::Metadata(_))));
    }

    #[test]
    fn test_stats_count_components() {
        let temp_dir = TempDir::new().unwrap();
        let store = TermStore::open(config(temp_dir.path())).unwrap();
        let nid = store.get_nid(&Uuid::new_v4()).unwrap();
        store.write_component(ComponentKind::Concept, nid, vec![1], false);
        store.add_uncommitted_stamp(Status::Active, 1, 1, 1);

        let stats = store.stats();
        assert_eq!(stats.concepts, 1);
        assert_eq!(stats.concept_sequences, 1);
        assert_eq!(stats.pending_stamps, 1);
        assert_eq!(stats.metrics.components_written, 1);
        assert_eq!(stats.metrics.nids_allocated, 1);
    }

    #[test]
    fn test_submit_write_queues_component() {
        let temp_dir = TempDir::new().unwrap();
        let store = TermStore::open(config(temp_dir.path())).unwrap();
        let handles: Vec<_> = (1..=20)
            .map(|n| {
                store
                    .submit_write(ComponentKind::Semantic, -n, vec![n as u8], true)
                    .unwrap()
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.components(ComponentKind::Semantic).len(), 20);
        assert_eq!(store.commits().uncommitted(ComponentKind::Semantic).to_check.len(), 20);
        assert!(store.active_tasks().is_empty());
        store.shutdown().unwrap();
    }
}
